//! Logging Board
//!
//! Headless stand-in for a drawing view: logs every applied event and keeps
//! track of the area the board would currently show.

use crate::domain::ports::EventSink;
use crate::replication::{Event, EventKind, Point};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The visible board area and the version of the move that set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewArea {
    pub version: u64,
    pub lower_left: Point,
    pub upper_right: Point,
}

/// Event sink that renders to the log.
#[derive(Debug)]
pub struct LoggingBoard {
    applied: AtomicU64,
    follow_area: AtomicBool,
    area: Mutex<Option<ViewArea>>,
}

impl LoggingBoard {
    pub fn new(follow_area: bool) -> Self {
        Self {
            applied: AtomicU64::new(0),
            follow_area: AtomicBool::new(follow_area),
            area: Mutex::new(None),
        }
    }

    /// Number of events applied so far.
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }

    pub fn area(&self) -> Option<ViewArea> {
        *self.area.lock()
    }

    /// Whether area moves from any node change the view.
    pub fn set_follow_area(&self, follow: bool) {
        self.follow_area.store(follow, Ordering::SeqCst);
    }

    fn move_area(&self, version: u64, lower_left: Point, upper_right: Point) {
        if !self.follow_area.load(Ordering::SeqCst) {
            return;
        }

        let mut area = self.area.lock();
        if area.is_some_and(|current| current.version >= version) {
            return;
        }

        *area = Some(ViewArea {
            version,
            lower_left,
            upper_right,
        });
        tracing::info!(
            "view moved to ({}, {})..({}, {}) by v{}",
            lower_left.x,
            lower_left.y,
            upper_right.x,
            upper_right.y,
            version
        );
    }
}

impl Default for LoggingBoard {
    fn default() -> Self {
        Self::new(true)
    }
}

impl EventSink for LoggingBoard {
    fn on_event(&self, event: &Event) {
        self.applied.fetch_add(1, Ordering::SeqCst);

        match &event.kind {
            EventKind::Point { at, color } => {
                tracing::info!("v{} point at ({}, {}) color #{:06x}", event.version, at.x, at.y, color);
            }
            EventKind::Line { from, to, color } => {
                tracing::info!(
                    "v{} line ({}, {})-({}, {}) color #{:06x}",
                    event.version,
                    from.x,
                    from.y,
                    to.x,
                    to.y,
                    color
                );
            }
            EventKind::Text {
                at,
                text,
                color,
                font_size,
            } => {
                tracing::info!(
                    "v{} text {:?} at ({}, {}) color #{:06x} size {}",
                    event.version,
                    text,
                    at.x,
                    at.y,
                    color,
                    font_size
                );
            }
            EventKind::MoveArea {
                lower_left,
                upper_right,
            } => self.move_area(event.version, *lower_left, *upper_right),
        }
    }
}
