//! Board Message Types
//!
//! Wire messages exchanged between board nodes. Control messages carry no
//! version; every drawing event is stamped with the logical version minted by
//! the node that originated it.

use serde::{Deserialize, Deserializer, Serialize};
use std::cell::Cell;
use std::hash::{Hash, Hasher};

/// Deepest `Batch` nesting a decoder will descend into.
///
/// Decoding recurses once per level, so a datagram nesting deeper than this
/// fails as a whole instead of exhausting the stack.
pub const MAX_DECODE_DEPTH: usize = 64;

/// A coordinate on the board.
///
/// Equality and hashing use the raw IEEE-754 bits, so two points are equal
/// only if both coordinates are bit-for-bit identical.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.x.to_bits() == other.x.to_bits() && self.y.to_bits() == other.y.to_bits()
    }
}

impl Eq for Point {}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.to_bits().hash(state);
        self.y.to_bits().hash(state);
    }
}

/// Payload of a versioned drawing event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A single dot
    Point { at: Point, color: u32 },
    /// A segment between two points
    Line { from: Point, to: Point, color: u32 },
    /// A text label anchored at a point
    Text {
        at: Point,
        text: String,
        color: u32,
        font_size: u32,
    },
    /// The visible area of the originating node changed
    MoveArea { lower_left: Point, upper_right: Point },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Point { .. } => "Point",
            EventKind::Line { .. } => "Line",
            EventKind::Text { .. } => "Text",
            EventKind::MoveArea { .. } => "MoveArea",
        }
    }
}

/// A versioned drawing event.
///
/// Versions are minted from the originating node's local counter and are
/// not globally unique: two nodes may stamp different events with the same
/// version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub version: u64,
    pub kind: EventKind,
}

impl Event {
    pub fn new(version: u64, kind: EventKind) -> Self {
        Self { version, kind }
    }

    pub fn point(version: u64, at: Point, color: u32) -> Self {
        Self::new(version, EventKind::Point { at, color })
    }

    pub fn line(version: u64, from: Point, to: Point, color: u32) -> Self {
        Self::new(version, EventKind::Line { from, to, color })
    }

    pub fn text(version: u64, at: Point, text: impl Into<String>, color: u32, font_size: u32) -> Self {
        Self::new(
            version,
            EventKind::Text {
                at,
                text: text.into(),
                color,
                font_size,
            },
        )
    }

    pub fn move_area(version: u64, lower_left: Point, upper_right: Point) -> Self {
        Self::new(version, EventKind::MoveArea { lower_left, upper_right })
    }

    /// Check if this event moves the visible area.
    pub fn is_area_move(&self) -> bool {
        matches!(self.kind, EventKind::MoveArea { .. })
    }
}

/// Message types for board communication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Message {
    /// Ask every peer to resend its whole store
    GetAll,
    /// Ask peers to resend the events stored at these versions
    GetVersions { versions: Vec<u64> },
    /// Several messages handled in sequence order
    Batch {
        #[serde(deserialize_with = "deserialize_nested")]
        messages: Vec<Message>,
    },
    /// A versioned drawing event
    Event(Event),
}

impl Message {
    pub fn get_versions(versions: Vec<u64>) -> Self {
        Message::GetVersions { versions }
    }

    pub fn batch(messages: Vec<Message>) -> Self {
        Message::Batch { messages }
    }

    /// Version of the message, if it is a versioned event.
    pub fn version(&self) -> Option<u64> {
        match self {
            Message::Event(event) => Some(event.version),
            _ => None,
        }
    }

    /// Get the message type as a string.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::GetAll => "GetAll",
            Message::GetVersions { .. } => "GetVersions",
            Message::Batch { .. } => "Batch",
            Message::Event(event) => event.kind.name(),
        }
    }
}

thread_local! {
    static DECODE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// One level of batch nesting on the current thread's decode stack.
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Option<Self> {
        DECODE_DEPTH.with(|depth| {
            if depth.get() >= MAX_DECODE_DEPTH {
                return None;
            }
            depth.set(depth.get() + 1);
            Some(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DECODE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

fn deserialize_nested<'de, D>(deserializer: D) -> Result<Vec<Message>, D::Error>
where
    D: Deserializer<'de>,
{
    let _guard = DepthGuard::enter().ok_or_else(|| {
        serde::de::Error::custom(format!("batch nesting exceeds {} levels", MAX_DECODE_DEPTH))
    })?;
    Vec::<Message>::deserialize(deserializer)
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Message::Event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_point_equality_is_bitwise() {
        assert_eq!(Point::new(1.0, 2.0), Point::new(1.0, 2.0));
        assert_ne!(Point::new(0.0, 0.0), Point::new(-0.0, 0.0));
        assert_eq!(Point::new(f64::NAN, 1.0), Point::new(f64::NAN, 1.0));
    }

    #[test]
    fn test_structural_equality_includes_version() {
        let a = Event::point(1, Point::new(3.0, 4.0), 0xff0000);
        let b = Event::point(2, Point::new(3.0, 4.0), 0xff0000);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_events_dedup_in_set() {
        let mut set = HashSet::new();
        assert!(set.insert(Message::from(Event::text(3, Point::new(1.0, 1.0), "hi", 0, 6))));
        assert!(!set.insert(Message::from(Event::text(3, Point::new(1.0, 1.0), "hi", 0, 6))));
        assert!(set.insert(Message::from(Event::text(3, Point::new(1.0, 1.0), "hi", 0, 7))));
    }

    #[test]
    fn test_message_version() {
        assert_eq!(Message::GetAll.version(), None);
        assert_eq!(Message::get_versions(vec![1, 2]).version(), None);
        assert_eq!(Message::batch(vec![]).version(), None);
        let msg: Message = Event::line(9, Point::default(), Point::new(1.0, 1.0), 1).into();
        assert_eq!(msg.version(), Some(9));
    }

    #[test]
    fn test_kind_name() {
        assert_eq!(Message::GetAll.kind_name(), "GetAll");
        assert_eq!(Message::get_versions(vec![]).kind_name(), "GetVersions");
        assert_eq!(Message::batch(vec![]).kind_name(), "Batch");
        let area = Event::move_area(1, Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        assert!(area.is_area_move());
        assert_eq!(Message::from(area).kind_name(), "MoveArea");
        let point = Event::point(1, Point::default(), 0);
        assert!(!point.is_area_move());
        assert_eq!(Message::from(point).kind_name(), "Point");
    }
}
