//! Console Originator
//!
//! Reads drawing commands line by line and turns them into versioned events.
//!
//! ```text
//! point X Y
//! line X0 Y0 X1 Y1
//! text X Y WORDS...
//! area X0 Y0 X1 Y1
//! color #RRGGBB
//! font N
//! status
//! ```

use crate::infrastructure::shutdown::ShutdownController;
use crate::replication::{Event, Message, Point, SyncEngine};
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Font size used until a `font` command changes it.
pub const DEFAULT_FONT_SIZE: u32 = 6;

/// A parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Point(Point),
    Line(Point, Point),
    Text(Point, String),
    Area(Point, Point),
    Color(u32),
    Font(u32),
    Status,
}

/// Errors produced while parsing a console line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("{command} expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("invalid coordinate {0:?}")]
    InvalidNumber(String),
    #[error("bad color {0:?}, use #RRGGBB")]
    InvalidColor(String),
    #[error("invalid font size {0:?}")]
    InvalidFontSize(String),
}

/// Parse one console line.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&name, args)) = tokens.split_first() else {
        return Err(CommandError::Empty);
    };

    match name.to_ascii_lowercase().as_str() {
        "point" => {
            let [x, y] = coords::<2>("point", "X Y", args)?;
            Ok(Command::Point(Point::new(x, y)))
        }
        "line" => {
            let [x0, y0, x1, y1] = coords::<4>("line", "X0 Y0 X1 Y1", args)?;
            Ok(Command::Line(Point::new(x0, y0), Point::new(x1, y1)))
        }
        "area" => {
            let [x0, y0, x1, y1] = coords::<4>("area", "X0 Y0 X1 Y1", args)?;
            Ok(Command::Area(Point::new(x0, y0), Point::new(x1, y1)))
        }
        "text" => {
            if args.len() < 3 {
                return Err(CommandError::MissingArgument {
                    command: "text",
                    expected: "X Y WORDS...",
                });
            }
            let [x, y] = coords::<2>("text", "X Y WORDS...", &args[..2])?;
            Ok(Command::Text(Point::new(x, y), args[2..].join(" ")))
        }
        "color" => match args {
            [value] => parse_color(value).map(Command::Color),
            _ => Err(CommandError::MissingArgument {
                command: "color",
                expected: "#RRGGBB",
            }),
        },
        "font" => match args {
            [value] => match value.parse::<u32>() {
                Ok(size) if size > 0 => Ok(Command::Font(size)),
                _ => Err(CommandError::InvalidFontSize(value.to_string())),
            },
            _ => Err(CommandError::MissingArgument {
                command: "font",
                expected: "N",
            }),
        },
        "status" => Ok(Command::Status),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn coords<const N: usize>(
    command: &'static str,
    expected: &'static str,
    args: &[&str],
) -> Result<[f64; N], CommandError> {
    if args.len() != N {
        return Err(CommandError::MissingArgument { command, expected });
    }

    let mut values = [0.0; N];
    for (value, arg) in values.iter_mut().zip(args) {
        *value = match arg.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => return Err(CommandError::InvalidNumber(arg.to_string())),
        };
    }
    Ok(values)
}

/// Parse `#RRGGBB`, `0xRRGGBB` or `RRGGBB`.
pub fn parse_color(value: &str) -> Result<u32, CommandError> {
    let hex = value
        .strip_prefix('#')
        .or_else(|| value.strip_prefix("0x"))
        .unwrap_or(value);

    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CommandError::InvalidColor(value.to_string()));
    }
    u32::from_str_radix(hex, 16).map_err(|_| CommandError::InvalidColor(value.to_string()))
}

/// A random light color, each channel in 128..=255.
pub fn random_color() -> u32 {
    let channel = || 128 + rand::random::<u8>() as u32 % 128;
    (channel() << 16) | (channel() << 8) | channel()
}

/// Stdin lines delivered through a channel.
///
/// Reading happens on a plain thread so that a pending read never holds up
/// runtime shutdown.
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Turns console commands into events on a sync engine.
pub struct Console {
    engine: Arc<SyncEngine>,
    color: u32,
    font_size: u32,
}

impl Console {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            color: random_color(),
            font_size: DEFAULT_FONT_SIZE,
        }
    }

    pub fn color(&self) -> u32 {
        self.color
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    /// Run one command. Returns the event it originated, if any.
    pub fn execute(&mut self, command: Command) -> Option<Event> {
        let version = self.engine.next_version();

        let event = match command {
            Command::Point(at) => Event::point(version, at, self.color),
            Command::Line(from, to) => Event::line(version, from, to, self.color),
            Command::Text(at, text) => Event::text(version, at, text, self.color, self.font_size),
            Command::Area(lower_left, upper_right) => {
                Event::move_area(version, lower_left, upper_right)
            }
            Command::Color(color) => {
                self.color = color;
                tracing::info!("color set to #{:06x}", color);
                return None;
            }
            Command::Font(size) => {
                self.font_size = size;
                tracing::info!("font size set to {}", size);
                return None;
            }
            Command::Status => {
                tracing::info!(
                    "node {} phase={:?} highest=v{} stored={} events in {} versions missing={:?} queued={}",
                    self.engine.node_id(),
                    self.engine.phase(),
                    self.engine.highest_version(),
                    self.engine.stored_len(),
                    self.engine.stored_versions().len(),
                    self.engine.missing_versions(),
                    self.engine.queue_len()
                );
                return None;
            }
        };

        let msg = Message::from(event.clone());
        if !self.engine.fits_datagram(&msg) {
            tracing::warn!(
                "{} v{} does not fit in one datagram, not sent",
                event.kind.name(),
                event.version
            );
            return None;
        }

        if event.is_area_move() {
            self.engine.note_area_version(version);
        }
        self.engine.send_message(msg);
        Some(event)
    }

    /// Execute lines until the input ends or shutdown is signalled.
    pub async fn run(mut self, mut lines: mpsc::Receiver<String>, shutdown: ShutdownController) {
        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else {
                        tracing::info!("console input closed");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_command(&line) {
                        Ok(command) => {
                            if let Some(event) = self.execute(command) {
                                tracing::debug!("originated {} v{}", event.kind.name(), event.version);
                            }
                        }
                        Err(e) => tracing::warn!("ignoring {:?}: {}", line, e),
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
    }
}
