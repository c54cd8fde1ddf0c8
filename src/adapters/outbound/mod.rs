mod logging_board;
mod memory_transport;
mod multicast_transport;

pub use logging_board::{LoggingBoard, ViewArea};
pub use memory_transport::{MemoryHub, MemoryTransport};
pub use multicast_transport::{is_own_source, MulticastConfig, MulticastTransport};
