mod event_sink;
mod transport;

pub use event_sink::EventSink;
pub use transport::{Datagram, Transport, TransportError};
