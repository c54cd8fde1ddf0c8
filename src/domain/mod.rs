//! Domain Layer
//!
//! Ports through which the sync engine reaches the network and the view.

pub mod ports;
