//! Transport layer for udpserial
//!
//! This crate opens the two kinds of endpoints a bridge owns: the serial device and
//! the pair of UDP sockets. Both are reached through traits so the bridge engine can
//! be driven by in-memory devices.

pub mod serial;
pub mod udp;

pub use serial::{SerialIo, SerialOpener, SerialSettings, TokioSerialOpener};
pub use udp::{DatagramSink, MAX_DATAGRAM_SIZE, UdpEndpoints, UdpSettings};
pub use udpserial_core::{UdpSerialError, UdpSerialResult};
