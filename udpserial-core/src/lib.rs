//! Core types for the udpserial bridge
//!
//! This crate holds what every other crate of the workspace shares: the error type,
//! the port specification, configuration and device mapping storage, the lookup trait
//! the engine reads them through, and the traffic counters.

pub mod catalog;
pub mod config;
pub mod counters;
pub mod definitions;
pub mod error;
pub mod port;

pub use catalog::PortCatalog;
pub use config::Config;
pub use counters::{PortCounters, PortSnapshot, Statistics, StatisticsSnapshot};
pub use definitions::{Definitions, PortDefinition};
pub use error::{UdpSerialError, UdpSerialResult};
pub use port::{PortSpec, decode_separator};
