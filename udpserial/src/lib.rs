//! udpserial - serial port to UDP bridge service
//!
//! Every configured serial port is bridged to a pair of UDP endpoints: datagrams
//! received on the listen address are written to the port, and bytes read from the
//! port are cut into frames and sent to the destination address.
//!
//! # Architecture
//!
//! - `udpserial-core`: error type, port specs, configuration storage, counters
//! - `udpserial-transport`: serial and UDP endpoints
//! - `udpserial-bridge`: framing and the per-port bridge engine
//! - `udpserial-server`: context, supervisor, statistics sampler and service
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use udpserial::server::{Context, Service, ServiceSettings};
//! use udpserial::transport::TokioSerialOpener;
//!
//! # async fn run() -> udpserial::UdpSerialResult<()> {
//! let context = Context::init("config.json", "definitions.json")?;
//! let service = Service::start(
//!     Arc::new(context),
//!     Arc::new(TokioSerialOpener),
//!     ServiceSettings::default(),
//! );
//! println!("{:?}", service.snapshot());
//! service.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub use udpserial_core::{
    Config, Definitions, PortSpec, StatisticsSnapshot, UdpSerialError, UdpSerialResult,
};

pub mod bridge {
    pub use udpserial_bridge::*;
}

pub mod server {
    pub use udpserial_server::*;
}

pub mod transport {
    pub use udpserial_transport::*;
}
