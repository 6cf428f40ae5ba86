//! Supervision layer for udpserial
//!
//! This crate provides the service context, the bridge supervisor, the statistics
//! sampler and the [`Service`] that ties them together.

pub mod context;
pub mod sampler;
pub mod service;
pub mod supervisor;

pub use context::Context;
pub use sampler::Sampler;
pub use service::{Service, ServiceSettings};
pub use supervisor::{
    RestartOutcome, StopOutcome, StopReport, Supervisor, SupervisorHandle, SupervisorSettings,
    SupervisorStatus,
};
pub use udpserial_core::{UdpSerialError, UdpSerialResult};
