//! Bridge engine for udpserial
//!
//! This crate provides the per-port bridge: framing of the serial byte stream, the
//! forwarding duties in both directions and the lifecycle a supervisor controls.

pub mod control;
pub mod engine;
pub mod frame;
pub mod state;

pub use control::{BridgeId, DeathNotice, KillRequest};
pub use engine::{Bridge, BridgeEnvironment, BridgeLink, BridgeSettings};
pub use frame::{DEFAULT_FRAME_CAPACITY, Frame, FrameAccumulator};
pub use state::BridgeState;
