//! Bridge lifecycle state machine

use udpserial_core::{UdpSerialError, UdpSerialResult};

/// Lifecycle state of a bridge
///
/// # State Transitions
/// ```text
/// Opening -> Running     (device and sockets opened)
/// Opening -> Terminated  (any open failure)
/// Running -> Draining    (kill request received)
/// Draining -> Terminated (every duty has exited)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    /// Resolving the device path and opening the serial device and sockets
    #[default]
    Opening,
    /// All duties are forwarding traffic
    Running,
    /// Cancellation has been signalled, duties are exiting
    Draining,
    /// Resources are closed and the death has been reported
    Terminated,
}

impl BridgeState {
    /// Validate state transition
    pub fn validate_transition(&self, new_state: BridgeState) -> UdpSerialResult<()> {
        let valid = matches!(
            (*self, new_state),
            (BridgeState::Opening, BridgeState::Running)
                | (BridgeState::Opening, BridgeState::Terminated)
                | (BridgeState::Running, BridgeState::Draining)
                | (BridgeState::Draining, BridgeState::Terminated)
        );

        if valid {
            Ok(())
        } else {
            Err(UdpSerialError::InvalidData(format!(
                "Invalid bridge state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    /// Whether the bridge has finished for good
    pub fn is_terminated(&self) -> bool {
        matches!(self, BridgeState::Terminated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Opening => "Opening",
            BridgeState::Running => "Running",
            BridgeState::Draining => "Draining",
            BridgeState::Terminated => "Terminated",
        }
    }
}
