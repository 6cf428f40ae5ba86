//! Messages exchanged between a bridge and its supervisor

use std::fmt;
use tokio::sync::oneshot;

/// Identity of one bridge launch
///
/// Every launch of a port gets a fresh id, so a death report can be matched against
/// the launch it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BridgeId(pub u64);

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Request to stop a running bridge
///
/// The bridge acknowledges by answering on the enclosed channel as soon as it starts
/// draining.
#[derive(Debug)]
pub struct KillRequest {
    ack: oneshot::Sender<()>,
}

impl KillRequest {
    /// Create a request and the receiver its acknowledgement arrives on
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (ack, acked) = oneshot::channel();
        (Self { ack }, acked)
    }

    pub fn acknowledge(self) {
        // The sender may already have given up waiting.
        let _ = self.ack.send(());
    }
}

/// Report sent by a bridge once it has terminated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathNotice {
    pub id: BridgeId,
    pub port: String,
}
