use thiserror::Error;

/// Main error type for udpserial operations
///
/// Every fault is scoped to a single port except the ones raised while loading the
/// base configuration at process start.
#[derive(Error, Debug)]
pub enum UdpSerialError {
    /// A logical port name is absent from the device mapping or the active configuration
    #[error("Not found: {0}")]
    NotFound(String),

    /// A serial device or UDP socket could not be opened
    #[error("Failed to open {resource}: {reason}")]
    Open { resource: String, reason: String },

    /// A single read or write failed while a bridge was running
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// A frame could not be sent to the UDP destination and was dropped
    #[error("Lost packet of {size} bytes: {source}")]
    LostPacket {
        size: usize,
        #[source]
        source: std::io::Error,
    },

    /// A bridge did not accept its kill request within the deadline
    #[error("Bridge {0} did not acknowledge kill request")]
    KillTimeout(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The supervisor control task has exited
    #[error("Supervisor unavailable")]
    SupervisorUnavailable,
}

impl UdpSerialError {
    /// Build an [`UdpSerialError::Open`] from any displayable cause
    pub fn open(resource: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        UdpSerialError::Open {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for udpserial operations
pub type UdpSerialResult<T> = Result<T, UdpSerialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_display() {
        let err = UdpSerialError::open("/dev/ttyUSB0", "permission denied");
        assert_eq!(
            err.to_string(),
            "Failed to open /dev/ttyUSB0: permission denied"
        );
    }

    #[test]
    fn test_io_error_converts_to_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: UdpSerialError = io.into();
        assert!(matches!(err, UdpSerialError::Connection(_)));
    }
}
