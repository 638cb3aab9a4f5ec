//! Protocol errors

use thiserror::Error;

use super::DeviceErrorCode;

/// Errors that can occur during camera communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Response timeout")]
    Timeout,

    #[error("Unexpected response: expected opcode {expected:#04x}, got {actual:#04x}")]
    Mismatch { expected: u8, actual: u8 },

    #[error("Camera returned error: {0}")]
    DeviceError(DeviceErrorCode),

    #[error("Short write: transport accepted {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    #[error("Camera did not synchronize after {attempts} attempts")]
    SyncFailed { attempts: u32 },

    #[error("Incomplete transfer: received {received} of {expected} bytes")]
    TransferIncomplete { received: usize, expected: usize },

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// Timeouts and mismatches usually mean the link lost sync; re-running
    /// [`Camera::synchronize`](super::Camera::synchronize) tends to recover.
    /// Device errors, write failures and I/O errors are terminal for the call.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Timeout
                | ProtocolError::Mismatch { .. }
                | ProtocolError::InvalidPacket(_)
                | ProtocolError::TransferIncomplete { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(ProtocolError::Timeout.is_recoverable());
        assert!(ProtocolError::Mismatch {
            expected: 0x01,
            actual: 0x0A
        }
        .is_recoverable());
        assert!(!ProtocolError::DeviceError(DeviceErrorCode(0x0B)).is_recoverable());
        assert!(!ProtocolError::ShortWrite {
            expected: 6,
            written: 3
        }
        .is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::DeviceError(DeviceErrorCode(0x0B));
        assert_eq!(err.to_string(), "Camera returned error: 0x0b (parameter error)");

        let err = ProtocolError::Mismatch {
            expected: 0x04,
            actual: 0x0E,
        };
        assert_eq!(
            err.to_string(),
            "Unexpected response: expected opcode 0x04, got 0x0e"
        );
    }
}
