//! Error types for zehnder-packet.

use thiserror::Error;

/// Errors that can occur during frame operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Buffer length does not match the fixed frame size.
    #[error("Bad frame length: {actual} bytes (expected {expected})")]
    BadLength {
        /// Required size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },

    /// Speed byte outside the preset range.
    #[error("Invalid fan speed: {0}")]
    InvalidSpeed(u8),
}

impl PacketError {
    /// Create a bad length error for a buffer of `actual` bytes.
    pub fn bad_length(actual: usize) -> Self {
        PacketError::BadLength {
            expected: crate::FRAME_SIZE,
            actual,
        }
    }
}
