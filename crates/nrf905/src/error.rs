//! Error types for the nRF905 driver.

use crate::Pin;
use embedded_hal::spi::ErrorKind;
use thiserror::Error;

/// Fatal errors raised while bringing up the transceiver.
///
/// A driver that failed to initialize stays unusable: every later
/// transmission attempt fails with [`RadioError::NotReady`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    /// A mandatory control signal is not bound.
    #[error("{0} pin is not configured")]
    MissingPin(Pin),

    /// The requested configuration cannot be expressed or does not match the
    /// fixed frame geometry.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// SPI bus failure.
    #[error("SPI error: {0}")]
    Spi(ErrorKind),

    /// A register did not hold the value written to it.
    #[error("{register} register mismatch: wrote {expected:02X?}, read back {actual:02X?}")]
    RegisterMismatch {
        /// Which register block failed verification.
        register: &'static str,
        /// Bytes written.
        expected: Vec<u8>,
        /// Bytes read back.
        actual: Vec<u8>,
    },
}

impl InitError {
    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        InitError::InvalidConfig(message.into())
    }
}

/// Transient errors from runtime operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RadioError {
    /// A transmission or reply wait is already pending.
    #[error("radio busy")]
    Busy,

    /// The driver has not been (successfully) initialized.
    #[error("radio not initialized")]
    NotReady,

    /// SPI bus failure.
    #[error("SPI error: {0}")]
    Spi(ErrorKind),
}
