//! Error types for the protocol engine.

use nrf905::RadioError;
use thiserror::Error;

/// Errors returned by engine commands.
///
/// These are rejections of a command at the moment it is issued. Exchanges
/// that run out of retries are reported through
/// [`Outcome`](crate::Outcome) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Another exchange is outstanding.
    #[error("an exchange is already in progress")]
    Busy,

    /// The radio has not finished initializing.
    #[error("radio not ready")]
    NotReady,

    /// No network identity yet; run discovery first.
    #[error("not joined to a fan network")]
    NotJoined,

    /// Speed level outside the preset range.
    #[error("invalid speed level {0}")]
    InvalidSpeed(u8),

    /// The radio refused the transmission.
    #[error("radio error: {0}")]
    Radio(#[from] RadioError),
}

/// Result type alias for engine commands.
pub type EngineResult<T> = Result<T, EngineError>;
