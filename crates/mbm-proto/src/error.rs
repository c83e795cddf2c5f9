//! Error types for the vendor protocol layer

use std::time::Duration;

use thiserror::Error;

/// Errors reported by a modem control channel
#[derive(Debug, Clone, Error)]
pub enum ProtoError {
    /// Transport-level failure (I/O error, device gone, framing problem)
    #[error("transport failure: {0}")]
    Transport(String),

    /// The request did not complete within its timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The device reported an internal protocol error
    ///
    /// During the lock-status query this means the SIM state is simply
    /// unreadable (usually no SIM present) and is not fatal.
    #[error("internal protocol error: {0}")]
    Internal(String),

    /// The device rejected the request with an incorrect-PIN result
    ///
    /// Some firmwares also return this transiently for plain status
    /// *queries* during early boot; callers of the status query treat it
    /// as a retry condition, not a failure.
    #[error("incorrect PIN")]
    IncorrectPin,

    /// The response could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProtoError {
    /// True for the internal-error code that the lock-status query maps to
    /// "SIM unreadable" instead of a failure.
    pub fn is_internal(&self) -> bool {
        matches!(self, ProtoError::Internal(_))
    }
}
