//! Error types for the session-lifecycle core

use mbm_proto::ProtoError;
use thiserror::Error;

use crate::status::DeviceStatus;

/// Errors reported by the device manager and device sessions
#[derive(Debug, Error)]
pub enum CoreError {
    /// No live device with that name
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Unlock requested on a device that is not PIN-locked
    #[error("device is not PIN-locked (status {0:?})")]
    NotPinLocked(DeviceStatus),

    /// The PIN was not accepted
    #[error("PIN not accepted (status {status:?}, {attempts_left:?} attempts left)")]
    UnlockRejected {
        /// Status after the post-verify reload
        status: DeviceStatus,
        /// Verify attempts remaining, when reported
        attempts_left: Option<u8>,
    },

    /// Signal monitoring is already running
    #[error("signal monitoring already active")]
    MonitoringActive,

    /// Signal monitoring is not running
    #[error("signal monitoring not active")]
    MonitoringInactive,

    /// The session has already been closed
    #[error("session already closed")]
    SessionClosed,

    /// The device manager task has stopped
    #[error("device manager stopped")]
    ManagerStopped,

    /// Device initialization was cancelled
    #[error("initialization cancelled")]
    Cancelled,

    /// A protocol operation failed; `step` identifies which one
    #[error("cannot {step}: {source}")]
    Step {
        /// The pipeline step or operation that failed
        step: &'static str,
        /// Underlying protocol error
        #[source]
        source: ProtoError,
    },
}

impl CoreError {
    /// Wrap a protocol error with the step it belongs to
    pub fn step(step: &'static str, source: ProtoError) -> Self {
        CoreError::Step { step, source }
    }

    /// True for errors that mark an operation as invalid in the current
    /// state rather than a failed protocol exchange
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            CoreError::DeviceNotFound(_)
                | CoreError::NotPinLocked(_)
                | CoreError::MonitoringActive
                | CoreError::MonitoringInactive
        )
    }
}
