//! SIM PIN lock state as reported by the device-management service

use serde::{Deserialize, Serialize};

/// Raw PIN state codes of the vendor protocol
///
/// This is the on-the-wire vocabulary; mapping to an application-level
/// device status happens in the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinState {
    /// SIM not yet initialized by the firmware
    NotInitialized,
    /// PIN enabled, not yet verified
    EnabledNotVerified,
    /// PIN enabled and verified
    EnabledVerified,
    /// PIN disabled
    Disabled,
    /// PIN blocked, PUK required
    Blocked,
    /// PUK exhausted, SIM unusable
    PermanentlyBlocked,
    /// PIN unblocked via PUK
    Unblocked,
    /// PIN changed
    Changed,
}

/// Result of a lock-status query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinStatusReport {
    /// Reported PIN state
    pub state: PinState,
    /// Verify attempts remaining, when the device reports them
    pub verify_retries_left: Option<u8>,
}

impl PinStatusReport {
    /// Convenience constructor for a state without a retry count
    pub fn new(state: PinState) -> Self {
        Self {
            state,
            verify_retries_left: None,
        }
    }

    /// Constructor with a retry count
    pub fn with_retries(state: PinState, retries: u8) -> Self {
        Self {
            state,
            verify_retries_left: Some(retries),
        }
    }
}
