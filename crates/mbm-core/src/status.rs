//! Application-level device status and the PIN-state mapping

use mbm_proto::{PinState, PinStatusReport};
use serde::{Deserialize, Serialize};

/// SIM/lock status of a managed device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    /// Status not yet loaded
    Unknown,
    /// SIM usable, no lock pending
    Ready,
    /// SIM waiting for a PIN
    SimPinLocked,
    /// SIM blocked, PUK required
    SimPukLocked,
    /// SIM missing or unusable
    SimError,
}

/// Map a raw PIN status report to the device status plus the verify
/// attempts remaining
///
/// Fixed lookup table: `Blocked` is PUK-locked with zero attempts; the
/// not-yet-verified states are PIN-locked with whatever retry count the
/// device reported; the verified/disabled family is ready; anything else
/// (including permanently blocked) is a SIM error with no retry count.
pub fn status_from_pin_report(report: &PinStatusReport) -> (DeviceStatus, Option<u8>) {
    match report.state {
        PinState::Blocked => (DeviceStatus::SimPukLocked, Some(0)),
        PinState::NotInitialized | PinState::EnabledNotVerified => {
            (DeviceStatus::SimPinLocked, report.verify_retries_left)
        }
        PinState::Disabled | PinState::EnabledVerified | PinState::Unblocked | PinState::Changed => {
            (DeviceStatus::Ready, None)
        }
        PinState::PermanentlyBlocked => (DeviceStatus::SimError, None),
    }
}
