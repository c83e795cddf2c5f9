//! Unified event stream of the device manager
//!
//! Everything observers care about (device arrivals, removals, detection
//! activity, status changes, signal samples) is emitted through a single
//! [`MonitorEvent`] channel, keeping event ordering consistent for all
//! consumers.

use serde::{Deserialize, Serialize};

use crate::signal::{EcioSample, PowerSample, QualitySample, SinrSample, StrengthSample};
use crate::status::DeviceStatus;

/// Snapshot of a managed device for consumers
///
/// Consumers never hold the session itself; they identify devices by name
/// and read state through these snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable identity, derived from the hotplug node name
    pub name: String,
    /// Manufacturer string reported by the device
    pub manufacturer: String,
    /// Model string reported by the device
    pub model: String,
    /// Firmware revision reported by the device
    pub revision: String,
    /// Current SIM/lock status
    pub status: DeviceStatus,
    /// PIN verify attempts remaining, when known
    pub pin_attempts_left: Option<u8>,
}

/// Events emitted by the device manager and its sessions
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A device finished initialization and joined the live set
    DeviceAdded {
        /// Snapshot of the new device
        device: DeviceInfo,
    },

    /// A live device was removed
    DeviceRemoved {
        /// Name of the removed device
        name: String,
    },

    /// Device detection activity started (true) or drained (false)
    DetectionActivity {
        /// Whether at least one construction is in flight
        active: bool,
    },

    /// The startup enumeration and its resulting constructions finished
    ///
    /// Fires exactly once per manager lifetime.
    InitialScanDone,

    /// A device's SIM/lock status changed
    StatusChanged {
        /// Device name
        name: String,
        /// New status
        status: DeviceStatus,
        /// Verify attempts remaining, when reported
        attempts_left: Option<u8>,
    },

    /// New received-signal-strength sample
    StrengthUpdated {
        /// Device name
        name: String,
        /// Per-technology strength, dBm
        sample: StrengthSample,
    },

    /// New Ec/Io interference sample
    EcioUpdated {
        /// Device name
        name: String,
        /// Per-technology Ec/Io, dB
        sample: EcioSample,
    },

    /// New EV-DO SINR sample
    SinrUpdated {
        /// Device name
        name: String,
        /// SINR, dB
        sample: SinrSample,
    },

    /// New EV-DO total received power sample
    PowerUpdated {
        /// Device name
        name: String,
        /// Io, dBm
        sample: PowerSample,
    },

    /// New LTE reference signal quality sample
    QualityUpdated {
        /// Device name
        name: String,
        /// RSRQ, dB
        sample: QualitySample,
    },
}

impl MonitorEvent {
    /// True for the per-poll signal sample events
    pub fn is_signal_sample(&self) -> bool {
        matches!(
            self,
            MonitorEvent::StrengthUpdated { .. }
                | MonitorEvent::EcioUpdated { .. }
                | MonitorEvent::SinrUpdated { .. }
                | MonitorEvent::PowerUpdated { .. }
                | MonitorEvent::QualityUpdated { .. }
        )
    }

    /// The device this event concerns, if any
    pub fn device_name(&self) -> Option<&str> {
        match self {
            MonitorEvent::DeviceAdded { device } => Some(&device.name),
            MonitorEvent::DeviceRemoved { name }
            | MonitorEvent::StatusChanged { name, .. }
            | MonitorEvent::StrengthUpdated { name, .. }
            | MonitorEvent::EcioUpdated { name, .. }
            | MonitorEvent::SinrUpdated { name, .. }
            | MonitorEvent::PowerUpdated { name, .. }
            | MonitorEvent::QualityUpdated { name, .. } => Some(name),
            MonitorEvent::DetectionActivity { .. } | MonitorEvent::InitialScanDone => None,
        }
    }
}
