//! Raw signal readings returned by the network-access service
//!
//! Values are kept in vendor units here (integer dBm, half-dB ECIO steps,
//! SINR levels, tenth-dBm Io). Conversion to plotting-friendly dB floats is
//! the session layer's job.

use serde::{Deserialize, Serialize};

/// CDMA 1x readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdmaSignal {
    /// Received signal strength, dBm
    pub rssi: i8,
    /// Ec/Io in negative half-dB steps (vendor convention)
    pub ecio: i16,
}

/// CDMA EV-DO readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvdoSignal {
    /// Received signal strength, dBm
    pub rssi: i8,
    /// Ec/Io in negative half-dB steps
    pub ecio: i16,
    /// SINR level code, 0..=8
    pub sinr_level: u8,
    /// Total received power (Io) in tenths of a dBm
    pub io: i32,
}

/// WCDMA (UMTS) readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WcdmaSignal {
    /// Received signal strength, dBm
    pub rssi: i8,
    /// Ec/Io in negative half-dB steps
    pub ecio: i16,
}

/// LTE readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LteSignal {
    /// Received signal strength, dBm
    pub rssi: i8,
    /// Reference signal received quality, dB
    pub rsrq: i8,
}

/// One signal-info response
///
/// Only the technologies the modem is currently reporting are present;
/// everything else is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalInfo {
    /// CDMA 1x readings, if reported
    pub cdma: Option<CdmaSignal>,
    /// EV-DO readings, if reported
    pub evdo: Option<EvdoSignal>,
    /// GSM received signal strength in dBm, if reported
    pub gsm_rssi: Option<i8>,
    /// WCDMA readings, if reported
    pub wcdma: Option<WcdmaSignal>,
    /// LTE readings, if reported
    pub lte: Option<LteSignal>,
}
