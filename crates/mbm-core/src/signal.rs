//! Per-family signal samples in plotting units
//!
//! The protocol layer reports raw vendor units; consumers want dB/dBm
//! floats, one sample per metric family per poll. A technology that did not
//! report a reading carries [`NO_READING`], far below any valid value, so
//! graphs can tell "no data" from "very weak signal".

use mbm_proto::SignalInfo;

/// Sentinel for "this technology reported nothing this poll"
pub const NO_READING: f64 = f64::NEG_INFINITY;

/// EV-DO SINR level codes to dB
///
/// The vendor reports SINR as a level code; the dB values per level are
/// fixed by the protocol documentation.
fn sinr_level_to_db(level: u8) -> f64 {
    match level {
        0 => -9.0,
        1 => -6.0,
        2 => -4.5,
        3 => -3.0,
        4 => -2.0,
        5 => 1.0,
        6 => 3.0,
        7 => 6.0,
        8 => 9.0,
        _ => NO_READING,
    }
}

/// Ec/Io arrives in negative half-dB steps
fn ecio_to_db(ecio: i16) -> f64 {
    -0.5 * f64::from(ecio)
}

/// Received signal strength per technology, dBm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrengthSample {
    pub gsm: f64,
    pub umts: f64,
    pub lte: f64,
    pub cdma: f64,
    pub evdo: f64,
}

/// Ec/Io interference ratio per technology, dB
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EcioSample {
    pub umts: f64,
    pub cdma: f64,
    pub evdo: f64,
}

/// EV-DO signal-to-interference-plus-noise ratio, dB
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinrSample {
    pub evdo: f64,
}

/// EV-DO total received power (Io), dBm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSample {
    pub evdo: f64,
}

/// LTE reference signal received quality, dB
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySample {
    pub lte: f64,
}

impl From<&SignalInfo> for StrengthSample {
    fn from(info: &SignalInfo) -> Self {
        Self {
            gsm: info.gsm_rssi.map_or(NO_READING, f64::from),
            umts: info.wcdma.map_or(NO_READING, |w| f64::from(w.rssi)),
            lte: info.lte.map_or(NO_READING, |l| f64::from(l.rssi)),
            cdma: info.cdma.map_or(NO_READING, |c| f64::from(c.rssi)),
            evdo: info.evdo.map_or(NO_READING, |e| f64::from(e.rssi)),
        }
    }
}

impl From<&SignalInfo> for EcioSample {
    fn from(info: &SignalInfo) -> Self {
        Self {
            umts: info.wcdma.map_or(NO_READING, |w| ecio_to_db(w.ecio)),
            cdma: info.cdma.map_or(NO_READING, |c| ecio_to_db(c.ecio)),
            evdo: info.evdo.map_or(NO_READING, |e| ecio_to_db(e.ecio)),
        }
    }
}

impl From<&SignalInfo> for SinrSample {
    fn from(info: &SignalInfo) -> Self {
        Self {
            evdo: info
                .evdo
                .map_or(NO_READING, |e| sinr_level_to_db(e.sinr_level)),
        }
    }
}

impl From<&SignalInfo> for PowerSample {
    fn from(info: &SignalInfo) -> Self {
        Self {
            evdo: info.evdo.map_or(NO_READING, |e| 0.1 * f64::from(e.io)),
        }
    }
}

impl From<&SignalInfo> for QualitySample {
    fn from(info: &SignalInfo) -> Self {
        Self {
            lte: info.lte.map_or(NO_READING, |l| f64::from(l.rsrq)),
        }
    }
}
