//! Modem Session Lifecycle Core
//!
//! This crate is the heart of the monitor: it watches hotplug notifications
//! for modem control channels, initializes a [`DeviceSession`] for each one
//! (identity query, SIM lock status, optional PIN unlock), polls signal
//! metrics at 1 Hz while monitoring is on, and tears everything down with a
//! barrier-synchronized shutdown.
//!
//! All state lives behind the [`DeviceManager`] actor; consumers hold a
//! cloneable handle, refer to devices by name, and observe changes through
//! a unified [`MonitorEvent`] stream.

pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod pending;
pub mod session;
pub mod signal;
pub mod status;

mod task;

pub use config::MonitorConfig;
pub use error::CoreError;
pub use events::{DeviceInfo, MonitorEvent};
pub use manager::DeviceManager;
pub use pending::{CancelToken, PendingRegistry};
pub use session::DeviceSession;
pub use signal::{
    EcioSample, PowerSample, QualitySample, SinrSample, StrengthSample, NO_READING,
};
pub use status::{status_from_pin_report, DeviceStatus};
