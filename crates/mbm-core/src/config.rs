//! Monitor configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing configuration for the device manager and its sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Timeout for control operations (open, client allocation, identity
    /// and PIN requests)
    pub control_timeout: Duration,
    /// Timeout for signal-info polls
    pub signal_timeout: Duration,
    /// Interval between signal polls while monitoring is active
    pub poll_interval: Duration,
    /// Upper bound on the shutdown barrier; `None` waits indefinitely
    pub shutdown_timeout: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            control_timeout: Duration::from_secs(5),
            signal_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            shutdown_timeout: Some(Duration::from_secs(20)),
        }
    }
}
