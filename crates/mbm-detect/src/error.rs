//! Error types for device detection

use thiserror::Error;

/// Errors that can occur while enumerating hotplug nodes
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate a subsystem
    #[error("failed to enumerate subsystem {subsystem}: {reason}")]
    EnumerationFailed { subsystem: String, reason: String },

    /// The event source is no longer delivering events
    #[error("hotplug event source disconnected")]
    SourceDisconnected,
}
