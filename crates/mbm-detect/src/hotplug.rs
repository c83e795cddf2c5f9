//! Hotplug event source abstraction
//!
//! The manager consumes arrival/removal notifications through this trait;
//! the simulator in `mbm-sim` provides the scripted implementation used in
//! tests and the demo binary.

use tokio::sync::mpsc;

use crate::error::DetectError;
use crate::node::{HotplugEvent, NodeDescriptor};

/// Source of hotplug notifications plus a synchronous enumeration snapshot
pub trait HotplugSource: Send {
    /// Subscribe to events for the given subsystems
    ///
    /// Called once by the manager; subsequent events for other subsystems
    /// are not delivered.
    fn subscribe(&mut self, subsystems: &[&str]) -> mpsc::UnboundedReceiver<HotplugEvent>;

    /// Enumerate the nodes currently present in one subsystem
    fn enumerate(&self, subsystem: &str) -> Result<Vec<NodeDescriptor>, DetectError>;
}
