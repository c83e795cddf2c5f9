//! Hotplug node descriptors and events

use serde::{Deserialize, Serialize};

/// Description of one low-level interface node as reported by the host
///
/// Ephemeral: produced per event, consumed by the candidate filter, never
/// stored beyond that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Subsystem the node belongs to (e.g. "usbmisc")
    pub subsystem: String,
    /// Node name (e.g. "cdc-wdm0"); also the stable device identity
    pub name: String,
    /// Driver bound to the node, if any
    pub driver: Option<String>,
    /// Driver bound to the parent node, if any
    pub parent_driver: Option<String>,
}

impl NodeDescriptor {
    /// Convenience constructor for a node with its own driver
    pub fn new(subsystem: &str, name: &str, driver: &str) -> Self {
        Self {
            subsystem: subsystem.to_string(),
            name: name.to_string(),
            driver: Some(driver.to_string()),
            parent_driver: None,
        }
    }

    /// The driver considered for filtering: the node's own, or the
    /// parent's when the node itself has none
    pub fn effective_driver(&self) -> Option<&str> {
        self.driver.as_deref().or(self.parent_driver.as_deref())
    }
}

/// Hotplug action kinds delivered by the event source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HotplugAction {
    /// Node appeared
    Add,
    /// Node disappeared
    Remove,
    /// Node moved within the device tree
    Move,
    /// Node attributes changed
    Change,
}

impl HotplugAction {
    /// True for the action kinds that can introduce a new candidate
    pub fn is_arrival(&self) -> bool {
        matches!(
            self,
            HotplugAction::Add | HotplugAction::Move | HotplugAction::Change
        )
    }
}

/// One hotplug notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotplugEvent {
    /// What happened
    pub action: HotplugAction,
    /// The node it happened to
    pub node: NodeDescriptor,
}
