//! Scripted hotplug source
//!
//! [`SimHotplug`] keeps a snapshot of present nodes and pushes attach and
//! detach notifications to whoever subscribed. Clones share the same state,
//! so a test holds one clone as its control handle while the manager owns
//! another as its event source.

use std::sync::{Arc, Mutex, MutexGuard};

use mbm_detect::{DetectError, HotplugAction, HotplugEvent, HotplugSource, NodeDescriptor};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Default)]
struct HotplugInner {
    nodes: Vec<NodeDescriptor>,
    subscriber: Option<mpsc::UnboundedSender<HotplugEvent>>,
    subsystems: Vec<String>,
    fail_enumeration: bool,
}

/// Simulated hotplug event source and enumeration snapshot
#[derive(Debug, Clone, Default)]
pub struct SimHotplug {
    inner: Arc<Mutex<HotplugInner>>,
}

/// A candidate modem control node, the shape the filter accepts
pub fn modem_node(name: &str) -> NodeDescriptor {
    NodeDescriptor::new("usbmisc", name, "qmi_wwan")
}

impl SimHotplug {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source with nodes already present
    pub fn with_nodes(nodes: Vec<NodeDescriptor>) -> Self {
        let sim = Self::new();
        sim.lock().nodes = nodes;
        sim
    }

    fn lock(&self) -> MutexGuard<'_, HotplugInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn notify(inner: &HotplugInner, action: HotplugAction, node: NodeDescriptor) {
        let Some(tx) = &inner.subscriber else {
            return;
        };
        if !inner.subsystems.iter().any(|s| *s == node.subsystem) {
            return;
        }
        let _ = tx.send(HotplugEvent { action, node });
    }

    /// Make every enumeration call fail
    pub fn fail_enumeration(&self) {
        self.lock().fail_enumeration = true;
    }

    /// Plug a node in: adds it to the snapshot and notifies the subscriber
    pub fn attach(&self, node: NodeDescriptor) {
        let mut inner = self.lock();
        debug!(name = %node.name, "simulated attach");
        inner.nodes.push(node.clone());
        Self::notify(&inner, HotplugAction::Add, node);
    }

    /// Unplug a node by name
    pub fn detach(&self, name: &str) {
        let mut inner = self.lock();
        let Some(index) = inner.nodes.iter().position(|n| n.name == name) else {
            return;
        };
        let node = inner.nodes.remove(index);
        debug!(name = %node.name, "simulated detach");
        Self::notify(&inner, HotplugAction::Remove, node);
    }

    /// Re-announce a node that is already present
    pub fn reannounce(&self, name: &str) {
        let inner = self.lock();
        if let Some(node) = inner.nodes.iter().find(|n| n.name == name).cloned() {
            Self::notify(&inner, HotplugAction::Add, node);
        }
    }
}

impl HotplugSource for SimHotplug {
    fn subscribe(&mut self, subsystems: &[&str]) -> mpsc::UnboundedReceiver<HotplugEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        inner.subscriber = Some(tx);
        inner.subsystems = subsystems.iter().map(|s| s.to_string()).collect();
        rx
    }

    fn enumerate(&self, subsystem: &str) -> Result<Vec<NodeDescriptor>, DetectError> {
        let inner = self.lock();
        if inner.fail_enumeration {
            return Err(DetectError::EnumerationFailed {
                subsystem: subsystem.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(inner
            .nodes
            .iter()
            .filter(|n| n.subsystem == subsystem)
            .cloned()
            .collect())
    }
}
