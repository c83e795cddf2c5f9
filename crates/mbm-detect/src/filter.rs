//! Candidate filter for modem control channels
//!
//! Pure predicate deciding whether a hotplug node looks like a control
//! channel we should try to manage. No state, no side effects.

use crate::node::NodeDescriptor;

/// Subsystem prefix candidate nodes must carry
pub const USB_SUBSYSTEM_PREFIX: &str = "usb";

/// Name prefix of modem control-channel nodes
pub const CONTROL_NODE_PREFIX: &str = "cdc-wdm";

/// Driver that marks a node as speaking the vendor protocol
pub const VENDOR_DRIVER: &str = "qmi_wwan";

/// Subsystems the manager subscribes to and enumerates at startup
pub const MODEM_SUBSYSTEMS: &[&str] = &["usb", "usbmisc"];

/// Decide whether a node is a candidate modem control channel
///
/// All three conditions must hold: the subsystem starts with
/// [`USB_SUBSYSTEM_PREFIX`], the name starts with [`CONTROL_NODE_PREFIX`],
/// and the node's driver (or its parent's, when the node has none) equals
/// [`VENDOR_DRIVER`].
pub fn is_candidate(node: &NodeDescriptor) -> bool {
    node.subsystem.starts_with(USB_SUBSYSTEM_PREFIX)
        && node.name.starts_with(CONTROL_NODE_PREFIX)
        && node.effective_driver() == Some(VENDOR_DRIVER)
}
