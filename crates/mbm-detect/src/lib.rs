//! Modem Control-Channel Detection
//!
//! This crate models what the host tells us about plugged-in hardware and
//! decides which nodes are worth managing: the [`NodeDescriptor`] vocabulary,
//! the [`HotplugSource`] subscription/enumeration seam, and the pure
//! candidate filter.
//!
//! # Example
//!
//! ```rust
//! use mbm_detect::{is_candidate, NodeDescriptor};
//!
//! let node = NodeDescriptor::new("usbmisc", "cdc-wdm0", "qmi_wwan");
//! assert!(is_candidate(&node));
//! ```

pub mod error;
pub mod filter;
pub mod hotplug;
pub mod node;

pub use error::DetectError;
pub use filter::{
    is_candidate, CONTROL_NODE_PREFIX, MODEM_SUBSYSTEMS, USB_SUBSYSTEM_PREFIX, VENDOR_DRIVER,
};
pub use hotplug::HotplugSource;
pub use node::{HotplugAction, HotplugEvent, NodeDescriptor};
