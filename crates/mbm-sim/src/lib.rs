//! Modem Simulation Library
//!
//! Everything needed to run the session-lifecycle core without hardware:
//!
//! - **SimModem**: a scripted modem control channel with failure injection
//! - **SimHotplug**: a scripted hotplug source with attach/detach controls
//! - **SimRig**: a bench of modems behind the port-provider seam
//!
//! # Example
//!
//! ```rust
//! use mbm_sim::{modem_node, SimHotplug, SimModem, SimRig};
//! use std::sync::Arc;
//!
//! let rig = SimRig::new();
//! rig.insert("cdc-wdm0", Arc::new(SimModem::ready()));
//!
//! let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
//! ```

pub mod hotplug;
pub mod modem;
pub mod rig;

pub use hotplug::{modem_node, SimHotplug};
pub use modem::{FailPoint, ModemScript, SimModem};
pub use rig::SimRig;
