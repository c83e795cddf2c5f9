//! Vendor Protocol Abstraction
//!
//! This crate defines the typed surface of the modem control protocol as the
//! rest of the workspace sees it: service kinds, client handles, PIN status
//! vocabulary, raw signal readings, and the async [`ModemPort`] trait that a
//! real transport (or the simulator in `mbm-sim`) implements.
//!
//! The wire format itself is deliberately out of scope; the protocol is an
//! opaque RPC-like external service.

pub mod error;
pub mod pin;
pub mod port;
pub mod signal;

pub use error::ProtoError;
pub use pin::{PinState, PinStatusReport};
pub use port::{ClientHandle, ModemPort, PortProvider, ServiceKind};
pub use signal::{CdmaSignal, EvdoSignal, LteSignal, SignalInfo, WcdmaSignal};
