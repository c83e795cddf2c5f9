//! The modem control-channel abstraction
//!
//! A [`ModemPort`] is one open connection to a modem's control channel. The
//! wire encoding is out of scope here; the trait models the protocol as an
//! RPC-like service: open the channel, allocate typed clients, issue
//! per-service requests with a timeout, release, close.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProtoError;
use crate::pin::PinStatusReport;
use crate::signal::SignalInfo;

/// Service a typed client can be allocated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// Device management: identity queries, PIN operations
    DeviceManagement,
    /// Network access: signal information
    NetworkAccess,
}

/// Opaque handle to an allocated protocol client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientHandle(pub u32);

impl ClientHandle {
    /// Get the raw handle value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Asynchronous connection to one modem control channel
///
/// Implementations synchronize internally; callers hold the port behind an
/// `Arc` and the session layer guarantees that operations for one device are
/// issued strictly sequentially.
#[async_trait]
pub trait ModemPort: Send + Sync {
    /// Open the control channel
    async fn open(&self, timeout: Duration) -> Result<(), ProtoError>;

    /// Allocate a typed client for `service`
    async fn allocate_client(
        &self,
        service: ServiceKind,
        timeout: Duration,
    ) -> Result<ClientHandle, ProtoError>;

    /// Release a previously allocated client
    ///
    /// Best-effort during teardown; failures are loggable, not fatal.
    async fn release_client(
        &self,
        client: ClientHandle,
        timeout: Duration,
    ) -> Result<(), ProtoError>;

    /// Close the channel, releasing the underlying transport
    async fn close(&self) -> Result<(), ProtoError>;

    /// Query the device manufacturer string
    async fn get_manufacturer(
        &self,
        client: ClientHandle,
        timeout: Duration,
    ) -> Result<String, ProtoError>;

    /// Query the device model string
    async fn get_model(&self, client: ClientHandle, timeout: Duration)
        -> Result<String, ProtoError>;

    /// Query the firmware revision string
    async fn get_revision(
        &self,
        client: ClientHandle,
        timeout: Duration,
    ) -> Result<String, ProtoError>;

    /// Query the SIM PIN lock status
    async fn get_pin_status(
        &self,
        client: ClientHandle,
        timeout: Duration,
    ) -> Result<PinStatusReport, ProtoError>;

    /// Verify a SIM PIN
    async fn verify_pin(
        &self,
        client: ClientHandle,
        pin: &str,
        timeout: Duration,
    ) -> Result<(), ProtoError>;

    /// Query current signal information
    async fn get_signal_info(
        &self,
        client: ClientHandle,
        timeout: Duration,
    ) -> Result<SignalInfo, ProtoError>;
}

/// Factory mapping a hotplug node name to an unopened control channel
pub trait PortProvider: Send + Sync {
    /// Produce the port for a node; the caller opens it
    fn open_port(&self, node_name: &str) -> Arc<dyn ModemPort>;
}
