//! Per-device session state machine
//!
//! A [`DeviceSession`] owns one open modem control channel and walks it
//! through its life: the initialization pipeline (open → identity query →
//! lock-status load), the optional PIN unlock, optional signal monitoring,
//! and close. Steps for one device are strictly sequential; concurrency
//! only exists across devices.

use std::sync::Arc;
use std::time::Duration;

use mbm_proto::{ClientHandle, ModemPort, ProtoError, ServiceKind, SignalInfo};
use tracing::{debug, warn};

use crate::config::MonitorConfig;
use crate::error::CoreError;
use crate::events::DeviceInfo;
use crate::pending::CancelToken;
use crate::status::{status_from_pin_report, DeviceStatus};

/// One initialized modem session
///
/// Created only by a successful run of [`DeviceSession::initialize`]; owned
/// by the device manager afterwards. The identity-query client stays
/// allocated for PIN operations and is released on close.
pub struct DeviceSession {
    name: String,
    manufacturer: String,
    model: String,
    revision: String,
    status: DeviceStatus,
    pin_attempts_left: Option<u8>,
    port: Arc<dyn ModemPort>,
    dms: Option<ClientHandle>,
    nas: Option<ClientHandle>,
    config: MonitorConfig,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("status", &self.status)
            .field("monitoring", &self.nas.is_some())
            .finish()
    }
}

/// Best-effort teardown of a half-built session
async fn discard(port: &dyn ModemPort, client: Option<ClientHandle>, timeout: Duration) {
    if let Some(client) = client {
        if let Err(e) = port.release_client(client, timeout).await {
            debug!("releasing client during teardown failed: {e}");
        }
    }
    if let Err(e) = port.close().await {
        debug!("closing port during teardown failed: {e}");
    }
}

/// Run the lock-status query with its two firmware quirks folded in
///
/// An internal protocol error means the SIM state is unreadable (usually no
/// SIM) and maps to `SimError` instead of failing. An incorrect-PIN answer
/// to a plain *query* is a known transient of early boot; keep asking until
/// the firmware settles. The retry is deliberately unbounded, matching the
/// firmware behavior.
async fn query_lock_status(
    port: &dyn ModemPort,
    dms: ClientHandle,
    timeout: Duration,
) -> Result<(DeviceStatus, Option<u8>), CoreError> {
    loop {
        match port.get_pin_status(dms, timeout).await {
            Ok(report) => return Ok(status_from_pin_report(&report)),
            Err(ProtoError::Internal(reason)) => {
                debug!(%reason, "PIN status unreadable, assuming missing SIM");
                return Ok((DeviceStatus::SimError, None));
            }
            Err(ProtoError::IncorrectPin) => {
                debug!("incorrect-PIN answer to a status query, retrying");
                continue;
            }
            Err(e) => return Err(CoreError::step("get PIN status", e)),
        }
    }
}

impl DeviceSession {
    /// Run the initialization pipeline on an unopened port
    ///
    /// Strictly sequential: open, allocate the device-management client,
    /// fetch manufacturer/model/revision, load the lock status. Any failure
    /// tears the partial session down and fails the construction. The
    /// cancellation token is checked between steps; a cancelled pipeline
    /// discards whatever it built and returns [`CoreError::Cancelled`].
    pub async fn initialize(
        name: String,
        port: Arc<dyn ModemPort>,
        config: MonitorConfig,
        cancel: CancelToken,
    ) -> Result<Self, CoreError> {
        let t = config.control_timeout;

        port.open(t)
            .await
            .map_err(|e| CoreError::step("open device", e))?;
        debug!(device = %name, "control channel opened");

        if cancel.is_cancelled() {
            discard(port.as_ref(), None, t).await;
            return Err(CoreError::Cancelled);
        }

        let dms = match port.allocate_client(ServiceKind::DeviceManagement, t).await {
            Ok(client) => client,
            Err(e) => {
                discard(port.as_ref(), None, t).await;
                return Err(CoreError::step("allocate device-management client", e));
            }
        };
        debug!(device = %name, "device-management client allocated");

        if cancel.is_cancelled() {
            discard(port.as_ref(), Some(dms), t).await;
            return Err(CoreError::Cancelled);
        }

        let manufacturer = match port.get_manufacturer(dms, t).await {
            Ok(s) => s,
            Err(e) => {
                discard(port.as_ref(), Some(dms), t).await;
                return Err(CoreError::step("get manufacturer", e));
            }
        };
        let model = match port.get_model(dms, t).await {
            Ok(s) => s,
            Err(e) => {
                discard(port.as_ref(), Some(dms), t).await;
                return Err(CoreError::step("get model", e));
            }
        };
        let revision = match port.get_revision(dms, t).await {
            Ok(s) => s,
            Err(e) => {
                discard(port.as_ref(), Some(dms), t).await;
                return Err(CoreError::step("get revision", e));
            }
        };
        debug!(device = %name, %manufacturer, %model, "identity loaded");

        if cancel.is_cancelled() {
            discard(port.as_ref(), Some(dms), t).await;
            return Err(CoreError::Cancelled);
        }

        let (status, pin_attempts_left) = match query_lock_status(port.as_ref(), dms, t).await {
            Ok(pair) => pair,
            Err(e) => {
                discard(port.as_ref(), Some(dms), t).await;
                return Err(e);
            }
        };

        if cancel.is_cancelled() {
            discard(port.as_ref(), Some(dms), t).await;
            return Err(CoreError::Cancelled);
        }

        Ok(Self {
            name,
            manufacturer,
            model,
            revision,
            status,
            pin_attempts_left,
            port,
            dms: Some(dms),
            nas: None,
            config,
        })
    }

    /// Device name (stable identity)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Manufacturer string
    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    /// Model string
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Firmware revision string
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Current SIM/lock status
    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// PIN verify attempts remaining, when known
    pub fn pin_attempts_left(&self) -> Option<u8> {
        self.pin_attempts_left
    }

    /// Whether signal monitoring is active
    pub fn is_monitoring(&self) -> bool {
        self.nas.is_some()
    }

    /// Timing configuration this session runs with
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Snapshot for consumers
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.name.clone(),
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
            revision: self.revision.clone(),
            status: self.status,
            pin_attempts_left: self.pin_attempts_left,
        }
    }

    fn dms(&self) -> Result<ClientHandle, CoreError> {
        self.dms.ok_or(CoreError::SessionClosed)
    }

    /// Verify a SIM PIN and reload the lock status
    ///
    /// Only valid while PIN-locked. The status reload runs regardless of
    /// the verify outcome; the reloaded status is authoritative, and the
    /// unlock succeeds exactly when it comes back `Ready`.
    pub async fn unlock(&mut self, pin: &str) -> Result<(), CoreError> {
        if self.status != DeviceStatus::SimPinLocked {
            return Err(CoreError::NotPinLocked(self.status));
        }
        let dms = self.dms()?;
        let t = self.config.control_timeout;

        if let Err(e) = self.port.verify_pin(dms, pin, t).await {
            debug!(device = %self.name, "PIN verify failed: {e}");
        }

        let (status, attempts) = query_lock_status(self.port.as_ref(), dms, t).await?;
        self.status = status;
        self.pin_attempts_left = attempts;

        if self.status == DeviceStatus::Ready {
            Ok(())
        } else {
            Err(CoreError::UnlockRejected {
                status: self.status,
                attempts_left: attempts,
            })
        }
    }

    /// Allocate the network-access client for signal polling
    ///
    /// Usage error when monitoring is already active; the second caller
    /// gets the error and no second client is allocated.
    pub async fn start_monitoring(&mut self) -> Result<(), CoreError> {
        if self.nas.is_some() {
            return Err(CoreError::MonitoringActive);
        }
        let nas = self
            .port
            .allocate_client(ServiceKind::NetworkAccess, self.config.control_timeout)
            .await
            .map_err(|e| CoreError::step("allocate network-access client", e))?;
        debug!(device = %self.name, "network-access client allocated");
        self.nas = Some(nas);
        Ok(())
    }

    /// Release the network-access client
    ///
    /// Usage error when monitoring is not active. The release itself is
    /// best-effort.
    pub async fn stop_monitoring(&mut self) -> Result<(), CoreError> {
        let Some(nas) = self.nas.take() else {
            return Err(CoreError::MonitoringInactive);
        };
        if let Err(e) = self
            .port
            .release_client(nas, self.config.control_timeout)
            .await
        {
            warn!(device = %self.name, "releasing network-access client failed: {e}");
        }
        Ok(())
    }

    /// One signal-info poll
    pub async fn poll_signal(&self) -> Result<SignalInfo, CoreError> {
        let Some(nas) = self.nas else {
            return Err(CoreError::MonitoringInactive);
        };
        self.port
            .get_signal_info(nas, self.config.signal_timeout)
            .await
            .map_err(|e| CoreError::step("get signal info", e))
    }

    /// Close the session: stop monitoring, release clients, close the port
    ///
    /// Everything is best-effort; errors are logged, never escalated, and
    /// repeated calls are tolerated.
    pub async fn close(&mut self) {
        let t = self.config.control_timeout;
        if let Some(nas) = self.nas.take() {
            if let Err(e) = self.port.release_client(nas, t).await {
                debug!(device = %self.name, "releasing network-access client on close failed: {e}");
            }
        }
        if let Some(dms) = self.dms.take() {
            if let Err(e) = self.port.release_client(dms, t).await {
                debug!(device = %self.name, "releasing device-management client on close failed: {e}");
            }
        }
        if let Err(e) = self.port.close().await {
            warn!(device = %self.name, "closing control channel failed: {e}");
        }
    }
}
