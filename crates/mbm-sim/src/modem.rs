//! Scripted modem simulation
//!
//! A [`SimModem`] plays the role of one modem control channel. Its script
//! fixes the identity strings, the SIM state, and the signal frames the
//! device will report; failure injection and artificial latency cover the
//! unhappy paths the session pipeline has to handle.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mbm_proto::{
    ClientHandle, ModemPort, PinState, PinStatusReport, ProtoError, ServiceKind, SignalInfo,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Pipeline step a scripted failure is injected at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailPoint {
    /// Fail the channel open
    Open,
    /// Fail device-management client allocation
    AllocateDms,
    /// Fail the manufacturer query
    Manufacturer,
    /// Fail the model query
    Model,
    /// Fail the revision query
    Revision,
    /// Fail the PIN status query with a transport error
    PinStatus,
    /// Fail network-access client allocation
    AllocateNas,
    /// Fail every signal-info poll
    SignalInfo,
}

/// Everything a simulated modem will say when asked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemScript {
    /// Manufacturer string
    pub manufacturer: String,
    /// Model string
    pub model: String,
    /// Firmware revision string
    pub revision: String,
    /// The PIN that verifies successfully
    pub pin: String,
    /// Initial SIM PIN state
    pub pin_state: PinState,
    /// Verify attempts before the SIM blocks
    pub pin_retries: u8,
    /// Report the SIM as unreadable (internal error on status queries)
    pub sim_absent: bool,
    /// Incorrect-PIN answers to status queries before a real answer,
    /// mimicking firmware that is still settling after power-up
    pub status_transients: u32,
    /// Inject a failure at one pipeline step
    pub fail_at: Option<FailPoint>,
    /// Latency added to the channel open
    pub open_delay: Duration,
    /// Latency added to the channel close
    pub close_delay: Duration,
    /// Signal frames returned by successive polls, cycled
    pub frames: Vec<SignalInfo>,
}

impl Default for ModemScript {
    fn default() -> Self {
        Self {
            manufacturer: "Simulated Devices Inc.".to_string(),
            model: "SD-3000".to_string(),
            revision: "1.0.0-sim".to_string(),
            pin: "1234".to_string(),
            pin_state: PinState::Disabled,
            pin_retries: 3,
            sim_absent: false,
            status_transients: 0,
            fail_at: None,
            open_delay: Duration::ZERO,
            close_delay: Duration::ZERO,
            frames: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct ModemState {
    open: bool,
    close_count: u32,
    next_client: u32,
    clients: HashMap<u32, ServiceKind>,
    pin_state: PinState,
    retries: u8,
    transients_left: u32,
    frame_index: usize,
    poll_count: u32,
}

/// One simulated modem control channel
#[derive(Debug)]
pub struct SimModem {
    script: ModemScript,
    state: Mutex<ModemState>,
}

fn injected() -> ProtoError {
    ProtoError::Transport("injected failure".to_string())
}

impl SimModem {
    /// Create a modem from a script
    pub fn new(script: ModemScript) -> Self {
        let state = ModemState {
            open: false,
            close_count: 0,
            next_client: 1,
            clients: HashMap::new(),
            pin_state: script.pin_state,
            retries: script.pin_retries,
            transients_left: script.status_transients,
            frame_index: 0,
            poll_count: 0,
        };
        Self {
            script,
            state: Mutex::new(state),
        }
    }

    /// Create a modem with the default script
    pub fn ready() -> Self {
        Self::new(ModemScript::default())
    }

    /// Create a PIN-locked modem accepting `pin`
    pub fn pin_locked(pin: &str, retries: u8) -> Self {
        Self::new(ModemScript {
            pin: pin.to_string(),
            pin_state: PinState::EnabledNotVerified,
            pin_retries: retries,
            ..ModemScript::default()
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ModemState> {
        // Inner state never panics while locked; a poisoned mutex only
        // happens after a test already failed.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn fails_at(&self, point: FailPoint) -> bool {
        self.script.fail_at == Some(point)
    }

    fn check_client(
        state: &ModemState,
        client: ClientHandle,
        service: ServiceKind,
    ) -> Result<(), ProtoError> {
        match state.clients.get(&client.as_u32()) {
            Some(kind) if *kind == service => Ok(()),
            Some(_) => Err(ProtoError::Malformed(format!(
                "client {} bound to a different service",
                client.as_u32()
            ))),
            None => Err(ProtoError::Malformed(format!(
                "unknown client {}",
                client.as_u32()
            ))),
        }
    }

    /// Whether the channel is currently open
    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// How many times the channel has been closed
    pub fn close_count(&self) -> u32 {
        self.lock().close_count
    }

    /// Clients allocated and not yet released
    pub fn outstanding_clients(&self) -> usize {
        self.lock().clients.len()
    }

    /// Signal polls answered so far
    pub fn poll_count(&self) -> u32 {
        self.lock().poll_count
    }

    /// Current scripted SIM state
    pub fn pin_state(&self) -> PinState {
        self.lock().pin_state
    }
}

#[async_trait]
impl ModemPort for SimModem {
    async fn open(&self, _timeout: Duration) -> Result<(), ProtoError> {
        if !self.script.open_delay.is_zero() {
            tokio::time::sleep(self.script.open_delay).await;
        }
        if self.fails_at(FailPoint::Open) {
            return Err(injected());
        }
        let mut state = self.lock();
        state.open = true;
        debug!(model = %self.script.model, "simulated channel opened");
        Ok(())
    }

    async fn allocate_client(
        &self,
        service: ServiceKind,
        _timeout: Duration,
    ) -> Result<ClientHandle, ProtoError> {
        let point = match service {
            ServiceKind::DeviceManagement => FailPoint::AllocateDms,
            ServiceKind::NetworkAccess => FailPoint::AllocateNas,
        };
        if self.fails_at(point) {
            return Err(injected());
        }
        let mut state = self.lock();
        if !state.open {
            return Err(ProtoError::Transport("channel not open".to_string()));
        }
        let id = state.next_client;
        state.next_client += 1;
        state.clients.insert(id, service);
        Ok(ClientHandle(id))
    }

    async fn release_client(
        &self,
        client: ClientHandle,
        _timeout: Duration,
    ) -> Result<(), ProtoError> {
        let mut state = self.lock();
        if state.clients.remove(&client.as_u32()).is_none() {
            return Err(ProtoError::Malformed(format!(
                "unknown client {}",
                client.as_u32()
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ProtoError> {
        if !self.script.close_delay.is_zero() {
            tokio::time::sleep(self.script.close_delay).await;
        }
        let mut state = self.lock();
        state.open = false;
        state.close_count += 1;
        debug!(model = %self.script.model, "simulated channel closed");
        Ok(())
    }

    async fn get_manufacturer(
        &self,
        client: ClientHandle,
        _timeout: Duration,
    ) -> Result<String, ProtoError> {
        if self.fails_at(FailPoint::Manufacturer) {
            return Err(injected());
        }
        Self::check_client(&self.lock(), client, ServiceKind::DeviceManagement)?;
        Ok(self.script.manufacturer.clone())
    }

    async fn get_model(
        &self,
        client: ClientHandle,
        _timeout: Duration,
    ) -> Result<String, ProtoError> {
        if self.fails_at(FailPoint::Model) {
            return Err(injected());
        }
        Self::check_client(&self.lock(), client, ServiceKind::DeviceManagement)?;
        Ok(self.script.model.clone())
    }

    async fn get_revision(
        &self,
        client: ClientHandle,
        _timeout: Duration,
    ) -> Result<String, ProtoError> {
        if self.fails_at(FailPoint::Revision) {
            return Err(injected());
        }
        Self::check_client(&self.lock(), client, ServiceKind::DeviceManagement)?;
        Ok(self.script.revision.clone())
    }

    async fn get_pin_status(
        &self,
        client: ClientHandle,
        _timeout: Duration,
    ) -> Result<PinStatusReport, ProtoError> {
        if self.fails_at(FailPoint::PinStatus) {
            return Err(injected());
        }
        let mut state = self.lock();
        Self::check_client(&state, client, ServiceKind::DeviceManagement)?;
        if state.transients_left > 0 {
            state.transients_left -= 1;
            return Err(ProtoError::IncorrectPin);
        }
        if self.script.sim_absent {
            return Err(ProtoError::Internal("couldn't read SIM status".to_string()));
        }
        let report = match state.pin_state {
            PinState::NotInitialized | PinState::EnabledNotVerified => {
                PinStatusReport::with_retries(state.pin_state, state.retries)
            }
            other => PinStatusReport::new(other),
        };
        Ok(report)
    }

    async fn verify_pin(
        &self,
        client: ClientHandle,
        pin: &str,
        _timeout: Duration,
    ) -> Result<(), ProtoError> {
        let mut state = self.lock();
        Self::check_client(&state, client, ServiceKind::DeviceManagement)?;
        if pin == self.script.pin {
            state.pin_state = PinState::EnabledVerified;
            return Ok(());
        }
        state.retries = state.retries.saturating_sub(1);
        if state.retries == 0 {
            state.pin_state = PinState::Blocked;
        }
        Err(ProtoError::IncorrectPin)
    }

    async fn get_signal_info(
        &self,
        client: ClientHandle,
        _timeout: Duration,
    ) -> Result<SignalInfo, ProtoError> {
        if self.fails_at(FailPoint::SignalInfo) {
            return Err(injected());
        }
        let mut state = self.lock();
        Self::check_client(&state, client, ServiceKind::NetworkAccess)?;
        state.poll_count += 1;
        if self.script.frames.is_empty() {
            return Ok(SignalInfo::default());
        }
        let frame = self.script.frames[state.frame_index % self.script.frames.len()];
        state.frame_index += 1;
        Ok(frame)
    }
}
