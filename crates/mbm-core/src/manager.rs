//! Device Manager Actor
//!
//! The manager owns every device session and runs as a single spawned task.
//! It consumes hotplug notifications, filters them down to modem control
//! nodes, runs the initialization pipeline for each candidate in its own
//! task, and serves consumer commands through a channel. Consumers never
//! touch a session directly; they hold a [`DeviceManager`] handle and
//! receive [`MonitorEvent`]s through a unified stream.
//!
//! # Example
//!
//! ```rust,ignore
//! use mbm_core::{DeviceManager, MonitorConfig};
//!
//! let (manager, mut events) = DeviceManager::spawn(MonitorConfig::default(), provider, hotplug);
//!
//! while let Some(event) = events.recv().await {
//!     // react to arrivals, status changes, signal samples
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mbm_detect::{is_candidate, HotplugAction, HotplugEvent, HotplugSource, MODEM_SUBSYSTEMS};
use mbm_proto::PortProvider;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::CoreError;
use crate::events::{DeviceInfo, MonitorEvent};
use crate::pending::{CancelToken, PendingRegistry};
use crate::session::DeviceSession;
use crate::status::DeviceStatus;
use crate::task::{run_session_task, SessionCommand};

/// Commands sent to the manager actor
#[derive(Debug)]
enum ManagerCommand {
    /// Snapshot every live device
    ListDevices {
        reply: oneshot::Sender<Vec<DeviceInfo>>,
    },
    /// Snapshot one device by name
    GetDevice {
        name: String,
        reply: oneshot::Sender<Option<DeviceInfo>>,
    },
    /// Whether the startup scan has finished
    IsScanDone { reply: oneshot::Sender<bool> },
    /// Verify a SIM PIN on a device
    Unlock {
        name: String,
        pin: String,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    /// Begin signal polling on a device
    StartMonitoring {
        name: String,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    /// Stop signal polling on a device
    StopMonitoring {
        name: String,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    /// Close every session and stop the manager
    Shutdown { reply: oneshot::Sender<()> },
}

/// Notes flowing back to the manager from its spawned tasks
#[derive(Debug)]
pub(crate) enum Internal {
    /// An initialization pipeline finished
    Constructed {
        name: String,
        result: Result<DeviceSession, CoreError>,
    },
    /// A session's SIM/lock status may have moved
    StatusChanged {
        name: String,
        status: DeviceStatus,
        attempts_left: Option<u8>,
    },
    /// A session task closed its session and exited
    SessionClosed { name: String },
}

/// A live device as the manager tracks it
struct LiveDevice {
    info: DeviceInfo,
    cmd_tx: mpsc::Sender<SessionCommand>,
}

/// Handle to a running device manager
///
/// Cheap to clone; every clone talks to the same actor. Dropping all
/// handles shuts the manager down as if [`DeviceManager::shutdown`] had
/// been called.
#[derive(Debug, Clone)]
pub struct DeviceManager {
    cmd_tx: mpsc::Sender<ManagerCommand>,
}

impl DeviceManager {
    /// Spawn the manager actor
    ///
    /// Subscribes to hotplug notifications, enumerates the modem
    /// subsystems, and starts constructing every candidate already present.
    /// Returns the command handle and the unified event stream.
    pub fn spawn(
        config: MonitorConfig,
        provider: Arc<dyn PortProvider>,
        hotplug: Box<dyn HotplugSource>,
    ) -> (DeviceManager, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let state = ManagerState {
            config,
            provider,
            pending: PendingRegistry::new(),
            live: HashMap::new(),
            closing: HashSet::new(),
            scan_announced: false,
            internal_tx,
            event_tx,
        };
        tokio::spawn(run_device_manager(state, cmd_rx, internal_rx, hotplug));

        (DeviceManager { cmd_tx }, event_rx)
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> ManagerCommand,
    ) -> Result<R, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| CoreError::ManagerStopped)?;
        reply_rx.await.map_err(|_| CoreError::ManagerStopped)
    }

    /// Snapshot every live device, sorted by name
    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>, CoreError> {
        self.request(|reply| ManagerCommand::ListDevices { reply })
            .await
    }

    /// Snapshot one live device
    pub async fn device(&self, name: &str) -> Result<Option<DeviceInfo>, CoreError> {
        let name = name.to_string();
        self.request(|reply| ManagerCommand::GetDevice { name, reply })
            .await
    }

    /// Whether the startup scan and its constructions have finished
    pub async fn initial_scan_done(&self) -> Result<bool, CoreError> {
        self.request(|reply| ManagerCommand::IsScanDone { reply })
            .await
    }

    /// Verify a SIM PIN on a PIN-locked device
    pub async fn unlock(&self, name: &str, pin: &str) -> Result<(), CoreError> {
        let name = name.to_string();
        let pin = pin.to_string();
        self.request(|reply| ManagerCommand::Unlock { name, pin, reply })
            .await?
    }

    /// Begin 1 Hz signal polling on a device
    pub async fn start_monitoring(&self, name: &str) -> Result<(), CoreError> {
        let name = name.to_string();
        self.request(|reply| ManagerCommand::StartMonitoring { name, reply })
            .await?
    }

    /// Stop signal polling on a device
    pub async fn stop_monitoring(&self, name: &str) -> Result<(), CoreError> {
        let name = name.to_string();
        self.request(|reply| ManagerCommand::StopMonitoring { name, reply })
            .await?
    }

    /// Close every session and stop the manager
    ///
    /// Cancels in-flight constructions, closes live sessions, and returns
    /// once everything has acknowledged or the configured shutdown timeout
    /// elapses.
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        self.request(|reply| ManagerCommand::Shutdown { reply })
            .await
    }
}

struct ManagerState {
    config: MonitorConfig,
    provider: Arc<dyn PortProvider>,
    pending: PendingRegistry,
    live: HashMap<String, LiveDevice>,
    closing: HashSet<String>,
    scan_announced: bool,
    internal_tx: mpsc::UnboundedSender<Internal>,
    event_tx: mpsc::UnboundedSender<MonitorEvent>,
}

/// Reply with a not-found error through whatever reply slot the command
/// carries
fn reject_unsent(cmd: SessionCommand, name: String) {
    match cmd {
        SessionCommand::Unlock { reply, .. }
        | SessionCommand::StartMonitoring { reply }
        | SessionCommand::StopMonitoring { reply } => {
            let _ = reply.send(Err(CoreError::DeviceNotFound(name)));
        }
        SessionCommand::Info { .. } | SessionCommand::Close => {}
    }
}

impl ManagerState {
    fn emit(&self, event: MonitorEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Start the initialization pipeline for one candidate node
    ///
    /// Duplicate arrivals (a name already live or already pending) are
    /// ignored.
    fn begin_construction(&mut self, name: String) {
        if self.live.contains_key(&name) || self.pending.contains(&name) {
            debug!(device = %name, "duplicate arrival ignored");
            return;
        }
        info!(device = %name, "candidate detected, starting initialization");

        let token = CancelToken::new();
        self.pending.add(name.clone(), token.clone());
        self.emit(MonitorEvent::DetectionActivity { active: true });

        let port = self.provider.open_port(&name);
        let config = self.config.clone();
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = DeviceSession::initialize(name.clone(), port, config, token).await;
            let _ = internal_tx.send(Internal::Constructed { name, result });
        });
    }

    fn handle_hotplug(&mut self, event: HotplugEvent) {
        let name = event.node.name.clone();
        match event.action {
            a if a.is_arrival() => {
                if is_candidate(&event.node) {
                    self.begin_construction(name);
                }
            }
            HotplugAction::Remove => {
                if self.live.contains_key(&name) {
                    self.remove_live(&name);
                } else if self.pending.contains(&name) {
                    info!(device = %name, "candidate removed during initialization");
                    self.pending.cancel(&name);
                }
            }
            _ => {}
        }
    }

    /// Drop a device from the live set and close its session
    ///
    /// The removal is published immediately; the close runs in the session
    /// task and is not waited for.
    fn remove_live(&mut self, name: &str) {
        let Some(device) = self.live.remove(name) else {
            return;
        };
        info!(device = %name, "device removed");
        self.emit(MonitorEvent::DeviceRemoved {
            name: name.to_string(),
        });
        tokio::spawn(async move {
            let _ = device.cmd_tx.send(SessionCommand::Close).await;
        });
    }

    /// Promote a constructed session to the live set
    fn add_live(&mut self, session: DeviceSession) {
        let info = session.info();
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        tokio::spawn(run_session_task(
            session,
            cmd_rx,
            self.internal_tx.clone(),
            self.event_tx.clone(),
        ));
        info!(device = %info.name, model = %info.model, status = ?info.status, "device ready");
        self.live.insert(
            info.name.clone(),
            LiveDevice {
                info: info.clone(),
                cmd_tx,
            },
        );
        self.emit(MonitorEvent::DeviceAdded { device: info });
    }

    /// Record that a pending construction is gone and publish the drain
    fn pending_settled(&mut self, name: &str) {
        if self.pending.remove(name) {
            self.emit(MonitorEvent::DetectionActivity { active: false });
            if !self.scan_announced {
                self.scan_announced = true;
                self.emit(MonitorEvent::InitialScanDone);
            }
        }
    }

    fn handle_internal(&mut self, note: Internal) {
        match note {
            Internal::Constructed { name, result } => {
                let cancelled = self.pending.is_cancelled(&name);
                match result {
                    Ok(session) if cancelled => {
                        debug!(device = %name, "construction finished after cancellation, discarding");
                        close_detached(session);
                    }
                    Ok(session) => self.add_live(session),
                    Err(CoreError::Cancelled) => {
                        debug!(device = %name, "initialization cancelled");
                    }
                    Err(e) => warn!(device = %name, "initialization failed: {e}"),
                }
                self.pending_settled(&name);
            }
            Internal::StatusChanged {
                name,
                status,
                attempts_left,
            } => {
                let Some(device) = self.live.get_mut(&name) else {
                    return;
                };
                if device.info.status != status || device.info.pin_attempts_left != attempts_left {
                    device.info.status = status;
                    device.info.pin_attempts_left = attempts_left;
                    self.emit(MonitorEvent::StatusChanged {
                        name,
                        status,
                        attempts_left,
                    });
                }
            }
            Internal::SessionClosed { name } => {
                debug!(device = %name, "session closed");
                self.closing.remove(&name);
            }
        }
    }

    fn handle_command(&mut self, cmd: ManagerCommand) {
        match cmd {
            ManagerCommand::ListDevices { reply } => {
                let mut devices: Vec<DeviceInfo> =
                    self.live.values().map(|d| d.info.clone()).collect();
                devices.sort_by(|a, b| a.name.cmp(&b.name));
                let _ = reply.send(devices);
            }
            ManagerCommand::GetDevice { name, reply } => {
                let _ = reply.send(self.live.get(&name).map(|d| d.info.clone()));
            }
            ManagerCommand::IsScanDone { reply } => {
                let _ = reply.send(self.scan_announced);
            }
            ManagerCommand::Unlock { name, pin, reply } => {
                self.forward(name, |reply| SessionCommand::Unlock { pin, reply }, reply);
            }
            ManagerCommand::StartMonitoring { name, reply } => {
                self.forward(name, |reply| SessionCommand::StartMonitoring { reply }, reply);
            }
            ManagerCommand::StopMonitoring { name, reply } => {
                self.forward(name, |reply| SessionCommand::StopMonitoring { reply }, reply);
            }
            // Shutdown is intercepted by the main loop
            ManagerCommand::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    /// Hand a command to a session task without blocking the manager loop
    ///
    /// The caller's reply slot rides inside the session command; a missing
    /// or already-exited session answers not-found.
    fn forward(
        &self,
        name: String,
        make: impl FnOnce(oneshot::Sender<Result<(), CoreError>>) -> SessionCommand,
        reply: oneshot::Sender<Result<(), CoreError>>,
    ) {
        let cmd = make(reply);
        match self.live.get(&name) {
            Some(device) => {
                let tx = device.cmd_tx.clone();
                tokio::spawn(async move {
                    if let Err(unsent) = tx.send(cmd).await {
                        reject_unsent(unsent.0, name);
                    }
                });
            }
            None => reject_unsent(cmd, name),
        }
    }

    /// Barrier-synchronized shutdown
    ///
    /// Cancels every in-flight construction, closes every live session, and
    /// drains acknowledgements until both sets are empty or the configured
    /// timeout elapses. Sessions that finish constructing mid-shutdown are
    /// closed, never published.
    async fn run_shutdown(&mut self, internal_rx: &mut mpsc::UnboundedReceiver<Internal>) {
        info!(
            live = self.live.len(),
            pending = self.pending.len(),
            "shutting down"
        );
        self.pending.cancel_all();
        self.closing = self.live.keys().cloned().collect();
        for (_, device) in self.live.drain() {
            tokio::spawn(async move {
                let _ = device.cmd_tx.send(SessionCommand::Close).await;
            });
        }

        let deadline = self.config.shutdown_timeout.map(|t| Instant::now() + t);
        while !(self.pending.is_empty() && self.closing.is_empty()) {
            let note = match deadline {
                Some(deadline) => match timeout_at(deadline, internal_rx.recv()).await {
                    Ok(note) => note,
                    Err(_) => {
                        warn!(
                            pending = self.pending.len(),
                            closing = self.closing.len(),
                            "shutdown timed out waiting for sessions"
                        );
                        break;
                    }
                },
                None => internal_rx.recv().await,
            };
            match note {
                Some(Internal::Constructed { name, result }) => {
                    self.pending.remove(&name);
                    if let Ok(session) = result {
                        debug!(device = %name, "closing session constructed during shutdown");
                        close_detached(session);
                    }
                }
                Some(Internal::SessionClosed { name }) => {
                    self.closing.remove(&name);
                }
                Some(Internal::StatusChanged { .. }) => {}
                None => break,
            }
        }
        info!("shutdown complete");
    }
}

/// Close a session nobody will own, off the manager loop
fn close_detached(mut session: DeviceSession) {
    tokio::spawn(async move {
        session.close().await;
    });
}

/// Main loop of the device manager actor
async fn run_device_manager(
    mut state: ManagerState,
    mut cmd_rx: mpsc::Receiver<ManagerCommand>,
    mut internal_rx: mpsc::UnboundedReceiver<Internal>,
    mut hotplug: Box<dyn HotplugSource>,
) {
    // Subscribe before enumerating so an arrival racing the scan is never
    // lost; the duplicate-arrival check absorbs the overlap.
    let mut hotplug_rx = hotplug.subscribe(MODEM_SUBSYSTEMS);

    for subsystem in MODEM_SUBSYSTEMS {
        match hotplug.enumerate(subsystem) {
            Ok(nodes) => {
                for node in nodes {
                    if is_candidate(&node) {
                        state.begin_construction(node.name);
                    }
                }
            }
            Err(e) => warn!(%subsystem, "enumeration failed: {e}"),
        }
    }
    if state.pending.is_empty() {
        state.scan_announced = true;
        state.emit(MonitorEvent::InitialScanDone);
    }

    let mut hotplug_closed = false;
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ManagerCommand::Shutdown { reply }) => {
                        state.run_shutdown(&mut internal_rx).await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => state.handle_command(cmd),
                    None => {
                        state.run_shutdown(&mut internal_rx).await;
                        break;
                    }
                }
            }

            event = hotplug_rx.recv(), if !hotplug_closed => {
                match event {
                    Some(event) => state.handle_hotplug(event),
                    None => {
                        debug!("hotplug source disconnected");
                        hotplug_closed = true;
                    }
                }
            }

            Some(note) = internal_rx.recv() => {
                state.handle_internal(note);
            }
        }
    }
}
