//! Spawned task wrapping one device session
//!
//! Each live device runs in its own task, keeping the manager loop free of
//! per-device protocol waits. The task owns the [`DeviceSession`], serves
//! commands from the manager, drives the signal poll timer while monitoring
//! is active, and reports status changes and its own exit back through the
//! manager's internal channel.

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::events::{DeviceInfo, MonitorEvent};
use crate::manager::Internal;
use crate::session::DeviceSession;
use crate::signal::{EcioSample, PowerSample, QualitySample, SinrSample, StrengthSample};

/// Commands the manager sends to a session task
#[derive(Debug)]
pub(crate) enum SessionCommand {
    /// Verify a SIM PIN and reload the lock status
    Unlock {
        pin: String,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    /// Begin 1 Hz signal polling
    StartMonitoring {
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    /// Stop signal polling
    StopMonitoring {
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    /// Snapshot the device state
    Info {
        reply: oneshot::Sender<DeviceInfo>,
    },
    /// Close the session and end the task
    Close,
}

/// Wait for the next poll tick, or forever when monitoring is off
async fn next_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Run one poll cycle and emit the per-family sample events
///
/// A failed poll is logged and skipped; the next tick tries again.
async fn poll_once(session: &DeviceSession, event_tx: &mpsc::UnboundedSender<MonitorEvent>) {
    let info = match session.poll_signal().await {
        Ok(info) => info,
        Err(e) => {
            warn!(device = %session.name(), "signal poll failed: {e}");
            return;
        }
    };
    let name = session.name().to_string();
    let _ = event_tx.send(MonitorEvent::StrengthUpdated {
        name: name.clone(),
        sample: StrengthSample::from(&info),
    });
    let _ = event_tx.send(MonitorEvent::EcioUpdated {
        name: name.clone(),
        sample: EcioSample::from(&info),
    });
    let _ = event_tx.send(MonitorEvent::SinrUpdated {
        name: name.clone(),
        sample: SinrSample::from(&info),
    });
    let _ = event_tx.send(MonitorEvent::PowerUpdated {
        name: name.clone(),
        sample: PowerSample::from(&info),
    });
    let _ = event_tx.send(MonitorEvent::QualityUpdated {
        name,
        sample: QualitySample::from(&info),
    });
}

/// Main loop of a session task
///
/// Runs until a `Close` command arrives or the manager drops the command
/// channel, then closes the session and reports the exit.
pub(crate) async fn run_session_task(
    mut session: DeviceSession,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    note_tx: mpsc::UnboundedSender<Internal>,
    event_tx: mpsc::UnboundedSender<MonitorEvent>,
) {
    info!(device = %session.name(), "session task started");
    let mut poll: Option<Interval> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::Unlock { pin, reply }) => {
                        let result = session.unlock(&pin).await;
                        // The manager keeps its own snapshot current from
                        // these notes; both outcomes can move the status.
                        let _ = note_tx.send(Internal::StatusChanged {
                            name: session.name().to_string(),
                            status: session.status(),
                            attempts_left: session.pin_attempts_left(),
                        });
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::StartMonitoring { reply }) => {
                        let result = session.start_monitoring().await;
                        if result.is_ok() {
                            let mut timer = interval(session.config().poll_interval);
                            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
                            poll = Some(timer);
                        }
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::StopMonitoring { reply }) => {
                        let result = session.stop_monitoring().await;
                        if result.is_ok() {
                            poll = None;
                        }
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::Info { reply }) => {
                        let _ = reply.send(session.info());
                    }
                    Some(SessionCommand::Close) | None => {
                        debug!(device = %session.name(), "session task closing");
                        break;
                    }
                }
            }

            _ = next_tick(&mut poll) => {
                poll_once(&session, &event_tx).await;
            }
        }
    }

    session.close().await;
    info!(device = %session.name(), "session task ended");
    let _ = note_tx.send(Internal::SessionClosed {
        name: session.name().to_string(),
    });
}
