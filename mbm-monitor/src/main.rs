//! Mobile-Broadband Modem Monitor
//!
//! Headless demo driver for the session-lifecycle core. Runs the device
//! manager against a simulated bench: one modem present at startup, a
//! PIN-locked one plugged in a few seconds later. Devices are unlocked and
//! put under signal monitoring as they appear, and every event is logged
//! until Ctrl-C triggers the barrier-synchronized shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mbm_core::{DeviceManager, DeviceStatus, MonitorConfig, MonitorEvent};
use mbm_proto::{LteSignal, SignalInfo, WcdmaSignal};
use mbm_sim::{modem_node, ModemScript, SimHotplug, SimModem, SimRig};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn lte_frames() -> Vec<SignalInfo> {
    [-69, -72, -75, -71, -68]
        .into_iter()
        .map(|rssi| SignalInfo {
            lte: Some(LteSignal { rssi, rsrq: -9 }),
            ..Default::default()
        })
        .collect()
}

fn umts_frames() -> Vec<SignalInfo> {
    [-81, -84, -80]
        .into_iter()
        .map(|rssi| SignalInfo {
            wcdma: Some(WcdmaSignal { rssi, ecio: 12 }),
            ..Default::default()
        })
        .collect()
}

fn build_rig() -> SimRig {
    let rig = SimRig::new();
    rig.insert(
        "cdc-wdm0",
        Arc::new(SimModem::new(ModemScript {
            manufacturer: "Sierra Wireless".to_string(),
            model: "MC7710".to_string(),
            revision: "SWI9200X_03.05.14.00".to_string(),
            frames: lte_frames(),
            ..ModemScript::default()
        })),
    );
    rig.insert(
        "cdc-wdm1",
        Arc::new(SimModem::new(ModemScript {
            manufacturer: "Huawei".to_string(),
            model: "E392".to_string(),
            revision: "11.432.19.00.00".to_string(),
            pin: "1234".to_string(),
            pin_state: mbm_proto::PinState::EnabledNotVerified,
            frames: umts_frames(),
            ..ModemScript::default()
        })),
    );
    rig
}

/// React to a device joining the live set: unlock if needed, then start
/// signal monitoring
async fn bring_up(manager: &DeviceManager, name: &str, status: DeviceStatus) {
    if status == DeviceStatus::SimPinLocked {
        info!(device = %name, "device is PIN-locked, unlocking");
        if let Err(e) = manager.unlock(name, "1234").await {
            warn!(device = %name, "unlock failed: {e}");
            return;
        }
    }
    if let Err(e) = manager.start_monitoring(name).await {
        warn!(device = %name, "could not start monitoring: {e}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Include all our crates in the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mbm_monitor=info,mbm_proto=info,mbm_detect=info,mbm_core=info,mbm_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting modem monitor (simulated bench)");

    let rig = Arc::new(build_rig());
    let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
    let plug = hotplug.clone();

    let (manager, mut events) =
        DeviceManager::spawn(MonitorConfig::default(), rig, Box::new(hotplug));

    // Hotplug the second modem a few seconds in
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        plug.attach(modem_node("cdc-wdm1"));
    });

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    MonitorEvent::DeviceAdded { device } => {
                        info!(
                            name = %device.name,
                            manufacturer = %device.manufacturer,
                            model = %device.model,
                            status = ?device.status,
                            "device added"
                        );
                        bring_up(&manager, &device.name, device.status).await;
                    }
                    MonitorEvent::DeviceRemoved { name } => {
                        info!(%name, "device removed");
                    }
                    MonitorEvent::DetectionActivity { active } => {
                        info!(%active, "detection activity");
                    }
                    MonitorEvent::InitialScanDone => {
                        info!("initial scan done");
                    }
                    MonitorEvent::StatusChanged { name, status, attempts_left } => {
                        info!(%name, ?status, ?attempts_left, "status changed");
                    }
                    MonitorEvent::StrengthUpdated { name, sample } => {
                        info!(%name, ?sample, "signal strength");
                    }
                    // The remaining sample families are too chatty for the demo log
                    _ => {}
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                manager.shutdown().await?;
                break;
            }
        }
    }

    info!("monitor stopped");
    Ok(())
}
