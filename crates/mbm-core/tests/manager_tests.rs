//! Integration tests for the device manager
//!
//! These tests drive the whole lifecycle against the simulated bench:
//! - Startup enumeration and the initial-scan event
//! - Hotplug arrivals, duplicates, and removals
//! - Initialization failures, quirks, and cancellation
//! - PIN unlock outcomes
//! - Signal monitoring and its sample events
//! - Barrier-synchronized shutdown

use std::sync::Arc;
use std::time::Duration;

use mbm_core::{
    CoreError, DeviceManager, DeviceStatus, MonitorConfig, MonitorEvent, NO_READING,
};
use mbm_proto::{LteSignal, PinState, SignalInfo};
use mbm_sim::{modem_node, FailPoint, ModemScript, SimHotplug, SimModem, SimRig};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub const WAIT: Duration = Duration::from_secs(5);

    /// Short timings so polling tests run quickly
    pub fn test_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_millis(25),
            shutdown_timeout: Some(Duration::from_secs(5)),
            ..MonitorConfig::default()
        }
    }

    pub fn lte_frame(rssi: i8) -> SignalInfo {
        SignalInfo {
            lte: Some(LteSignal { rssi, rsrq: -11 }),
            ..Default::default()
        }
    }

    pub fn locked_script(pin: &str, retries: u8) -> ModemScript {
        ModemScript {
            pin: pin.to_string(),
            pin_state: PinState::EnabledNotVerified,
            pin_retries: retries,
            ..ModemScript::default()
        }
    }

    /// Receive the next event or fail the test
    pub async fn next_event(events: &mut UnboundedReceiver<MonitorEvent>) -> MonitorEvent {
        timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event stream closed")
    }

    /// Drain events until one matches, failing on timeout
    pub async fn wait_for(
        events: &mut UnboundedReceiver<MonitorEvent>,
        pred: impl Fn(&MonitorEvent) -> bool,
    ) -> MonitorEvent {
        loop {
            let event = next_event(events).await;
            if pred(&event) {
                return event;
            }
        }
    }

    /// Assert that no matching event shows up within `window`
    pub async fn assert_quiet(
        events: &mut UnboundedReceiver<MonitorEvent>,
        window: Duration,
        pred: impl Fn(&MonitorEvent) -> bool,
    ) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Some(event)) => {
                    assert!(!pred(&event), "unexpected event: {event:?}");
                }
                Ok(None) | Err(_) => return,
            }
        }
    }

    /// Poll an inspection hook until it holds, failing on timeout
    pub async fn eventually(what: &str, check: impl Fn() -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !check() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for: {what}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn is_added(event: &MonitorEvent) -> bool {
        matches!(event, MonitorEvent::DeviceAdded { .. })
    }
}

use helpers::*;

// ============================================================================
// Startup Enumeration
// ============================================================================

mod scan_tests {
    use super::*;

    #[tokio::test]
    async fn empty_bench_announces_scan_done_immediately() {
        let rig = Arc::new(SimRig::new());
        let hotplug = SimHotplug::new();
        let (_manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        let first = next_event(&mut events).await;
        assert!(matches!(first, MonitorEvent::InitialScanDone));
    }

    #[tokio::test]
    async fn present_candidate_is_constructed_before_scan_done() {
        let rig = Arc::new(SimRig::new());
        rig.insert("cdc-wdm0", Arc::new(SimModem::ready()));
        let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        assert!(matches!(
            next_event(&mut events).await,
            MonitorEvent::DetectionActivity { active: true }
        ));
        match next_event(&mut events).await {
            MonitorEvent::DeviceAdded { device } => {
                assert_eq!(device.name, "cdc-wdm0");
                assert_eq!(device.manufacturer, "Simulated Devices Inc.");
                assert_eq!(device.status, DeviceStatus::Ready);
            }
            other => panic!("expected DeviceAdded, got {other:?}"),
        }
        assert!(matches!(
            next_event(&mut events).await,
            MonitorEvent::DetectionActivity { active: false }
        ));
        assert!(matches!(
            next_event(&mut events).await,
            MonitorEvent::InitialScanDone
        ));

        let devices = manager.list_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
    }

    #[tokio::test]
    async fn non_candidate_nodes_are_ignored() {
        let rig = Arc::new(SimRig::new());
        let hotplug = SimHotplug::with_nodes(vec![
            mbm_detect::NodeDescriptor::new("usbmisc", "cdc-wdm0", "cdc_mbim"),
            mbm_detect::NodeDescriptor::new("block", "sda1", "qmi_wwan"),
            mbm_detect::NodeDescriptor::new("usbmisc", "hiddev0", "qmi_wwan"),
        ]);
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        assert!(matches!(
            next_event(&mut events).await,
            MonitorEvent::InitialScanDone
        ));
        assert!(manager.list_devices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scan_done_flag_tracks_the_announcement() {
        let rig = Arc::new(SimRig::new());
        rig.insert(
            "cdc-wdm0",
            Arc::new(SimModem::new(ModemScript {
                open_delay: Duration::from_millis(100),
                ..ModemScript::default()
            })),
        );
        let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        assert!(!manager.initial_scan_done().await.unwrap());
        wait_for(&mut events, |e| matches!(e, MonitorEvent::InitialScanDone)).await;
        assert!(manager.initial_scan_done().await.unwrap());
    }

    #[tokio::test]
    async fn enumeration_failure_still_announces_scan_done() {
        let rig = Arc::new(SimRig::new());
        let hotplug = SimHotplug::new();
        hotplug.fail_enumeration();
        let (_manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        assert!(matches!(
            next_event(&mut events).await,
            MonitorEvent::InitialScanDone
        ));
    }
}

// ============================================================================
// Hotplug Arrivals and Removals
// ============================================================================

mod hotplug_tests {
    use super::*;

    #[tokio::test]
    async fn arrival_after_startup_adds_a_device() {
        let rig = Arc::new(SimRig::new());
        rig.insert("cdc-wdm3", Arc::new(SimModem::ready()));
        let hotplug = SimHotplug::new();
        let plug = hotplug.clone();
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        wait_for(&mut events, |e| matches!(e, MonitorEvent::InitialScanDone)).await;

        plug.attach(modem_node("cdc-wdm3"));
        let added = wait_for(&mut events, is_added).await;
        let MonitorEvent::DeviceAdded { device } = added else {
            unreachable!()
        };
        assert_eq!(device.name, "cdc-wdm3");
        assert_eq!(manager.device("cdc-wdm3").await.unwrap().unwrap().name, "cdc-wdm3");
    }

    #[tokio::test]
    async fn duplicate_arrival_is_ignored() {
        let rig = Arc::new(SimRig::new());
        rig.insert("cdc-wdm0", Arc::new(SimModem::ready()));
        let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
        let plug = hotplug.clone();
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        wait_for(&mut events, is_added).await;

        plug.reannounce("cdc-wdm0");
        assert_quiet(&mut events, Duration::from_millis(200), is_added).await;
        assert_eq!(manager.list_devices().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn removal_of_live_device_publishes_and_closes() {
        let rig = Arc::new(SimRig::new());
        let modem = Arc::new(SimModem::ready());
        rig.insert("cdc-wdm0", modem.clone());
        let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
        let plug = hotplug.clone();
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        wait_for(&mut events, is_added).await;

        plug.detach("cdc-wdm0");
        let removed =
            wait_for(&mut events, |e| matches!(e, MonitorEvent::DeviceRemoved { .. })).await;
        let MonitorEvent::DeviceRemoved { name } = removed else {
            unreachable!()
        };
        assert_eq!(name, "cdc-wdm0");
        assert!(manager.list_devices().await.unwrap().is_empty());
        eventually("session close", || modem.close_count() == 1).await;
        assert_eq!(modem.outstanding_clients(), 0);
    }

    #[tokio::test]
    async fn removal_during_initialization_cancels_the_construction() {
        let rig = Arc::new(SimRig::new());
        let modem = Arc::new(SimModem::new(ModemScript {
            open_delay: Duration::from_millis(200),
            ..ModemScript::default()
        }));
        rig.insert("cdc-wdm0", modem.clone());
        let hotplug = SimHotplug::new();
        let plug = hotplug.clone();
        let (_manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        wait_for(&mut events, |e| matches!(e, MonitorEvent::InitialScanDone)).await;

        plug.attach(modem_node("cdc-wdm0"));
        wait_for(&mut events, |e| {
            matches!(e, MonitorEvent::DetectionActivity { active: true })
        })
        .await;
        plug.detach("cdc-wdm0");

        // The in-flight construction drains without producing a device or a
        // removal event, and whatever it opened gets closed again.
        wait_for(&mut events, |e| {
            matches!(e, MonitorEvent::DetectionActivity { active: false })
        })
        .await;
        assert_quiet(&mut events, Duration::from_millis(300), |e| {
            is_added(e) || matches!(e, MonitorEvent::DeviceRemoved { .. })
        })
        .await;
        eventually("cancelled construction closed", || modem.close_count() >= 1).await;
    }
}

// ============================================================================
// Initialization Failures and Quirks
// ============================================================================

mod pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn failed_identity_query_discards_the_device() {
        let rig = Arc::new(SimRig::new());
        let modem = Arc::new(SimModem::new(ModemScript {
            fail_at: Some(FailPoint::Manufacturer),
            ..ModemScript::default()
        }));
        rig.insert("cdc-wdm0", modem.clone());
        let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        wait_for(&mut events, |e| matches!(e, MonitorEvent::InitialScanDone)).await;
        assert!(manager.list_devices().await.unwrap().is_empty());
        eventually("partial session torn down", || {
            modem.close_count() == 1 && modem.outstanding_clients() == 0
        })
        .await;
    }

    #[tokio::test]
    async fn unreadable_sim_status_maps_to_sim_error() {
        let rig = Arc::new(SimRig::new());
        rig.insert_script(
            "cdc-wdm0",
            ModemScript {
                sim_absent: true,
                ..ModemScript::default()
            },
        );
        let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
        let (_manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        let added = wait_for(&mut events, is_added).await;
        let MonitorEvent::DeviceAdded { device } = added else {
            unreachable!()
        };
        assert_eq!(device.status, DeviceStatus::SimError);
        assert_eq!(device.pin_attempts_left, None);
    }

    #[tokio::test]
    async fn status_query_transients_are_retried_until_settled() {
        let rig = Arc::new(SimRig::new());
        rig.insert_script(
            "cdc-wdm0",
            ModemScript {
                status_transients: 3,
                ..ModemScript::default()
            },
        );
        let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
        let (_manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        let added = wait_for(&mut events, is_added).await;
        let MonitorEvent::DeviceAdded { device } = added else {
            unreachable!()
        };
        assert_eq!(device.status, DeviceStatus::Ready);
    }
}

// ============================================================================
// PIN Unlock
// ============================================================================

mod unlock_tests {
    use super::*;

    async fn locked_setup() -> (DeviceManager, UnboundedReceiver<MonitorEvent>) {
        let rig = Arc::new(SimRig::new());
        rig.insert_script("cdc-wdm0", locked_script("1234", 3));
        let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        let added = wait_for(&mut events, is_added).await;
        let MonitorEvent::DeviceAdded { device } = added else {
            unreachable!()
        };
        assert_eq!(device.status, DeviceStatus::SimPinLocked);
        assert_eq!(device.pin_attempts_left, Some(3));
        (manager, events)
    }

    #[tokio::test]
    async fn correct_pin_unlocks_and_publishes_ready() {
        let (manager, mut events) = locked_setup().await;

        manager.unlock("cdc-wdm0", "1234").await.unwrap();

        let changed = wait_for(&mut events, |e| {
            matches!(e, MonitorEvent::StatusChanged { .. })
        })
        .await;
        let MonitorEvent::StatusChanged { name, status, .. } = changed else {
            unreachable!()
        };
        assert_eq!(name, "cdc-wdm0");
        assert_eq!(status, DeviceStatus::Ready);

        let info = manager.device("cdc-wdm0").await.unwrap().unwrap();
        assert_eq!(info.status, DeviceStatus::Ready);
    }

    #[tokio::test]
    async fn wrong_pin_is_rejected_with_remaining_attempts() {
        let (manager, _events) = locked_setup().await;

        let err = manager.unlock("cdc-wdm0", "0000").await.unwrap_err();
        match err {
            CoreError::UnlockRejected {
                status,
                attempts_left,
            } => {
                assert_eq!(status, DeviceStatus::SimPinLocked);
                assert_eq!(attempts_left, Some(2));
            }
            other => panic!("expected UnlockRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausting_attempts_blocks_the_sim() {
        let (manager, mut events) = locked_setup().await;

        for _ in 0..2 {
            let _ = manager.unlock("cdc-wdm0", "0000").await;
        }
        let err = manager.unlock("cdc-wdm0", "0000").await.unwrap_err();
        match err {
            CoreError::UnlockRejected { status, .. } => {
                assert_eq!(status, DeviceStatus::SimPukLocked);
            }
            other => panic!("expected UnlockRejected, got {other:?}"),
        }
        wait_for(&mut events, |e| {
            matches!(
                e,
                MonitorEvent::StatusChanged {
                    status: DeviceStatus::SimPukLocked,
                    ..
                }
            )
        })
        .await;
    }

    #[tokio::test]
    async fn unlock_on_ready_device_is_a_usage_error() {
        let rig = Arc::new(SimRig::new());
        rig.insert("cdc-wdm0", Arc::new(SimModem::ready()));
        let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));
        wait_for(&mut events, is_added).await;

        let err = manager.unlock("cdc-wdm0", "1234").await.unwrap_err();
        assert!(matches!(err, CoreError::NotPinLocked(DeviceStatus::Ready)));
        assert!(err.is_usage_error());
    }

    #[tokio::test]
    async fn unlock_of_unknown_device_is_not_found() {
        let rig = Arc::new(SimRig::new());
        let hotplug = SimHotplug::new();
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));
        wait_for(&mut events, |e| matches!(e, MonitorEvent::InitialScanDone)).await;

        let err = manager.unlock("cdc-wdm9", "1234").await.unwrap_err();
        assert!(matches!(err, CoreError::DeviceNotFound(name) if name == "cdc-wdm9"));
    }
}

// ============================================================================
// Signal Monitoring
// ============================================================================

mod monitoring_tests {
    use super::*;

    async fn monitored_setup(
        frames: Vec<SignalInfo>,
    ) -> (DeviceManager, UnboundedReceiver<MonitorEvent>, Arc<SimModem>) {
        let rig = Arc::new(SimRig::new());
        let modem = rig.insert_script(
            "cdc-wdm0",
            ModemScript {
                frames,
                ..ModemScript::default()
            },
        );
        let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));
        wait_for(&mut events, is_added).await;
        (manager, events, modem)
    }

    #[tokio::test]
    async fn polling_emits_every_sample_family() {
        let (manager, mut events, _modem) = monitored_setup(vec![lte_frame(-70)]).await;
        manager.start_monitoring("cdc-wdm0").await.unwrap();

        let strength = wait_for(&mut events, |e| {
            matches!(e, MonitorEvent::StrengthUpdated { .. })
        })
        .await;
        let MonitorEvent::StrengthUpdated { name, sample } = strength else {
            unreachable!()
        };
        assert_eq!(name, "cdc-wdm0");
        assert_eq!(sample.lte, -70.0);
        assert_eq!(sample.gsm, NO_READING);
        assert_eq!(sample.cdma, NO_READING);

        wait_for(&mut events, |e| matches!(e, MonitorEvent::EcioUpdated { .. })).await;
        wait_for(&mut events, |e| matches!(e, MonitorEvent::SinrUpdated { .. })).await;
        wait_for(&mut events, |e| matches!(e, MonitorEvent::PowerUpdated { .. })).await;
        let quality = wait_for(&mut events, |e| {
            matches!(e, MonitorEvent::QualityUpdated { .. })
        })
        .await;
        let MonitorEvent::QualityUpdated { sample, .. } = quality else {
            unreachable!()
        };
        assert_eq!(sample.lte, -11.0);
    }

    #[tokio::test]
    async fn starting_twice_is_rejected_without_a_second_client() {
        let (manager, _events, modem) = monitored_setup(Vec::new()).await;
        manager.start_monitoring("cdc-wdm0").await.unwrap();

        let err = manager.start_monitoring("cdc-wdm0").await.unwrap_err();
        assert!(matches!(err, CoreError::MonitoringActive));
        // device-management plus exactly one network-access client
        assert_eq!(modem.outstanding_clients(), 2);
    }

    #[tokio::test]
    async fn stop_monitoring_stops_the_polls() {
        let (manager, _events, modem) = monitored_setup(Vec::new()).await;
        manager.start_monitoring("cdc-wdm0").await.unwrap();
        eventually("first poll", || modem.poll_count() > 0).await;

        manager.stop_monitoring("cdc-wdm0").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = modem.poll_count();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(modem.poll_count(), settled);
        assert_eq!(modem.outstanding_clients(), 1);
    }

    #[tokio::test]
    async fn stopping_when_inactive_is_a_usage_error() {
        let (manager, _events, _modem) = monitored_setup(Vec::new()).await;
        let err = manager.stop_monitoring("cdc-wdm0").await.unwrap_err();
        assert!(matches!(err, CoreError::MonitoringInactive));
    }

    #[tokio::test]
    async fn failed_polls_are_skipped_not_fatal() {
        let rig = Arc::new(SimRig::new());
        rig.insert_script(
            "cdc-wdm0",
            ModemScript {
                fail_at: Some(FailPoint::SignalInfo),
                ..ModemScript::default()
            },
        );
        let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));
        wait_for(&mut events, is_added).await;

        manager.start_monitoring("cdc-wdm0").await.unwrap();
        assert_quiet(&mut events, Duration::from_millis(200), |e| {
            e.is_signal_sample()
        })
        .await;
        // the session is still alive and serving commands
        assert!(manager.device("cdc-wdm0").await.unwrap().is_some());
    }
}

// ============================================================================
// Shutdown Barrier
// ============================================================================

mod shutdown_tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_closes_live_and_pending_before_returning() {
        let rig = Arc::new(SimRig::new());
        let fast = rig.insert_script("cdc-wdm0", ModemScript::default());
        let slow = rig.insert_script(
            "cdc-wdm1",
            ModemScript {
                close_delay: Duration::from_millis(150),
                ..ModemScript::default()
            },
        );
        let late = rig.insert_script(
            "cdc-wdm2",
            ModemScript {
                open_delay: Duration::from_millis(300),
                ..ModemScript::default()
            },
        );
        let hotplug =
            SimHotplug::with_nodes(vec![modem_node("cdc-wdm0"), modem_node("cdc-wdm1")]);
        let plug = hotplug.clone();
        let (manager, mut events) =
            DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        wait_for(&mut events, |e| matches!(e, MonitorEvent::InitialScanDone)).await;
        assert_eq!(manager.list_devices().await.unwrap().len(), 2);

        // a construction still in flight when shutdown starts
        plug.attach(modem_node("cdc-wdm2"));
        wait_for(&mut events, |e| {
            matches!(e, MonitorEvent::DetectionActivity { active: true })
        })
        .await;

        manager.shutdown().await.unwrap();

        assert_eq!(fast.close_count(), 1);
        assert_eq!(slow.close_count(), 1);
        assert_eq!(fast.outstanding_clients(), 0);
        assert_eq!(slow.outstanding_clients(), 0);
        // the late construction was discarded, never published
        eventually("late construction closed", || late.close_count() >= 1).await;
        assert_quiet(&mut events, Duration::from_millis(100), is_added).await;
    }

    #[tokio::test]
    async fn shutdown_gives_up_after_the_configured_timeout() {
        let rig = Arc::new(SimRig::new());
        rig.insert_script(
            "cdc-wdm0",
            ModemScript {
                close_delay: Duration::from_secs(60),
                ..ModemScript::default()
            },
        );
        let hotplug = SimHotplug::with_nodes(vec![modem_node("cdc-wdm0")]);
        let (manager, mut events) = DeviceManager::spawn(
            MonitorConfig {
                shutdown_timeout: Some(Duration::from_millis(100)),
                ..test_config()
            },
            rig,
            Box::new(hotplug),
        );
        wait_for(&mut events, is_added).await;

        let started = tokio::time::Instant::now();
        manager.shutdown().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn commands_after_shutdown_report_manager_stopped() {
        let rig = Arc::new(SimRig::new());
        let hotplug = SimHotplug::new();
        let (manager, _events) = DeviceManager::spawn(test_config(), rig, Box::new(hotplug));

        manager.shutdown().await.unwrap();
        let err = manager.list_devices().await.unwrap_err();
        assert!(matches!(err, CoreError::ManagerStopped));
    }
}
