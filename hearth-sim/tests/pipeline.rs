use std::sync::{Arc, Mutex};
use std::time::Duration;

use hearth_core::*;
use hearth_sim::{
    Error, InMemoryDeviceRegistry, ManualClock, NotificationSink, Services, Simulator,
    SimulatorConfig, SimulatorEvent, TracingSink,
};

#[derive(Default)]
struct RecordingSink {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }
}

impl NotificationSink for RecordingSink {
    fn dispatch(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
    simulator: Arc<Simulator>,
}

fn harness(registry: InMemoryDeviceRegistry) -> Harness {
    let clock = Arc::new(ManualClock::new(jiff::Timestamp::from_second(1_700_000_000).unwrap()));
    let sink = Arc::new(RecordingSink::default());
    let services = Services::new(clock.clone(), sink.clone(), Arc::new(TracingSink));
    let config = SimulatorConfig {
        tick_interval_ms: 2000,
        disconnect_probability: 0.0,
        seed: Some(42),
    };

    Harness {
        clock,
        sink,
        simulator: Arc::new(Simulator::new(config, services, Arc::new(registry))),
    }
}

#[test]
fn forced_overheat_raises_one_critical_alert() -> Result<(), Error> {
    let h = harness(InMemoryDeviceRegistry::new());
    let id = DeviceId::from("3");

    h.simulator.register_device(&id, DeviceKind::TemperatureSensor);
    h.simulator.services().thresholds.set_thresholds(
        &id,
        ThresholdSet::new().with_band("temperature", -5.0, 40.0),
    );
    h.simulator.force(&id, Quantity::Temperature, 45.0)?;

    h.simulator.tick();

    assert_eq!(
        h.simulator.threshold_status(&id, "temperature", 45.0),
        ThresholdStatus::Critical
    );
    let history = h.simulator.alert_history(&id);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].level, AlertLevel::Critical);
    assert_eq!(&*history[0].parameter, "temperature");
    assert_eq!(h.sink.count(), 1);

    let processed = h.simulator.latest_processed(&id).unwrap();
    assert!(processed.processed_value > 40.0);
    assert!(processed.metrics.contains_key("dew_point"));

    Ok(())
}

#[test]
fn telemetry_stays_in_range_for_every_kind() {
    let registry: InMemoryDeviceRegistry = DeviceKind::ALL
        .into_iter()
        .map(|kind| {
            let mut device = Device::new(kind.as_str(), kind);
            device.on = true;
            device
        })
        .collect();
    let h = harness(registry);
    h.simulator.register_all();
    assert_eq!(h.simulator.device_ids().len(), DeviceKind::ALL.len());

    for _ in 0..500 {
        h.simulator.tick();
        h.clock.advance(Duration::from_secs(2));

        for id in h.simulator.device_ids() {
            let state = h.simulator.telemetry(&id).unwrap();
            for quantity in Quantity::ALL {
                let (min, max) = quantity.range();
                let value = state.get(quantity);
                assert!(value >= min && value <= max, "{id} {quantity:?} = {value}");
            }
            assert!((0.0..=100.0).contains(&state.humidity));
            assert!((0.0..=100.0).contains(&state.signal_strength));
        }
    }
}

#[test]
fn in_margin_readings_raise_no_alert() -> Result<(), Error> {
    let h = harness(InMemoryDeviceRegistry::new());
    let id = DeviceId::from("fridge");
    h.simulator.register_device(&id, DeviceKind::TemperatureSensor);

    // 38.5 adjusts to 39.17: inside the upper 10 % margin of [-5, 40].
    h.simulator.force(&id, Quantity::Temperature, 38.5)?;
    h.simulator.tick();

    let processed = h.simulator.latest_processed(&id).unwrap();
    assert!(processed.processed_value <= 40.0);
    assert_eq!(
        h.simulator
            .threshold_status(&id, "temperature", processed.processed_value),
        ThresholdStatus::Warning
    );
    assert!(h.simulator.alert_history(&id).is_empty());
    assert_eq!(h.sink.count(), 0);

    Ok(())
}

#[test]
fn warnings_respect_cooldown_but_critical_does_not() {
    let h = harness(InMemoryDeviceRegistry::new());
    let id = DeviceId::from("fridge");
    h.simulator.register_device(&id, DeviceKind::TemperatureSensor);
    let notifications = &h.simulator.services().notifications;
    let band = Band::new(-5.0, 40.0);

    let first = notifications.send_alert(&id, "temperature", 39.0, "°C", band);
    assert!(first.is_dispatched());
    assert_eq!(first.level(), Some(AlertLevel::Warning));

    h.clock.advance(Duration::from_secs(60));
    let repeat = notifications.send_alert(&id, "temperature", 39.0, "°C", band);
    assert!(!repeat.is_dispatched());

    let critical = notifications.send_alert(&id, "temperature", 45.0, "°C", band);
    assert_eq!(critical.level(), Some(AlertLevel::Critical));
    assert!(critical.is_dispatched());

    h.clock.advance(Duration::from_secs(301));
    assert!(
        notifications
            .send_alert(&id, "temperature", 39.0, "°C", band)
            .is_dispatched()
    );

    let history = h.simulator.alert_history(&id);
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].level, AlertLevel::Warning);
    assert_eq!(h.sink.count(), 3);
}

#[test]
fn calibration_converges_then_expires() -> Result<(), Error> {
    let h = harness(InMemoryDeviceRegistry::new());
    let id = DeviceId::from("t1");
    h.simulator.register_device(&id, DeviceKind::TemperatureSensor);
    let calibration = &h.simulator.services().calibration;

    assert!(calibration.needs_calibration(&id, DeviceKind::TemperatureSensor));
    assert_eq!(calibration.apply(&id, DeviceKind::TemperatureSensor, 3.3), 3.3);

    for reference in [4.0, 4.2, 3.8, 4.1, 3.9, 4.0, 4.0, 4.0, 3.7, 4.3] {
        h.simulator.record_reference_sample(&id, reference)?;
    }

    let record = h.simulator.calibration(&id).unwrap();
    assert!(record.calibrated);
    assert_eq!(record.calibration_count, 1);
    assert!((record.offset - 0.3).abs() < 1e-9);
    assert!(!calibration.needs_calibration(&id, DeviceKind::TemperatureSensor));

    let expected = ((3.0 + record.offset) * record.multiplier).clamp(-5.0, 8.0);
    assert_eq!(calibration.apply(&id, DeviceKind::TemperatureSensor, 3.0), expected);

    h.clock.advance(Duration::from_secs(24 * 60 * 60));
    assert!(!calibration.needs_calibration(&id, DeviceKind::TemperatureSensor));
    h.clock.advance(Duration::from_millis(1));
    assert!(calibration.needs_calibration(&id, DeviceKind::TemperatureSensor));

    Ok(())
}

#[test]
fn teardown_is_idempotent() {
    let h = harness(InMemoryDeviceRegistry::new());
    let id = DeviceId::from("w");
    h.simulator.register_device(&id, DeviceKind::WaterSensor);
    h.simulator.tick();

    h.simulator.unregister_device(&id);
    h.simulator.unregister_device(&id);
    h.simulator.stop();
    h.simulator.stop();

    assert!(!h.simulator.is_registered(&id));
    assert!(h.simulator.telemetry(&id).is_none());
    assert!(h.simulator.calibration(&id).is_none());
    assert!(!h.simulator.is_running());

    // Ticking with nothing registered is harmless.
    h.simulator.tick();
}

#[tokio::test(start_paused = true)]
async fn ticker_fires_after_one_period_and_stops_cleanly() {
    let h = harness(InMemoryDeviceRegistry::new());
    let id = DeviceId::from("air");
    h.simulator.register_device(&id, DeviceKind::AirSensor);
    let mut events = h.simulator.subscribe();

    let started = tokio::time::Instant::now();
    assert!(h.simulator.start());
    assert!(!h.simulator.start());
    assert!(h.simulator.is_running());

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("ticker should fire")
        .expect("event channel open");
    assert!(started.elapsed() >= Duration::from_millis(2000));
    assert!(matches!(event, SimulatorEvent::DataUpdated { ref device_id, .. } if *device_id == id));

    h.simulator.stop();
    h.simulator.stop();
    assert!(!h.simulator.is_running());
    while events.try_recv().is_ok() {}

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(events.try_recv().is_err());
}
