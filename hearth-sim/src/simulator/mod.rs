pub mod model;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use hearth_core::{
    AlertRecord, CalibrationRecord, DeviceId, DeviceKind, ParamValue, ProcessedReading, Quantity,
    TelemetryState, ThresholdStatus,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SimulatorConfig;
use crate::error::{Error, Result};
use crate::processor::Ambient;
use crate::registry::DeviceRegistry;
use crate::services::Services;

const EVENT_CAPACITY: usize = 256;

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatorEvent {
    DataUpdated {
        device_id: DeviceId,
        state: TelemetryState,
    },
    StatusChanged {
        device_id: DeviceId,
        connected: bool,
    },
}

struct SimulatedDevice {
    kind: DeviceKind,
    state: TelemetryState,
}

/// Drives one synthetic telemetry state per registered device and feeds the
/// primary reading of each through the processing pipeline.
pub struct Simulator {
    config: SimulatorConfig,
    services: Services,
    registry: Arc<dyn DeviceRegistry>,
    devices: DashMap<DeviceId, SimulatedDevice>,
    rng: Mutex<StdRng>,
    events: broadcast::Sender<SimulatorEvent>,
    /// Held for the duration of a tick.
    tick_lock: Mutex<()>,
    /// Token of the running ticker, if any.
    running: Mutex<Option<CancellationToken>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Simulator {
    pub fn new(
        config: SimulatorConfig,
        services: Services,
        registry: Arc<dyn DeviceRegistry>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            config,
            services,
            registry,
            devices: DashMap::new(),
            rng: Mutex::new(rng),
            events,
            tick_lock: Mutex::new(()),
            running: Mutex::new(None),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimulatorEvent> {
        self.events.subscribe()
    }

    /// Start simulating `device_id`. Registering an id again replaces its
    /// state and thresholds.
    pub fn register_device(&self, device_id: &DeviceId, kind: DeviceKind) {
        let device = self.registry.get(device_id);
        let now = self.services.clock.now();
        let state = {
            let mut rng = lock(&self.rng);
            model::seed(kind, device.as_ref(), now, &mut *rng)
        };

        self.devices
            .insert(device_id.clone(), SimulatedDevice { kind, state });
        self.services.thresholds.seed_defaults(device_id, kind);
        self.services.notifications.ensure_config(device_id);

        info!(device_id = %device_id, kind = %kind, "Registered device");
    }

    /// Register every device the registry knows about.
    pub fn register_all(&self) {
        for device in self.registry.list() {
            self.register_device(&device.id, device.kind);
        }
    }

    /// Stop simulating `device_id` and drop what the pipeline learned about
    /// it. Alert history and notification settings are kept.
    pub fn unregister_device(&self, device_id: &DeviceId) {
        if self.devices.remove(device_id).is_some() {
            info!(device_id = %device_id, "Unregistered device");
        }

        self.services.calibration.reset(device_id);
        self.services.thresholds.reset(device_id);
        self.services.processor.clear(device_id);
    }

    pub fn is_registered(&self, device_id: &DeviceId) -> bool {
        self.devices.contains_key(device_id)
    }

    /// Registered device ids in ascending order.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn kind(&self, device_id: &DeviceId) -> Option<DeviceKind> {
        self.devices.get(device_id).map(|device| device.kind)
    }

    /// Advance every registered device by one step.
    pub fn tick(&self) {
        let _tick = lock(&self.tick_lock);

        for device_id in self.device_ids() {
            self.tick_device(&device_id);
        }
    }

    fn tick_device(&self, device_id: &DeviceId) {
        let device = self.registry.get(device_id);
        let now = self.services.clock.now();
        let elapsed_secs = self.config.tick_interval().as_secs_f64();
        let disconnect_probability = self.config.disconnect_probability.clamp(0.0, 1.0);

        let (kind, connected, status_changed, snapshot) = {
            // The device may have been unregistered since the id snapshot.
            let Some(mut simulated) = self.devices.get_mut(device_id) else {
                return;
            };
            let kind = simulated.kind;
            let state = &mut simulated.state;
            let mut rng = lock(&self.rng);

            let status_changed = rng.random_bool(disconnect_probability);
            if status_changed {
                state.connected = !state.connected;
            }

            if state.connected {
                model::perturb(state, &mut *rng);
                model::derive(kind, state, device.as_ref(), elapsed_secs, &mut *rng);
                state.last_update = now;
            }

            (kind, state.connected, status_changed, state.clone())
        };

        if status_changed {
            info!(device_id = %device_id, connected, "Device connectivity changed");
            let _ = self.events.send(SimulatorEvent::StatusChanged {
                device_id: device_id.clone(),
                connected,
            });
        }

        if !connected {
            return;
        }

        let primary = kind.primary_parameter();
        if let Some(raw) = snapshot.value_of(primary) {
            let calibrated = self.services.calibration.apply(device_id, kind, raw);
            let ambient = Ambient {
                temperature: Some(snapshot.temperature),
                humidity: Some(snapshot.humidity),
            };
            self.services
                .processor
                .process_with_ambient(device_id, kind, calibrated, ambient);
        }

        self.check_secondary_bands(device_id, primary, &snapshot);

        debug!(device_id = %device_id, kind = %kind, "Telemetry updated");
        let _ = self.events.send(SimulatorEvent::DataUpdated {
            device_id: device_id.clone(),
            state: snapshot,
        });
    }

    /// Alert on every out-of-band parameter other than the primary one, which
    /// the processor has already handled.
    fn check_secondary_bands(&self, device_id: &DeviceId, primary: &str, state: &TelemetryState) {
        let Some(thresholds) = self.services.thresholds.thresholds(device_id) else {
            return;
        };

        for parameter in thresholds.parameters().filter(|parameter| *parameter != primary) {
            let (Some(band), Some(value)) =
                (thresholds.band(parameter), state.value_of(parameter))
            else {
                continue;
            };
            if band.classify(value) != ThresholdStatus::Critical {
                continue;
            }
            self.services
                .notifications
                .send_alert(device_id, parameter, value, unit_of(parameter), band);
        }
    }

    /// Start the periodic ticker. The first tick fires one period after
    /// start. Returns `false` if the ticker was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let cancel = {
            let mut running = lock(&self.running);
            if running.is_some() {
                debug!("Simulator already running");
                return false;
            }
            let cancel = CancellationToken::new();
            *running = Some(cancel.clone());
            cancel
        };

        let period = self.config.tick_interval();
        info!(interval_ms = period.as_millis() as u64, "Starting simulator");

        let simulator = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("Simulator shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        simulator.tick();
                    }
                }
            }
        });

        true
    }

    /// Cancel the ticker. Calling this when stopped does nothing.
    pub fn stop(&self) {
        if let Some(cancel) = lock(&self.running).take() {
            cancel.cancel();
            info!("Simulator stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Overwrite one quantity of a registered device, clamped to its range.
    pub fn force(&self, device_id: &DeviceId, quantity: Quantity, value: f64) -> Result<()> {
        let mut simulated = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| Error::DeviceNotRegistered(device_id.clone()))?;
        simulated.state.set(quantity, value);
        Ok(())
    }

    pub fn set_device_power(&self, device_id: &DeviceId, on: bool) -> Result<()> {
        self.registry.set_power(device_id, on)?;
        info!(device_id = %device_id, on, "Device power changed");
        Ok(())
    }

    /// Update a registry parameter and mirror it into the device's telemetry.
    pub fn set_parameter(&self, device_id: &DeviceId, name: &str, value: ParamValue) -> Result<()> {
        self.registry.set_parameter(device_id, name, value.clone())?;
        if let Some(mut simulated) = self.devices.get_mut(device_id) {
            simulated.state.set_param(name, value);
        }
        Ok(())
    }

    /// Submit a reference sample for the device's calibration. Returns `true`
    /// when the sample completed a calibration.
    pub fn record_reference_sample(&self, device_id: &DeviceId, reference: f64) -> Result<bool> {
        let kind = self
            .kind(device_id)
            .ok_or_else(|| Error::DeviceNotRegistered(device_id.clone()))?;
        Ok(self
            .services
            .calibration
            .record_reference_sample(device_id, kind, reference))
    }

    pub fn telemetry(&self, device_id: &DeviceId) -> Option<TelemetryState> {
        self.devices.get(device_id).map(|device| device.state.clone())
    }

    pub fn latest_processed(&self, device_id: &DeviceId) -> Option<ProcessedReading> {
        self.services.processor.latest(device_id)
    }

    pub fn calibration(&self, device_id: &DeviceId) -> Option<CalibrationRecord> {
        self.services.calibration.record(device_id)
    }

    pub fn threshold_status(
        &self,
        device_id: &DeviceId,
        parameter: &str,
        value: f64,
    ) -> ThresholdStatus {
        self.services.thresholds.classify(device_id, parameter, value)
    }

    pub fn alert_history(&self, device_id: &DeviceId) -> Vec<AlertRecord> {
        self.services.notifications.alert_history(device_id)
    }
}

fn unit_of(parameter: &str) -> &'static str {
    match Quantity::from_name(parameter) {
        Some(quantity) => quantity.unit(),
        None if parameter == "air_quality" => "AQI",
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use hearth_core::{Device, Notification};

    use crate::clock::ManualClock;
    use crate::notification::{NotificationSink, TracingSink};
    use crate::registry::InMemoryDeviceRegistry;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Notification>>);

    impl NotificationSink for Recorder {
        fn dispatch(&self, notification: Notification) {
            lock(&self.0).push(notification);
        }
    }

    fn simulator(registry: InMemoryDeviceRegistry) -> (Arc<Recorder>, Simulator) {
        let recorder = Arc::new(Recorder::default());
        let services = Services::new(
            Arc::new(ManualClock::default()),
            recorder.clone(),
            Arc::new(TracingSink),
        );
        let config = SimulatorConfig {
            disconnect_probability: 0.0,
            seed: Some(1),
            ..Default::default()
        };
        (recorder, Simulator::new(config, services, Arc::new(registry)))
    }

    #[test]
    fn registration_seeds_state_thresholds_and_notifications() {
        let (_, sim) = simulator(InMemoryDeviceRegistry::new());
        let id = DeviceId::from("h");

        sim.register_device(&id, DeviceKind::HumiditySensor);

        let state = sim.telemetry(&id).unwrap();
        assert!((65.0..=85.0).contains(&state.humidity));
        assert!(state.connected);
        assert!(sim.services().thresholds.band(&id, "humidity").is_some());
        assert!(sim.services().notifications.has_config(&id));
    }

    #[test]
    fn unregister_forgets_pipeline_state_and_is_idempotent() {
        let (_, sim) = simulator(InMemoryDeviceRegistry::new());
        let id = DeviceId::from("w");
        sim.register_device(&id, DeviceKind::WaterSensor);
        sim.tick();
        assert!(sim.latest_processed(&id).is_some());

        sim.unregister_device(&id);
        sim.unregister_device(&id);

        assert!(sim.telemetry(&id).is_none());
        assert!(sim.latest_processed(&id).is_none());
        assert!(!sim.services().thresholds.has_thresholds(&id));
        assert!(sim.device_ids().is_empty());
    }

    #[test]
    fn secondary_bands_raise_their_own_alerts() {
        let (recorder, sim) = simulator(InMemoryDeviceRegistry::new());
        let id = DeviceId::from("meter");
        sim.register_device(&id, DeviceKind::ElectricitySensor);
        sim.force(&id, Quantity::Voltage, 250.0).unwrap();

        sim.tick();

        let history = sim.alert_history(&id);
        assert!(history.iter().any(|alert| &*alert.parameter == "voltage" && &*alert.unit == "V"));
        assert!(!lock(&recorder.0).is_empty());
    }

    #[test]
    fn events_follow_each_tick() {
        let (_, sim) = simulator(InMemoryDeviceRegistry::new());
        let mut events = sim.subscribe();
        let id = DeviceId::from("air");
        sim.register_device(&id, DeviceKind::AirSensor);

        sim.tick();

        match events.try_recv() {
            Ok(SimulatorEvent::DataUpdated { device_id, state }) => {
                assert_eq!(device_id, id);
                assert!(state.number("air_quality").is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn disconnected_devices_skip_the_pipeline() {
        let registry = InMemoryDeviceRegistry::new();
        let recorder = Arc::new(Recorder::default());
        let services = Services::new(
            Arc::new(ManualClock::default()),
            recorder,
            Arc::new(TracingSink),
        );
        let config = SimulatorConfig {
            disconnect_probability: 1.0,
            seed: Some(3),
            ..Default::default()
        };
        let sim = Simulator::new(config, services, Arc::new(registry));
        let mut events = sim.subscribe();
        let id = DeviceId::from("t");
        sim.register_device(&id, DeviceKind::TemperatureSensor);

        sim.tick();

        assert_eq!(
            events.try_recv().ok(),
            Some(SimulatorEvent::StatusChanged {
                device_id: id.clone(),
                connected: false,
            })
        );
        assert!(events.try_recv().is_err());
        assert!(sim.latest_processed(&id).is_none());
    }

    #[test]
    fn parameters_reach_registry_and_telemetry() {
        let registry = InMemoryDeviceRegistry::new();
        registry.insert(Device::new("ac", DeviceKind::ClimateControl));
        let (_, sim) = simulator(registry);
        let id = DeviceId::from("ac");
        sim.register_all();

        sim.set_device_power(&id, true).unwrap();
        sim.set_parameter(&id, "mode", ParamValue::from("heat")).unwrap();

        assert_eq!(
            sim.telemetry(&id).unwrap().param("mode"),
            Some(&ParamValue::from("heat"))
        );
        assert!(matches!(
            sim.set_device_power(&DeviceId::from("nope"), true),
            Err(Error::UnknownDevice(_))
        ));
        assert!(matches!(
            sim.force(&DeviceId::from("nope"), Quantity::Power, 1.0),
            Err(Error::DeviceNotRegistered(_))
        ));
    }

    #[test]
    fn reference_samples_use_the_registered_kind() {
        let (_, sim) = simulator(InMemoryDeviceRegistry::new());
        let id = DeviceId::from("t");
        sim.register_device(&id, DeviceKind::TemperatureSensor);

        for _ in 0..9 {
            assert!(!sim.record_reference_sample(&id, 4.0).unwrap());
        }
        assert!(sim.record_reference_sample(&id, 4.0).unwrap());
        assert!(sim.calibration(&id).is_some_and(|record| record.calibrated));
    }
}
