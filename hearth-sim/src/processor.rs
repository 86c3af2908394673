use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use hearth_core::{DeviceId, DeviceKind, ProcessedReading, ThresholdStatus};
use rand::Rng;
use tracing::debug;

use crate::clock::Clock;
use crate::notification::{AlertOutcome, NotificationManager};
use crate::physics;
use crate::threshold::ThresholdManager;

const FALLBACK_HUMIDITY: f64 = 50.0;
const FALLBACK_TEMPERATURE: f64 = 20.0;
const NOMINAL_VOLTAGE: f64 = 220.0;

/// Companion readings used for derived metrics. Missing values fall back to
/// 50 % humidity and 20 °C.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ambient {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub reading: ProcessedReading,
    pub status: ThresholdStatus,
    /// Set when the reading fell outside its band and an alert was offered.
    pub alert: Option<AlertOutcome>,
}

/// Turns raw readings into processed readings and keeps the latest one per
/// device.
pub struct DataProcessor {
    thresholds: Arc<ThresholdManager>,
    notifications: Arc<NotificationManager>,
    clock: Arc<dyn Clock>,
    readings: DashMap<DeviceId, ProcessedReading>,
}

impl DataProcessor {
    pub fn new(
        thresholds: Arc<ThresholdManager>,
        notifications: Arc<NotificationManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            thresholds,
            notifications,
            clock,
            readings: DashMap::new(),
        }
    }

    pub fn process(&self, device_id: &DeviceId, kind: DeviceKind, raw: f64) -> ProcessOutcome {
        self.process_with_ambient(device_id, kind, raw, Ambient::default())
    }

    pub fn process_with_ambient(
        &self,
        device_id: &DeviceId,
        kind: DeviceKind,
        raw: f64,
        ambient: Ambient,
    ) -> ProcessOutcome {
        let processed = adjust(kind, raw);
        let metrics = derived_metrics(kind, raw, ambient);
        let now = self.clock.now();

        let reading = {
            let mut reading = self
                .readings
                .entry(device_id.clone())
                .or_insert_with(|| ProcessedReading {
                    raw_value: 0.0,
                    processed_value: 0.0,
                    average: 0.0,
                    min: 0.0,
                    max: 0.0,
                    unit: kind.unit().into(),
                    valid: false,
                    metrics: BTreeMap::new(),
                    updated_at: now,
                });

            reading.raw_value = raw;
            reading.processed_value = processed;
            reading.unit = kind.unit().into();
            reading.valid = processed.is_finite();
            reading.metrics = metrics;
            reading.updated_at = now;

            // Zero doubles as "unset" for the running extremes.
            if reading.min == 0.0 || raw < reading.min {
                reading.min = raw;
            }
            if reading.max == 0.0 || raw > reading.max {
                reading.max = raw;
            }
            reading.average = reading.average * 0.9 + raw * 0.1;

            reading.clone()
        };

        let parameter = kind.primary_parameter();
        let status = self.thresholds.classify(device_id, parameter, processed);

        // Readings inside the warning margin are still in band and stay silent.
        let alert = match (status, self.thresholds.band(device_id, parameter)) {
            (ThresholdStatus::Critical, Some(band)) => Some(self.notifications.send_alert(
                device_id,
                parameter,
                processed,
                kind.unit(),
                band,
            )),
            _ => None,
        };

        debug!(
            device_id = %device_id,
            kind = %kind,
            raw,
            processed,
            status = ?status,
            "Processed reading"
        );

        ProcessOutcome {
            reading,
            status,
            alert,
        }
    }

    pub fn latest(&self, device_id: &DeviceId) -> Option<ProcessedReading> {
        self.readings.get(device_id).map(|reading| reading.clone())
    }

    pub fn clear(&self, device_id: &DeviceId) {
        self.readings.remove(device_id);
    }

    pub fn clear_all(&self) {
        self.readings.clear();
    }
}

/// Fixed per-type adjustment applied to every reading, independent of any
/// learned calibration.
pub fn adjust(kind: DeviceKind, raw: f64) -> f64 {
    match kind {
        DeviceKind::TemperatureSensor => raw * 1.02 - 0.1,
        DeviceKind::HumiditySensor => (raw * 1.05).clamp(0.0, 100.0),
        DeviceKind::WaterSensor => raw * 1.1,
        DeviceKind::ElectricitySensor => raw * 0.98,
        DeviceKind::AirSensor => raw * 1.15,
        DeviceKind::Light | DeviceKind::ClimateControl => raw,
    }
}

fn derived_metrics(kind: DeviceKind, raw: f64, ambient: Ambient) -> BTreeMap<String, f64> {
    let humidity = ambient.humidity.unwrap_or(FALLBACK_HUMIDITY);
    let temperature = ambient.temperature.unwrap_or(FALLBACK_TEMPERATURE);

    let metrics: Vec<(&str, f64)> = match kind {
        DeviceKind::TemperatureSensor => vec![
            ("heat_index", physics::heat_index(raw, humidity)),
            ("dew_point", physics::dew_point(raw, humidity)),
        ],
        DeviceKind::HumiditySensor => vec![(
            "absolute_humidity",
            physics::absolute_humidity(temperature, raw),
        )],
        DeviceKind::WaterSensor => vec![
            ("pressure", physics::water_pressure(raw)),
            ("flow", physics::flow_rate(raw)),
        ],
        DeviceKind::ElectricitySensor => {
            let mut rng = rand::rng();
            vec![
                ("current", raw / NOMINAL_VOLTAGE),
                ("voltage", NOMINAL_VOLTAGE + rng.random_range(-5.0..=5.0)),
                ("power_factor", 0.95 + rng.random_range(0.0..=0.05)),
            ]
        }
        DeviceKind::AirSensor => vec![
            ("pm25", raw * 0.4),
            ("pm10", raw * 0.6),
            ("co2", 400.0 + raw * 2.0),
        ],
        DeviceKind::Light | DeviceKind::ClimateControl => Vec::new(),
    };

    metrics
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect()
}
