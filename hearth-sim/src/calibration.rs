use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use hearth_core::{
    CalibrationConfig, CalibrationRecord, DEFAULT_REQUIRED_SAMPLES, DeviceId, DeviceKind,
};
use tracing::{debug, info};

use crate::clock::{self, Clock};

/// Learns a per-device linear correction from reference samples and applies
/// it to raw readings.
pub struct CalibrationService {
    clock: Arc<dyn Clock>,
    records: DashMap<DeviceId, CalibrationRecord>,
    history: DashMap<DeviceId, Vec<f64>>,
    configs: RwLock<HashMap<DeviceKind, CalibrationConfig>>,
}

impl CalibrationService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            records: DashMap::new(),
            history: DashMap::new(),
            configs: RwLock::new(default_configs()),
        }
    }

    pub fn set_config(&self, kind: DeviceKind, config: CalibrationConfig) {
        let mut configs = self.configs.write().unwrap_or_else(PoisonError::into_inner);
        configs.insert(kind, config);
    }

    pub fn config(&self, kind: DeviceKind) -> Option<CalibrationConfig> {
        let configs = self.configs.read().unwrap_or_else(PoisonError::into_inner);
        configs.get(&kind).cloned()
    }

    pub fn required_samples(&self, kind: DeviceKind) -> usize {
        self.config(kind)
            .map_or(DEFAULT_REQUIRED_SAMPLES, |config| config.required_samples)
    }

    pub fn accuracy(&self, kind: DeviceKind) -> f64 {
        self.config(kind).map_or(1.0, |config| config.accuracy)
    }

    /// Add a reference sample. The first sample creates an uncalibrated
    /// record. Once the pending history holds the required number of samples
    /// the correction is recomputed and the history cleared.
    /// Returns `true` when this sample completed a calibration.
    pub fn record_reference_sample(
        &self,
        device_id: &DeviceId,
        kind: DeviceKind,
        reference: f64,
    ) -> bool {
        let required = self.required_samples(kind).max(1);
        self.records.entry(device_id.clone()).or_default();

        let mut history = self.history.entry(device_id.clone()).or_default();
        history.push(reference);

        if history.len() < required {
            debug!(
                device_id = %device_id,
                pending = history.len(),
                required,
                "Recorded calibration reference sample"
            );
            return false;
        }

        let average = history.iter().sum::<f64>() / history.len() as f64;
        history.clear();
        drop(history);

        let offset = reference - average;
        let denominator = average + offset;
        let multiplier = if denominator == 0.0 {
            1.0
        } else {
            reference / denominator
        };
        let now = self.clock.now();

        let mut record = self.records.entry(device_id.clone()).or_default();
        record.offset = offset;
        record.multiplier = multiplier;
        record.reference_value = reference;
        record.last_calibrated_at = Some(now);
        record.calibration_count += 1;
        record.calibrated = true;
        update_coefficients(&mut record, kind);

        info!(
            device_id = %device_id,
            kind = %kind,
            offset,
            multiplier,
            count = record.calibration_count,
            "Calibration converged"
        );

        true
    }

    /// `(raw + offset) × multiplier` clamped to the type's range, or `raw`
    /// unchanged while the device is uncalibrated.
    pub fn apply(&self, device_id: &DeviceId, kind: DeviceKind, raw: f64) -> f64 {
        let Some((offset, multiplier)) = self
            .records
            .get(device_id)
            .filter(|record| record.calibrated)
            .map(|record| (record.offset, record.multiplier))
        else {
            return raw;
        };

        let calibrated = (raw + offset) * multiplier;
        match self.config(kind) {
            Some(config) => calibrated.clamp(config.min_value, config.max_value),
            None => calibrated,
        }
    }

    /// A device needs calibration when it has never converged, or when its
    /// last calibration is older than the type's interval.
    pub fn needs_calibration(&self, device_id: &DeviceId, kind: DeviceKind) -> bool {
        let Some(last) = self
            .records
            .get(device_id)
            .and_then(|record| record.last_calibrated_at)
        else {
            return true;
        };

        match self.config(kind) {
            Some(config) => clock::has_elapsed(last, self.clock.now(), config.calibration_interval),
            None => false,
        }
    }

    pub fn record(&self, device_id: &DeviceId) -> Option<CalibrationRecord> {
        self.records.get(device_id).map(|record| record.clone())
    }

    pub fn pending_samples(&self, device_id: &DeviceId) -> Vec<f64> {
        self.history
            .get(device_id)
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn reset(&self, device_id: &DeviceId) {
        self.records.remove(device_id);
        self.history.remove(device_id);
    }
}

fn update_coefficients(record: &mut CalibrationRecord, kind: DeviceKind) {
    let offset = record.offset;
    let coefficients = &mut record.coefficients;

    match kind {
        DeviceKind::TemperatureSensor => {
            coefficients.insert("temperature_offset".to_owned(), offset);
            coefficients.insert("temperature_multiplier".to_owned(), record.multiplier);
        }
        DeviceKind::HumiditySensor => {
            coefficients.insert("humidity_offset".to_owned(), offset);
            coefficients.insert("humidity_compensation".to_owned(), 1.0 + offset / 100.0);
        }
        DeviceKind::WaterSensor => {
            coefficients.insert("pressure_compensation".to_owned(), 1.0 + offset / 1000.0);
        }
        DeviceKind::ElectricitySensor => {
            coefficients.insert("power_factor".to_owned(), 0.95 + offset / 1000.0);
        }
        DeviceKind::AirSensor => {
            coefficients.insert("particle_offset".to_owned(), offset * 0.1);
        }
        DeviceKind::Light | DeviceKind::ClimateControl => {}
    }
}

fn default_configs() -> HashMap<DeviceKind, CalibrationConfig> {
    HashMap::from([
        (
            DeviceKind::TemperatureSensor,
            CalibrationConfig::new(-5.0, 8.0, 0.1, "°C"),
        ),
        (
            DeviceKind::HumiditySensor,
            CalibrationConfig::new(65.0, 85.0, 1.0, "%"),
        ),
        (
            DeviceKind::WaterSensor,
            CalibrationConfig::new(0.0, 100.0, 0.5, "cm"),
        ),
        (
            DeviceKind::ElectricitySensor,
            CalibrationConfig::new(0.0, 3500.0, 1.0, "W"),
        ),
        (
            DeviceKind::AirSensor,
            CalibrationConfig::new(0.0, 150.0, 1.0, "AQI"),
        ),
    ])
}
