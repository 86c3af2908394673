use std::collections::HashMap;

use dashmap::DashMap;
use hearth_core::{Band, DeviceId, DeviceKind, ThresholdSet, ThresholdStatus};
use tracing::debug;

use crate::error::{Error, Result};

/// Per-device threshold bands.
pub struct ThresholdManager {
    devices: DashMap<DeviceId, ThresholdSet>,
    defaults: HashMap<DeviceKind, ThresholdSet>,
}

impl ThresholdManager {
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
            defaults: default_thresholds(),
        }
    }

    /// Default set installed for devices of `kind`, if there is one.
    pub fn defaults_for(&self, kind: DeviceKind) -> Option<&ThresholdSet> {
        self.defaults.get(&kind)
    }

    /// Install the default set of `kind` for the device. Kinds without
    /// defaults leave the device untouched.
    pub fn seed_defaults(&self, device_id: &DeviceId, kind: DeviceKind) {
        if let Some(defaults) = self.defaults.get(&kind) {
            debug!(device_id = %device_id, kind = %kind, "Seeding default thresholds");
            self.devices.insert(device_id.clone(), defaults.clone());
        }
    }

    pub fn set_thresholds(&self, device_id: &DeviceId, thresholds: ThresholdSet) {
        self.devices.insert(device_id.clone(), thresholds);
    }

    pub fn thresholds(&self, device_id: &DeviceId) -> Option<ThresholdSet> {
        self.devices.get(device_id).map(|set| set.clone())
    }

    pub fn band(&self, device_id: &DeviceId, parameter: &str) -> Option<Band> {
        self.devices.get(device_id)?.band(parameter)
    }

    /// Replace a single parameter's band, leaving the others alone.
    pub fn update_band(
        &self,
        device_id: &DeviceId,
        parameter: &str,
        min: f64,
        max: f64,
    ) -> Result<()> {
        if min > max {
            return Err(Error::InvalidBand {
                parameter: parameter.to_owned(),
                min,
                max,
            });
        }

        self.devices
            .entry(device_id.clone())
            .or_default()
            .set_band(parameter, Band::new(min, max));
        Ok(())
    }

    /// Fails open: a device or parameter without a band is `Normal`.
    pub fn classify(&self, device_id: &DeviceId, parameter: &str, value: f64) -> ThresholdStatus {
        self.band(device_id, parameter)
            .map_or(ThresholdStatus::Normal, |band| band.classify(value))
    }

    pub fn has_thresholds(&self, device_id: &DeviceId) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn reset(&self, device_id: &DeviceId) {
        self.devices.remove(device_id);
    }

    pub fn clear_all(&self) {
        self.devices.clear();
    }
}

impl Default for ThresholdManager {
    fn default() -> Self {
        Self::new()
    }
}

fn default_thresholds() -> HashMap<DeviceKind, ThresholdSet> {
    HashMap::from([
        (
            DeviceKind::TemperatureSensor,
            ThresholdSet::new().with_band("temperature", -5.0, 40.0),
        ),
        (
            DeviceKind::HumiditySensor,
            ThresholdSet::new().with_band("humidity", 30.0, 80.0),
        ),
        (
            DeviceKind::WaterSensor,
            ThresholdSet::new().with_band("water_level", 0.0, 100.0),
        ),
        (
            DeviceKind::ElectricitySensor,
            ThresholdSet::new()
                .with_band("power", 0.0, 3500.0)
                .with_band("voltage", 210.0, 240.0),
        ),
        (
            DeviceKind::AirSensor,
            ThresholdSet::new()
                .with_band("air_quality", 0.0, 150.0)
                .with_band("co2", 400.0, 1500.0)
                .with_band("gas", 0.0, 10.0),
        ),
    ])
}
