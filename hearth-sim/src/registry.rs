use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use hearth_core::{Device, DeviceId, ParamValue};

use crate::error::{Error, Result};

/// The device catalog the simulator consults for identity, type, on/off
/// state and user-facing settings. It lives outside the telemetry core.
pub trait DeviceRegistry: Send + Sync + 'static {
    fn get(&self, id: &DeviceId) -> Option<Device>;
    fn list(&self) -> Vec<Device>;
    fn set_power(&self, id: &DeviceId, on: bool) -> Result<()>;
    fn set_parameter(&self, id: &DeviceId, name: &str, value: ParamValue) -> Result<()>;
}

/// Registry kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryDeviceRegistry {
    devices: RwLock<HashMap<DeviceId, Device>>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, device: Device) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        devices.insert(device.id.clone(), device);
    }

    pub fn remove(&self, id: &DeviceId) -> Option<Device> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        devices.remove(id)
    }

    fn update(&self, id: &DeviceId, f: impl FnOnce(&mut Device)) -> Result<()> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let device = devices
            .get_mut(id)
            .ok_or_else(|| Error::UnknownDevice(id.clone()))?;
        f(device);
        Ok(())
    }
}

impl FromIterator<Device> for InMemoryDeviceRegistry {
    fn from_iter<I: IntoIterator<Item = Device>>(iter: I) -> Self {
        let devices = iter
            .into_iter()
            .map(|device| (device.id.clone(), device))
            .collect();
        Self {
            devices: RwLock::new(devices),
        }
    }
}

impl DeviceRegistry for InMemoryDeviceRegistry {
    fn get(&self, id: &DeviceId) -> Option<Device> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.get(id).cloned()
    }

    fn list(&self) -> Vec<Device> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<Device> = devices.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    fn set_power(&self, id: &DeviceId, on: bool) -> Result<()> {
        self.update(id, |device| device.on = on)
    }

    fn set_parameter(&self, id: &DeviceId, name: &str, value: ParamValue) -> Result<()> {
        self.update(id, |device| {
            device.parameters.insert(name.to_owned(), value);
        })
    }
}

#[cfg(test)]
mod tests {
    use hearth_core::DeviceKind;

    use super::*;

    #[test]
    fn register_and_get() {
        let registry = InMemoryDeviceRegistry::new();
        registry.insert(Device::new("1", DeviceKind::Light));

        let fetched = registry.get(&"1".into()).expect("device should exist");
        assert_eq!(fetched.kind, DeviceKind::Light);
        assert!(registry.get(&"2".into()).is_none());
    }

    #[test]
    fn power_and_parameters_update_in_place() {
        let registry: InMemoryDeviceRegistry = [Device::new("ac", DeviceKind::ClimateControl)]
            .into_iter()
            .collect();
        let id = DeviceId::from("ac");

        registry.set_power(&id, true).unwrap();
        registry.set_parameter(&id, "mode", "heat".into()).unwrap();

        let device = registry.get(&id).unwrap();
        assert!(device.on);
        assert_eq!(device.parameter("mode"), Some(&ParamValue::from("heat")));
    }

    #[test]
    fn updating_unknown_device_fails() {
        let registry = InMemoryDeviceRegistry::new();
        let err = registry.set_power(&"ghost".into(), true).unwrap_err();
        assert!(matches!(err, Error::UnknownDevice(id) if id.as_str() == "ghost"));
    }

    #[test]
    fn list_is_sorted_by_id() {
        let registry: InMemoryDeviceRegistry = [
            Device::new("b", DeviceKind::WaterSensor),
            Device::new("a", DeviceKind::AirSensor),
        ]
        .into_iter()
        .collect();

        let ids: Vec<_> = registry.list().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![DeviceId::from("a"), DeviceId::from("b")]);
    }
}
