use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use hearth_core::{CalibrationConfig, DeviceKind, NotificationConfig};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Per-kind overrides of the built-in calibration limits.
    #[serde(default)]
    pub calibration: HashMap<DeviceKind, CalibrationConfig>,
    /// Devices registered at startup. An empty list simulates one device of
    /// every kind.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Milliseconds between ticks
    pub tick_interval_ms: u64,
    /// Chance per device and tick that connectivity flips
    pub disconnect_probability: f64,
    /// Seed for reproducible runs; entropy is used when absent
    pub seed: Option<u64>,
}

impl SimulatorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2000,
            disconnect_probability: 0.01,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address for the HTTP server to listen on
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8081)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Minimum seconds between non-critical alerts of one device
    pub cooldown_secs: u64,
    /// Alerts kept per device
    pub history_limit: usize,
    /// Buffered notifications before the sink starts dropping
    pub channel_capacity: usize,
}

impl NotificationsConfig {
    /// Per-device config installed when a device is registered.
    pub fn device_defaults(&self) -> NotificationConfig {
        NotificationConfig {
            cooldown: Duration::from_secs(self.cooldown_secs),
            ..Default::default()
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            history_limit: 100,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub kind: DeviceKind,
    /// Power state at registration. Defaults to on, like the implicit fleet,
    /// so lights and climate units produce telemetry unless `on = false`.
    #[serde(default = "default_on")]
    pub on: bool,
}

fn default_on() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Configured devices, or one switched-on device per kind.
    pub fn fleet(&self) -> Vec<DeviceConfig> {
        if !self.devices.is_empty() {
            return self.devices.clone();
        }

        DeviceKind::ALL
            .into_iter()
            .enumerate()
            .map(|(i, kind)| DeviceConfig {
                id: (i + 1).to_string(),
                kind,
                on: true,
            })
            .collect()
    }
}
