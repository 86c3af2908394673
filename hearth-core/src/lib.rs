use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

mod telemetry;
mod threshold;

pub use telemetry::{Quantity, TelemetryState};
pub use threshold::{Band, ThresholdSet, ThresholdStatus, WARNING_MARGIN};

// Identifiers and units rarely change after creation, so they are kept as
// `Box<str>` to avoid carrying spare capacity around in every record.
type BoxStr = Box<str>;

/// Identifier of a device as assigned by the device registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub BoxStr);

impl DeviceId {
    pub fn new(id: impl Into<BoxStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value.into_boxed_str())
    }
}

/// Unique identifier for a dispatched alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub Ulid);

/// Device classification as reported by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    TemperatureSensor,
    HumiditySensor,
    WaterSensor,
    ElectricitySensor,
    AirSensor,
    Light,
    /// Air conditioner / climate-control unit.
    #[serde(rename = "ac", alias = "climate")]
    ClimateControl,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 7] = [
        DeviceKind::TemperatureSensor,
        DeviceKind::HumiditySensor,
        DeviceKind::WaterSensor,
        DeviceKind::ElectricitySensor,
        DeviceKind::AirSensor,
        DeviceKind::Light,
        DeviceKind::ClimateControl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::TemperatureSensor => "temperature_sensor",
            DeviceKind::HumiditySensor => "humidity_sensor",
            DeviceKind::WaterSensor => "water_sensor",
            DeviceKind::ElectricitySensor => "electricity_sensor",
            DeviceKind::AirSensor => "air_sensor",
            DeviceKind::Light => "light",
            DeviceKind::ClimateControl => "ac",
        }
    }

    /// Name of the parameter whose reading is forwarded through the
    /// processing pipeline on every tick.
    pub fn primary_parameter(self) -> &'static str {
        match self {
            DeviceKind::TemperatureSensor => "temperature",
            DeviceKind::HumiditySensor => "humidity",
            DeviceKind::WaterSensor => "water_level",
            DeviceKind::ElectricitySensor => "power",
            DeviceKind::AirSensor => "air_quality",
            DeviceKind::Light | DeviceKind::ClimateControl => "power",
        }
    }

    /// Unit of the processed primary reading.
    pub fn unit(self) -> &'static str {
        match self {
            DeviceKind::TemperatureSensor => "°C",
            DeviceKind::HumiditySensor => "%",
            DeviceKind::WaterSensor => "cm",
            DeviceKind::ElectricitySensor => "W",
            DeviceKind::AirSensor => "AQI",
            DeviceKind::Light | DeviceKind::ClimateControl => "W",
        }
    }

    /// Actuators only produce meaningful telemetry while switched on.
    pub fn is_actuator(self) -> bool {
        matches!(self, DeviceKind::Light | DeviceKind::ClimateControl)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device kind: {0}")]
pub struct ParseDeviceKindError(pub String);

impl FromStr for DeviceKind {
    type Err = ParseDeviceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "climate" => Ok(DeviceKind::ClimateControl),
            other => DeviceKind::ALL
                .into_iter()
                .find(|kind| kind.as_str() == other)
                .ok_or_else(|| ParseDeviceKindError(other.to_owned())),
        }
    }
}

/// Value of an open-ended device or telemetry parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// A device as known to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable identity of this device.
    pub id: DeviceId,
    /// Type of the device.
    pub kind: DeviceKind,
    /// Whether the device is switched on.
    pub on: bool,
    /// User-facing settings such as brightness or target temperature.
    pub parameters: BTreeMap<String, ParamValue>,
}

impl Device {
    /// Create a switched-off device carrying the default settings of its kind.
    pub fn new(id: impl Into<DeviceId>, kind: DeviceKind) -> Self {
        let mut parameters = BTreeMap::new();
        let mut put = |name: &str, value: ParamValue| {
            parameters.insert(name.to_owned(), value);
        };

        match kind {
            DeviceKind::Light => {
                put("brightness", 70.0.into());
                put("color_temp", 4000.0.into());
            }
            DeviceKind::ClimateControl => {
                put("temperature", 22.0.into());
                put("mode", "cool".into());
                put("fan_speed", 2.0.into());
            }
            DeviceKind::TemperatureSensor => {
                put("current_temp", 23.5.into());
                put("humidity", 45.0.into());
                put("battery", 85.0.into());
            }
            DeviceKind::HumiditySensor => {
                put("humidity", 45.0.into());
                put("temperature", 23.5.into());
                put("battery", 90.0.into());
            }
            DeviceKind::WaterSensor | DeviceKind::ElectricitySensor | DeviceKind::AirSensor => {}
        }

        Self {
            id: id.into(),
            kind,
            on: false,
            parameters,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }
}

/// The latest processed sample for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedReading {
    /// Value as received by the processor.
    pub raw_value: f64,
    /// Value after the static per-type calibration formula.
    pub processed_value: f64,
    /// Exponential moving average of raw samples.
    pub average: f64,
    /// Running minimum; zero means unset.
    pub min: f64,
    /// Running maximum; zero means unset.
    pub max: f64,
    pub unit: BoxStr,
    pub valid: bool,
    /// Type-specific derived metrics such as dew point or PM2.5.
    pub metrics: BTreeMap<String, f64>,
    pub updated_at: jiff::Timestamp,
}

/// Learned linear correction for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub offset: f64,
    pub multiplier: f64,
    pub reference_value: f64,
    /// Time of the last converged calibration, if any.
    pub last_calibrated_at: Option<jiff::Timestamp>,
    pub calibration_count: u32,
    pub calibrated: bool,
    /// Type-specific auxiliary coefficients.
    pub coefficients: BTreeMap<String, f64>,
}

impl Default for CalibrationRecord {
    fn default() -> Self {
        Self {
            offset: 0.0,
            multiplier: 1.0,
            reference_value: 0.0,
            last_calibrated_at: None,
            calibration_count: 0,
            calibrated: false,
            coefficients: BTreeMap::new(),
        }
    }
}

/// Calibration limits for one sensor type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub min_value: f64,
    pub max_value: f64,
    pub accuracy: f64,
    #[serde(default = "default_required_samples")]
    pub required_samples: usize,
    #[serde(
        rename = "calibration_interval_secs",
        with = "duration_secs",
        default = "default_calibration_interval"
    )]
    pub calibration_interval: Duration,
    pub unit: BoxStr,
}

pub const DEFAULT_REQUIRED_SAMPLES: usize = 10;
pub const DEFAULT_CALIBRATION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

fn default_required_samples() -> usize {
    DEFAULT_REQUIRED_SAMPLES
}

fn default_calibration_interval() -> Duration {
    DEFAULT_CALIBRATION_INTERVAL
}

impl CalibrationConfig {
    pub fn new(min_value: f64, max_value: f64, accuracy: f64, unit: &str) -> Self {
        Self {
            min_value,
            max_value,
            accuracy,
            required_samples: DEFAULT_REQUIRED_SAMPLES,
            calibration_interval: DEFAULT_CALIBRATION_INTERVAL,
            unit: unit.into(),
        }
    }
}

/// Severity attached to an alert record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl From<ThresholdStatus> for AlertLevel {
    fn from(status: ThresholdStatus) -> Self {
        match status {
            ThresholdStatus::Normal => AlertLevel::Info,
            ThresholdStatus::Warning => AlertLevel::Warning,
            ThresholdStatus::Critical => AlertLevel::Critical,
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertLevel::Info => "INFO",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// An alert that passed the cooldown policy and was dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: AlertId,
    pub device_id: DeviceId,
    pub parameter: BoxStr,
    pub value: f64,
    pub unit: BoxStr,
    pub level: AlertLevel,
    pub timestamp: jiff::Timestamp,
}

/// Notification priority, mirroring the platform notification channel levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Min,
    Low,
    Default,
    High,
    Max,
}

/// Per-parameter warning/critical levels configured by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThreshold {
    pub warning_level: f64,
    pub critical_level: f64,
    pub unit: BoxStr,
    pub enabled: bool,
}

impl AlertThreshold {
    pub fn new(warning_level: f64, critical_level: f64, unit: &str) -> Self {
        Self {
            warning_level,
            critical_level,
            unit: unit.into(),
            enabled: true,
        }
    }
}

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Per-device notification preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub priority: Priority,
    /// Minimum time between two non-critical alerts.
    #[serde(rename = "cooldown_ms", with = "duration_millis")]
    pub cooldown: Duration,
    pub vibration: bool,
    pub sound: bool,
    pub recipients: Vec<String>,
    pub thresholds: BTreeMap<String, AlertThreshold>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: Priority::High,
            cooldown: DEFAULT_COOLDOWN,
            vibration: true,
            sound: true,
            recipients: Vec::new(),
            thresholds: BTreeMap::new(),
        }
    }
}

/// Payload handed to the platform notification sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Opaque id, incremented for every dispatched alert.
    pub id: u32,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub vibration: bool,
    pub sound: bool,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
