use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ParamValue;

/// Fixed physical quantities tracked for every simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Temperature,
    Humidity,
    WaterLevel,
    Power,
    Voltage,
    Current,
    Pressure,
    Co2,
    Gas,
    LightLevel,
    Noise,
    UvIndex,
    WindSpeed,
    RainIntensity,
    SignalStrength,
}

impl Quantity {
    pub const ALL: [Quantity; 15] = [
        Quantity::Temperature,
        Quantity::Humidity,
        Quantity::WaterLevel,
        Quantity::Power,
        Quantity::Voltage,
        Quantity::Current,
        Quantity::Pressure,
        Quantity::Co2,
        Quantity::Gas,
        Quantity::LightLevel,
        Quantity::Noise,
        Quantity::UvIndex,
        Quantity::WindSpeed,
        Quantity::RainIntensity,
        Quantity::SignalStrength,
    ];

    /// Parameter name used by threshold sets and alert records.
    pub fn name(self) -> &'static str {
        match self {
            Quantity::Temperature => "temperature",
            Quantity::Humidity => "humidity",
            Quantity::WaterLevel => "water_level",
            Quantity::Power => "power",
            Quantity::Voltage => "voltage",
            Quantity::Current => "current",
            Quantity::Pressure => "pressure",
            Quantity::Co2 => "co2",
            Quantity::Gas => "gas",
            Quantity::LightLevel => "light_level",
            Quantity::Noise => "noise",
            Quantity::UvIndex => "uv_index",
            Quantity::WindSpeed => "wind_speed",
            Quantity::RainIntensity => "rain_intensity",
            Quantity::SignalStrength => "signal_strength",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.name() == name)
    }

    pub fn unit(self) -> &'static str {
        match self {
            Quantity::Temperature => "°C",
            Quantity::Humidity | Quantity::SignalStrength => "%",
            Quantity::WaterLevel => "cm",
            Quantity::Power => "W",
            Quantity::Voltage => "V",
            Quantity::Current => "A",
            Quantity::Pressure => "hPa",
            Quantity::Co2 | Quantity::Gas => "ppm",
            Quantity::LightLevel => "lx",
            Quantity::Noise => "dB",
            Quantity::UvIndex => "",
            Quantity::WindSpeed => "m/s",
            Quantity::RainIntensity => "mm/h",
        }
    }

    /// Physically plausible `[min, max]` range. Every mutation is clamped to it.
    pub fn range(self) -> (f64, f64) {
        match self {
            Quantity::Temperature => (-40.0, 85.0),
            Quantity::Humidity => (0.0, 100.0),
            Quantity::WaterLevel => (0.0, 100.0),
            Quantity::Power => (0.0, 5000.0),
            Quantity::Voltage => (180.0, 260.0),
            Quantity::Current => (0.0, 25.0),
            Quantity::Pressure => (950.0, 1050.0),
            Quantity::Co2 => (350.0, 5000.0),
            Quantity::Gas => (0.0, 100.0),
            Quantity::LightLevel => (0.0, 100_000.0),
            Quantity::Noise => (20.0, 130.0),
            Quantity::UvIndex => (0.0, 11.0),
            Quantity::WindSpeed => (0.0, 60.0),
            Quantity::RainIntensity => (0.0, 100.0),
            Quantity::SignalStrength => (0.0, 100.0),
        }
    }

    /// Half-width of the symmetric random step applied on every tick.
    pub fn max_step(self) -> f64 {
        match self {
            Quantity::Temperature => 0.25,
            Quantity::Humidity => 1.0,
            Quantity::WaterLevel => 0.5,
            Quantity::Power => 25.0,
            Quantity::Voltage => 1.0,
            Quantity::Current => 0.25,
            Quantity::Pressure => 0.5,
            Quantity::Co2 => 10.0,
            Quantity::Gas => 0.2,
            Quantity::LightLevel => 50.0,
            Quantity::Noise => 1.0,
            Quantity::UvIndex => 0.1,
            Quantity::WindSpeed => 0.5,
            Quantity::RainIntensity => 0.5,
            Quantity::SignalStrength => 2.5,
        }
    }

    /// Resting value used before a device is seeded.
    pub fn baseline(self) -> f64 {
        match self {
            Quantity::Temperature => 20.0,
            Quantity::Humidity => 50.0,
            Quantity::WaterLevel => 50.0,
            Quantity::Power => 0.0,
            Quantity::Voltage => 220.0,
            Quantity::Current => 0.0,
            Quantity::Pressure => 1013.25,
            Quantity::Co2 => 400.0,
            Quantity::Gas => 0.0,
            Quantity::LightLevel => 300.0,
            Quantity::Noise => 40.0,
            Quantity::UvIndex => 0.0,
            Quantity::WindSpeed => 0.0,
            Quantity::RainIntensity => 0.0,
            Quantity::SignalStrength => 100.0,
        }
    }

    /// Clamp `value` into this quantity's plausible range. NaN maps to the lower bound.
    pub fn clamp(self, value: f64) -> f64 {
        let (min, max) = self.range();
        if value.is_nan() {
            return min;
        }
        value.clamp(min, max)
    }
}

/// The current synthetic reading set for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryState {
    pub temperature: f64,
    pub humidity: f64,
    pub water_level: f64,
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
    pub pressure: f64,
    pub co2: f64,
    pub gas: f64,
    pub light_level: f64,
    pub noise: f64,
    pub uv_index: f64,
    pub wind_speed: f64,
    pub rain_intensity: f64,
    /// Link quality, 0–100.
    pub signal_strength: f64,
    pub connected: bool,
    pub last_update: jiff::Timestamp,
    /// Derived and device-specific parameters.
    pub params: BTreeMap<String, ParamValue>,
}

impl TelemetryState {
    /// A connected state with every quantity at its baseline.
    pub fn new(now: jiff::Timestamp) -> Self {
        Self {
            temperature: Quantity::Temperature.baseline(),
            humidity: Quantity::Humidity.baseline(),
            water_level: Quantity::WaterLevel.baseline(),
            power: Quantity::Power.baseline(),
            voltage: Quantity::Voltage.baseline(),
            current: Quantity::Current.baseline(),
            pressure: Quantity::Pressure.baseline(),
            co2: Quantity::Co2.baseline(),
            gas: Quantity::Gas.baseline(),
            light_level: Quantity::LightLevel.baseline(),
            noise: Quantity::Noise.baseline(),
            uv_index: Quantity::UvIndex.baseline(),
            wind_speed: Quantity::WindSpeed.baseline(),
            rain_intensity: Quantity::RainIntensity.baseline(),
            signal_strength: Quantity::SignalStrength.baseline(),
            connected: true,
            last_update: now,
            params: BTreeMap::new(),
        }
    }

    pub fn get(&self, quantity: Quantity) -> f64 {
        match quantity {
            Quantity::Temperature => self.temperature,
            Quantity::Humidity => self.humidity,
            Quantity::WaterLevel => self.water_level,
            Quantity::Power => self.power,
            Quantity::Voltage => self.voltage,
            Quantity::Current => self.current,
            Quantity::Pressure => self.pressure,
            Quantity::Co2 => self.co2,
            Quantity::Gas => self.gas,
            Quantity::LightLevel => self.light_level,
            Quantity::Noise => self.noise,
            Quantity::UvIndex => self.uv_index,
            Quantity::WindSpeed => self.wind_speed,
            Quantity::RainIntensity => self.rain_intensity,
            Quantity::SignalStrength => self.signal_strength,
        }
    }

    /// Store `value`, clamped to the quantity's plausible range.
    pub fn set(&mut self, quantity: Quantity, value: f64) {
        let value = quantity.clamp(value);
        let slot = match quantity {
            Quantity::Temperature => &mut self.temperature,
            Quantity::Humidity => &mut self.humidity,
            Quantity::WaterLevel => &mut self.water_level,
            Quantity::Power => &mut self.power,
            Quantity::Voltage => &mut self.voltage,
            Quantity::Current => &mut self.current,
            Quantity::Pressure => &mut self.pressure,
            Quantity::Co2 => &mut self.co2,
            Quantity::Gas => &mut self.gas,
            Quantity::LightLevel => &mut self.light_level,
            Quantity::Noise => &mut self.noise,
            Quantity::UvIndex => &mut self.uv_index,
            Quantity::WindSpeed => &mut self.wind_speed,
            Quantity::RainIntensity => &mut self.rain_intensity,
            Quantity::SignalStrength => &mut self.signal_strength,
        };
        *slot = value;
    }

    /// Look up a reading by parameter name: fixed quantities first, then
    /// numeric entries of the parameter map.
    pub fn value_of(&self, parameter: &str) -> Option<f64> {
        match Quantity::from_name(parameter) {
            Some(quantity) => Some(self.get(quantity)),
            None => self.number(parameter),
        }
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.params.get(name).and_then(ParamValue::as_f64)
    }

    pub fn set_param(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.params.insert(name.to_owned(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clamps_to_plausible_range() {
        let mut state = TelemetryState::new(jiff::Timestamp::UNIX_EPOCH);

        state.set(Quantity::SignalStrength, 140.0);
        assert_eq!(state.signal_strength, 100.0);

        state.set(Quantity::Humidity, -3.0);
        assert_eq!(state.humidity, 0.0);

        state.set(Quantity::Voltage, f64::NAN);
        assert_eq!(state.voltage, 180.0);
    }

    #[test]
    fn quantity_names_round_trip() {
        for quantity in Quantity::ALL {
            assert_eq!(Quantity::from_name(quantity.name()), Some(quantity));
        }
        assert_eq!(Quantity::from_name("dew_point"), None);
    }

    #[test]
    fn value_of_falls_back_to_numeric_params() {
        let mut state = TelemetryState::new(jiff::Timestamp::UNIX_EPOCH);
        state.set_param("dew_point", 4.5);
        state.set_param("mode", "cool");

        assert_eq!(state.value_of("co2"), Some(400.0));
        assert_eq!(state.value_of("dew_point"), Some(4.5));
        assert_eq!(state.value_of("mode"), None);
        assert_eq!(state.value_of("missing"), None);
    }

    #[test]
    fn baselines_sit_inside_ranges() {
        for quantity in Quantity::ALL {
            let (min, max) = quantity.range();
            let baseline = quantity.baseline();
            assert!(baseline >= min && baseline <= max, "{quantity:?}");
        }
    }
}
