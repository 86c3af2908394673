//! Seeding, random walk and derived parameters of simulated telemetry.

use hearth_core::{Device, DeviceKind, Quantity, TelemetryState};
use jiff::Timestamp;
use rand::Rng;

use crate::physics;

/// Luminous efficacy of the simulated LED lamps, lm/W.
const LUMENS_PER_WATT: f64 = 80.0;
const FILTER_WEAR_PER_TICK: f64 = 0.01;

/// A fresh state with type-appropriate starting values.
pub fn seed<R: Rng + ?Sized>(
    kind: DeviceKind,
    device: Option<&Device>,
    now: Timestamp,
    rng: &mut R,
) -> TelemetryState {
    let mut state = TelemetryState::new(now);
    state.set(Quantity::SignalStrength, rng.random_range(60.0..=100.0));

    match kind {
        DeviceKind::TemperatureSensor => {
            state.set(Quantity::Temperature, rng.random_range(2.0..=8.0));
            state.set(Quantity::Humidity, rng.random_range(40.0..=70.0));
        }
        DeviceKind::HumiditySensor => {
            state.set(Quantity::Humidity, rng.random_range(65.0..=85.0));
            state.set(Quantity::Temperature, rng.random_range(18.0..=26.0));
        }
        DeviceKind::WaterSensor => {
            state.set(Quantity::WaterLevel, rng.random_range(70.0..=100.0));
        }
        DeviceKind::ElectricitySensor => {
            let power = rng.random_range(400.0..=600.0);
            let current = power / rng.random_range(215.0..=225.0);
            state.set(Quantity::Power, power);
            state.set(Quantity::Current, current);
            state.set(Quantity::Voltage, power / current);
        }
        DeviceKind::AirSensor => {
            state.set(Quantity::Co2, rng.random_range(400.0..=800.0));
            state.set(Quantity::Gas, rng.random_range(0.0..=5.0));
        }
        DeviceKind::Light => {}
        DeviceKind::ClimateControl => {
            state.set(Quantity::Temperature, rng.random_range(22.0..=28.0));
        }
    }

    derive(kind, &mut state, device, 0.0, rng);
    state
}

/// Move every quantity by a bounded symmetric random step. Values are
/// clamped to their plausible range.
pub fn perturb<R: Rng + ?Sized>(state: &mut TelemetryState, rng: &mut R) {
    for quantity in Quantity::ALL {
        let step = quantity.max_step();
        let delta = rng.random_range(-step..=step);
        state.set(quantity, state.get(quantity) + delta);
    }
}

/// Recompute the parameters that depend on the kind of device. `elapsed_secs`
/// is the time covered by this update and drives accumulated totals.
pub fn derive<R: Rng + ?Sized>(
    kind: DeviceKind,
    state: &mut TelemetryState,
    device: Option<&Device>,
    elapsed_secs: f64,
    rng: &mut R,
) {
    let on = device.is_some_and(|device| device.on);

    match kind {
        DeviceKind::TemperatureSensor => {
            let (t, h) = (state.temperature, state.humidity);
            state.set_param("dew_point", physics::dew_point(t, h));
            state.set_param("heat_index", physics::heat_index(t, h));
        }
        DeviceKind::HumiditySensor => {
            let (t, h) = (state.temperature, state.humidity);
            state.set_param("absolute_humidity", physics::absolute_humidity(t, h));
            state.set_param("vapor_pressure", physics::vapor_pressure(t, h));
        }
        DeviceKind::WaterSensor => {
            let level = state.water_level;
            state.set_param("flow_rate", physics::flow_rate(level));
            state.set_param("water_pressure", physics::water_pressure(level));
            drift(state, rng, "turbidity", Walk::new(1.0, 0.1, 0.0, 10.0));
            drift(state, rng, "tds", Walk::new(150.0, 5.0, 50.0, 500.0));
        }
        DeviceKind::ElectricitySensor => {
            let energy = state.number("energy_kwh").unwrap_or(0.0);
            state.set_param("energy_kwh", energy + state.power * elapsed_secs / 3_600_000.0);
            drift(state, rng, "frequency", Walk::new(50.0, 0.02, 49.8, 50.2));
            drift(state, rng, "power_factor", Walk::new(0.95, 0.01, 0.8, 1.0));
        }
        DeviceKind::AirSensor => {
            let pm2_5 = drift(state, rng, "pm2_5", Walk::new(12.0, 2.0, 0.0, 250.0));
            let pm10 = drift(state, rng, "pm10", Walk::new(20.0, 3.0, 0.0, 400.0));
            state.set_param("pm1", pm2_5 * 0.6);
            drift(state, rng, "voc", Walk::new(100.0, 5.0, 0.0, 1000.0));
            drift(state, rng, "ozone", Walk::new(30.0, 1.0, 0.0, 200.0));

            let aqi = 0.3 * pm2_5 + 0.2 * pm10 + 0.1 * (state.co2 - 400.0);
            state.set_param("air_quality", aqi.max(0.0));
        }
        DeviceKind::Light => {
            if on {
                state.set(Quantity::Power, rng.random_range(40.0..=60.0));
                drift(state, rng, "color_temp", Walk::new(4000.0, 50.0, 2700.0, 6500.0));
                state.set_param("lumens", state.power * LUMENS_PER_WATT);
                let brightness = device
                    .and_then(|d| d.parameter("brightness"))
                    .and_then(|v| v.as_f64());
                if let Some(brightness) = brightness {
                    let noise = rng.random_range(-2.5..=2.5);
                    state.set_param("real_brightness", (brightness + noise).clamp(0.0, 100.0));
                }
            } else {
                state.set(Quantity::Power, 0.0);
                state.set_param("lumens", 0.0);
            }
        }
        DeviceKind::ClimateControl => {
            if on {
                climate(state, device, rng);
            } else {
                state.set(Quantity::Power, 0.0);
            }
        }
    }
}

fn climate<R: Rng + ?Sized>(state: &mut TelemetryState, device: Option<&Device>, rng: &mut R) {
    let target = device
        .and_then(|d| d.parameter("temperature"))
        .and_then(|v| v.as_f64())
        .unwrap_or(22.0);
    let mode = device
        .and_then(|d| d.parameter("mode"))
        .and_then(|v| v.as_str())
        .unwrap_or("cool");

    let step = rng.random_range(0.2..=0.5);
    let room = state.temperature;
    let room = match mode {
        "cool" if room > target => (room - step).max(target),
        "heat" if room < target => (room + step).min(target),
        _ => room,
    };
    state.set(Quantity::Temperature, room);
    state.set(Quantity::Power, rng.random_range(800.0..=1200.0));

    let fan_speed = device
        .and_then(|d| d.parameter("fan_speed"))
        .and_then(|v| v.as_f64())
        .unwrap_or(2.0);
    drift(state, rng, "fan_speed", Walk::new(fan_speed, 0.2, 1.0, 5.0));

    let wear = (state.number("filter_wear").unwrap_or(0.0) + FILTER_WEAR_PER_TICK).min(100.0);
    state.set_param("filter_wear", wear);
    drift(state, rng, "compressor_temperature", Walk::new(55.0, 1.0, 40.0, 90.0));

    let efficiency = 100.0 - wear * 0.5 - (state.temperature - target).abs() * 2.0;
    state.set_param("efficiency", efficiency.clamp(0.0, 100.0));
}

/// Bounded random walk of a numeric parameter.
#[derive(Debug, Clone, Copy)]
struct Walk {
    initial: f64,
    step: f64,
    min: f64,
    max: f64,
}

impl Walk {
    const fn new(initial: f64, step: f64, min: f64, max: f64) -> Self {
        Self { initial, step, min, max }
    }
}

fn drift<R: Rng + ?Sized>(state: &mut TelemetryState, rng: &mut R, name: &str, walk: Walk) -> f64 {
    let current = state.number(name).unwrap_or(walk.initial);
    let next = (current + rng.random_range(-walk.step..=walk.step)).clamp(walk.min, walk.max);
    state.set_param(name, next);
    next
}

#[cfg(test)]
mod tests {
    use hearth_core::ParamValue;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn seeds_follow_device_kind() {
        let mut rng = rng();
        for _ in 0..50 {
            let state = seed(DeviceKind::TemperatureSensor, None, Timestamp::UNIX_EPOCH, &mut rng);
            assert!((2.0..=8.0).contains(&state.temperature));

            let state = seed(DeviceKind::HumiditySensor, None, Timestamp::UNIX_EPOCH, &mut rng);
            assert!((65.0..=85.0).contains(&state.humidity));

            let state = seed(DeviceKind::ElectricitySensor, None, Timestamp::UNIX_EPOCH, &mut rng);
            assert!((state.voltage - state.power / state.current).abs() < 1e-6);
        }
    }

    #[test]
    fn random_walk_never_leaves_plausible_ranges() {
        let mut rng = rng();
        let mut state = TelemetryState::new(Timestamp::UNIX_EPOCH);
        state.set(Quantity::SignalStrength, 100.0);
        state.set(Quantity::Humidity, 0.0);

        for _ in 0..5_000 {
            perturb(&mut state, &mut rng);
            for quantity in Quantity::ALL {
                let (min, max) = quantity.range();
                let value = state.get(quantity);
                assert!(value >= min && value <= max, "{quantity:?} = {value}");
            }
        }
    }

    #[test]
    fn air_quality_index_follows_particulates() {
        let mut rng = rng();
        let state = seed(DeviceKind::AirSensor, None, Timestamp::UNIX_EPOCH, &mut rng);

        let pm2_5 = state.number("pm2_5").unwrap();
        let pm10 = state.number("pm10").unwrap();
        let expected = (0.3 * pm2_5 + 0.2 * pm10 + 0.1 * (state.co2 - 400.0)).max(0.0);
        assert!((state.number("air_quality").unwrap() - expected).abs() < 1e-9);
        assert!((state.number("pm1").unwrap() - pm2_5 * 0.6).abs() < 1e-9);
    }

    #[test]
    fn energy_accumulates_over_elapsed_time() {
        let mut rng = rng();
        let mut state = TelemetryState::new(Timestamp::UNIX_EPOCH);
        state.set(Quantity::Power, 1000.0);

        derive(DeviceKind::ElectricitySensor, &mut state, None, 1800.0, &mut rng);
        derive(DeviceKind::ElectricitySensor, &mut state, None, 1800.0, &mut rng);

        assert!((state.number("energy_kwh").unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn lights_only_draw_power_when_on() {
        let mut rng = rng();
        let mut light = Device::new("lamp", DeviceKind::Light);
        let mut state = TelemetryState::new(Timestamp::UNIX_EPOCH);

        derive(DeviceKind::Light, &mut state, Some(&light), 2.0, &mut rng);
        assert_eq!(state.power, 0.0);

        light.on = true;
        for _ in 0..100 {
            derive(DeviceKind::Light, &mut state, Some(&light), 2.0, &mut rng);
            assert!((40.0..=60.0).contains(&state.power));
            let color_temp = state.number("color_temp").unwrap();
            assert!((2700.0..=6500.0).contains(&color_temp));
        }
        assert_eq!(state.number("lumens"), Some(state.power * LUMENS_PER_WATT));
    }

    #[test]
    fn climate_moves_room_towards_target() {
        let mut rng = rng();
        let mut ac = Device::new("ac", DeviceKind::ClimateControl);
        ac.on = true;
        ac.parameters.insert("temperature".to_owned(), ParamValue::Number(20.0));

        let mut state = TelemetryState::new(Timestamp::UNIX_EPOCH);
        state.set(Quantity::Temperature, 27.0);

        for _ in 0..40 {
            derive(DeviceKind::ClimateControl, &mut state, Some(&ac), 2.0, &mut rng);
        }
        assert_eq!(state.temperature, 20.0);
        assert!(state.number("filter_wear").unwrap() > 0.0);

        ac.parameters.insert("mode".to_owned(), ParamValue::from("heat"));
        ac.parameters.insert("temperature".to_owned(), ParamValue::Number(24.0));
        derive(DeviceKind::ClimateControl, &mut state, Some(&ac), 2.0, &mut rng);
        assert!(state.temperature > 20.0);
    }
}
