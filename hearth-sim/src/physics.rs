//! Psychrometric and hydraulic approximations shared by the simulator and the
//! data processor. Temperatures are in °C and relative humidity in percent.

const MAGNUS_A: f64 = 17.27;
const MAGNUS_B: f64 = 237.7;

/// Standard gravity, m/s².
const G: f64 = 9.81;

/// Magnus approximation of the dew point.
pub fn dew_point(temperature: f64, humidity: f64) -> f64 {
    // ln(0) is -inf, so a bone dry reading is nudged off zero.
    let humidity = humidity.clamp(0.01, 100.0);
    let alpha = (MAGNUS_A * temperature) / (MAGNUS_B + temperature) + (humidity / 100.0).ln();
    (MAGNUS_B * alpha) / (MAGNUS_A - alpha)
}

/// NWS Rothfusz regression with the coefficients converted to Celsius.
pub fn heat_index(temperature: f64, humidity: f64) -> f64 {
    let t = temperature;
    let h = humidity;

    -8.78469475556 + 1.61139411 * t + 2.33854883889 * h
        - 0.14611605 * t * h
        - 0.012308094 * t * t
        - 0.0164248277778 * h * h
        + 0.002211732 * t * t * h
        + 0.00072546 * t * h * h
        - 0.000003582 * t * t * h * h
}

/// Saturation vapour pressure in hPa.
pub fn saturation_vapor_pressure(temperature: f64) -> f64 {
    6.112 * ((17.67 * temperature) / (temperature + 243.5)).exp()
}

/// Actual vapour pressure in hPa.
pub fn vapor_pressure(temperature: f64, humidity: f64) -> f64 {
    humidity / 100.0 * saturation_vapor_pressure(temperature)
}

/// Absolute humidity in g/m³.
pub fn absolute_humidity(temperature: f64, humidity: f64) -> f64 {
    216.7 * vapor_pressure(temperature, humidity) / (273.15 + temperature)
}

/// Hydrostatic pressure in kPa of a water column `level` cm high.
pub fn water_pressure(level: f64) -> f64 {
    level * 0.098
}

/// Torricelli outflow speed for a column of `level`.
pub fn flow_rate(level: f64) -> f64 {
    (2.0 * G * level.max(0.0)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn dew_point_matches_reference_values() {
        assert!(close(dew_point(20.0, 50.0), 9.26, 0.05));
        assert!(close(dew_point(25.0, 100.0), 25.0, 1e-9));
        assert!(dew_point(10.0, 0.0).is_finite());
    }

    #[test]
    fn heat_index_tracks_temperature_in_hot_humid_air() {
        let hi = heat_index(32.0, 70.0);
        assert!(hi > 32.0, "{hi}");
    }

    #[test]
    fn absolute_humidity_at_room_conditions() {
        // Roughly 8.6 g/m³ at 20 °C and 50 %.
        assert!(close(absolute_humidity(20.0, 50.0), 8.6, 0.1));
    }

    #[test]
    fn flow_rate_ignores_negative_levels() {
        assert_eq!(flow_rate(-3.0), 0.0);
        assert!(close(flow_rate(5.0), 9.9045, 1e-3));
    }
}
