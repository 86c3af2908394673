use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Fraction of a band's width, measured inward from either bound, in which
/// a value is reported as a warning.
pub const WARNING_MARGIN: f64 = 0.1;

/// Classification of a value against a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThresholdStatus {
    Normal,
    Warning,
    Critical,
}

/// Acceptable `[min, max]` range of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn margin(&self) -> f64 {
        self.range() * WARNING_MARGIN
    }

    /// Critical outside the band, warning within the margin of either bound,
    /// normal otherwise.
    pub fn classify(&self, value: f64) -> ThresholdStatus {
        let margin = self.margin();

        if value < self.min || value > self.max {
            ThresholdStatus::Critical
        } else if value < self.min + margin || value > self.max - margin {
            ThresholdStatus::Warning
        } else {
            ThresholdStatus::Normal
        }
    }
}

/// Mapping of `{parameter}_min` / `{parameter}_max` keys to values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdSet(BTreeMap<String, f64>);

impl ThresholdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    /// The band for `parameter`, if both of its bounds are present.
    pub fn band(&self, parameter: &str) -> Option<Band> {
        let min = self.get(&format!("{parameter}_min"))?;
        let max = self.get(&format!("{parameter}_max"))?;
        Some(Band { min, max })
    }

    pub fn set_band(&mut self, parameter: &str, band: Band) {
        self.insert(format!("{parameter}_min"), band.min);
        self.insert(format!("{parameter}_max"), band.max);
    }

    /// Builder-style variant of [`ThresholdSet::set_band`].
    pub fn with_band(mut self, parameter: &str, min: f64, max: f64) -> Self {
        self.set_band(parameter, Band { min, max });
        self
    }

    /// Parameters that have both bounds configured.
    pub fn parameters(&self) -> impl Iterator<Item = &str> + '_ {
        self.0
            .keys()
            .filter_map(|key| key.strip_suffix("_min"))
            .filter(|parameter| self.0.contains_key(&format!("{parameter}_max")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(key, value)| (key.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for ThresholdSet {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
