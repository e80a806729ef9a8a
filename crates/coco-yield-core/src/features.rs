//! Feature preparation for the base estimators.
//!
//! Every validated observation is split into one [`FeatureVector`] per
//! [`FeatureGroup`]. Feature order is fixed by [`SOIL_FEATURES`] and
//! [`WEATHER_FEATURES`], so an estimator sees the same layout on every call.

use crate::observation::{MonthlyObservation, PredictionDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::YieldError;

/// Soil group feature names, in vector order.
pub const SOIL_FEATURES: [&str; 5] = ["sm_10", "sm_20", "sm_30", "age", "soil_type"];

/// Weather group feature names, in vector order.
pub const WEATHER_FEATURES: [&str; 5] = [
    "temperature_c",
    "humidity_pct",
    "rainfall_mm",
    "rain_status",
    "weather_description",
];

/// Disjoint group of observation fields consumed by one base estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureGroup {
    Soil,
    Weather,
}

impl FeatureGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Soil => "soil",
            Self::Weather => "weather",
        }
    }

    /// Feature names of this group, in vector order.
    pub fn feature_names(&self) -> &'static [&'static str] {
        match self {
            Self::Soil => &SOIL_FEATURES,
            Self::Weather => &WEATHER_FEATURES,
        }
    }
}

impl fmt::Display for FeatureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureGroup {
    type Err = YieldError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "soil" => Ok(Self::Soil),
            "weather" => Ok(Self::Weather),
            _ => Err(YieldError::InvalidParameter {
                param: "group".to_string(),
                value: s.to_string(),
                reason: "expected 'soil' or 'weather'".to_string(),
            }),
        }
    }
}

/// A single feature value.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
}

impl FeatureValue {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => Some(*v),
            Self::Categorical(_) => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            Self::Numeric(_) => None,
            Self::Categorical(s) => Some(s),
        }
    }
}

/// Named feature values for one feature group.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    group: FeatureGroup,
    values: Vec<(&'static str, FeatureValue)>,
}

impl FeatureVector {
    pub fn group(&self) -> FeatureGroup {
        self.group
    }

    /// Look up a feature by name.
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|(n, _)| *n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FeatureValue)> {
        self.values.iter().map(|(n, v)| (*n, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Feature vectors for every group, plus the date they were prepared for.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFeatures {
    pub date: PredictionDate,
    pub soil: FeatureVector,
    pub weather: FeatureVector,
}

impl PreparedFeatures {
    /// Vector for `group`.
    pub fn for_group(&self, group: FeatureGroup) -> &FeatureVector {
        match group {
            FeatureGroup::Soil => &self.soil,
            FeatureGroup::Weather => &self.weather,
        }
    }
}

/// Build the per-group feature vectors for one observation.
pub fn prepare_features(obs: &MonthlyObservation, date: PredictionDate) -> PreparedFeatures {
    let soil = FeatureVector {
        group: FeatureGroup::Soil,
        values: vec![
            (SOIL_FEATURES[0], FeatureValue::Numeric(obs.soil_moisture_10)),
            (SOIL_FEATURES[1], FeatureValue::Numeric(obs.soil_moisture_20)),
            (SOIL_FEATURES[2], FeatureValue::Numeric(obs.soil_moisture_30)),
            (SOIL_FEATURES[3], FeatureValue::Numeric(obs.plant_age_years)),
            (
                SOIL_FEATURES[4],
                FeatureValue::Categorical(obs.soil_type.clone()),
            ),
        ],
    };

    let rain_status = if obs.rainfall_mm > 0.0 { 1.0 } else { 0.0 };
    let weather = FeatureVector {
        group: FeatureGroup::Weather,
        values: vec![
            (WEATHER_FEATURES[0], FeatureValue::Numeric(obs.temperature_c)),
            (WEATHER_FEATURES[1], FeatureValue::Numeric(obs.humidity_pct)),
            (WEATHER_FEATURES[2], FeatureValue::Numeric(obs.rainfall_mm)),
            (WEATHER_FEATURES[3], FeatureValue::Numeric(rain_status)),
            (
                WEATHER_FEATURES[4],
                FeatureValue::Categorical(obs.weather_description.clone()),
            ),
        ],
    };

    PreparedFeatures {
        date,
        soil,
        weather,
    }
}
