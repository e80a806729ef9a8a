//! Engine configuration.

use crate::batch::DEFAULT_AVERAGE_DECIMALS;
use crate::ensemble::EnsembleWeights;
use crate::error::{Result, YieldError};
use crate::history::HistoryColumns;
use crate::validation::RangePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "COCO_YIELD_";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Registry id of the soil-group estimator
    pub soil_estimator: String,
    /// Registry id of the weather-group estimator
    pub weather_estimator: String,
    /// Ensemble weights
    pub weights: EnsembleWeights,
    /// Reject out-of-range physical values instead of warning
    pub strict_ranges: bool,
    /// History file column names
    pub history: HistoryColumns,
    /// Decimal places of the yearly average
    pub average_decimals: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            soil_estimator: "soil".to_string(),
            weather_estimator: "weather".to_string(),
            weights: EnsembleWeights::default(),
            strict_ranges: false,
            history: HistoryColumns::default(),
            average_decimals: DEFAULT_AVERAGE_DECIMALS,
        }
    }
}

impl EngineConfig {
    /// Load a JSON configuration file; absent keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| YieldError::Io(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        info!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    /// Defaults overlaid with `COCO_YIELD_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, keyed by full environment variable name.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            lookup(&key).map(|value| {
                debug!(key = %key, "configuration override");
                (key, value)
            })
        };

        if let Some((_, v)) = var("SOIL_ESTIMATOR") {
            self.soil_estimator = v;
        }
        if let Some((_, v)) = var("WEATHER_ESTIMATOR") {
            self.weather_estimator = v;
        }
        if let Some((key, v)) = var("SOIL_WEIGHT") {
            self.weights.soil = parse_value(&key, &v)?;
        }
        if let Some((key, v)) = var("WEATHER_WEIGHT") {
            self.weights.weather = parse_value(&key, &v)?;
        }
        if let Some((_, v)) = var("STRICT_RANGES") {
            self.strict_ranges = RangePolicy::from_str(&v)? == RangePolicy::Strict;
        }
        if let Some((_, v)) = var("DATE_COLUMN") {
            self.history.date_column = v;
        }
        if let Some((_, v)) = var("YIELD_COLUMN") {
            self.history.yield_column = v;
        }

        self.validate()?;
        Ok(self)
    }

    /// Check weights and estimator ids.
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;

        for (param, id) in [
            ("soil_estimator", &self.soil_estimator),
            ("weather_estimator", &self.weather_estimator),
        ] {
            if id.trim().is_empty() {
                return Err(YieldError::InvalidParameter {
                    param: param.to_string(),
                    value: id.clone(),
                    reason: "estimator id must not be empty".to_string(),
                });
            }
        }
        if self.soil_estimator == self.weather_estimator {
            return Err(YieldError::InvalidParameter {
                param: "weather_estimator".to_string(),
                value: self.weather_estimator.clone(),
                reason: "soil and weather estimators must differ".to_string(),
            });
        }
        for (param, column) in [
            ("history.date_column", &self.history.date_column),
            ("history.yield_column", &self.history.yield_column),
        ] {
            if column.trim().is_empty() {
                return Err(YieldError::InvalidParameter {
                    param: param.to_string(),
                    value: column.clone(),
                    reason: "column name must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn range_policy(&self) -> RangePolicy {
        if self.strict_ranges {
            RangePolicy::Strict
        } else {
            RangePolicy::Lenient
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| YieldError::InvalidParameter {
        param: key.to_string(),
        value: value.to_string(),
        reason: "could not parse value".to_string(),
    })
}
