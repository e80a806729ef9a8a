//! Seasonal factor table and its process-wide store.
//!
//! [`SeasonalFactors`] always holds exactly one factor per calendar month.
//! [`SeasonalFactorStore`] shares one table across concurrent readers and
//! replaces it as a whole: readers take an `Arc` snapshot and never observe a
//! half-written table.

use crate::error::{Result, YieldError};
use crate::history::HistoricalSeries;
use crate::seasonality::compute_seasonal_factors;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Number of calendar months in a factor table.
pub const MONTHS: usize = 12;

/// Factor applied when a month carries no seasonal information.
pub const NEUTRAL_FACTOR: f64 = 1.0;

/// Multiplicative seasonal index for every calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<u32, f64>", into = "BTreeMap<u32, f64>")]
pub struct SeasonalFactors {
    factors: [f64; MONTHS],
}

impl SeasonalFactors {
    /// Table with every month at [`NEUTRAL_FACTOR`].
    pub fn neutral() -> Self {
        Self {
            factors: [NEUTRAL_FACTOR; MONTHS],
        }
    }

    /// Build a table from January..December factors.
    pub fn from_array(factors: [f64; MONTHS]) -> Result<Self> {
        for (i, f) in factors.iter().enumerate() {
            if !f.is_finite() || *f < 0.0 {
                return Err(YieldError::InvalidParameter {
                    param: format!("seasonal_factor[{}]", i + 1),
                    value: f.to_string(),
                    reason: "must be finite and non-negative".to_string(),
                });
            }
        }
        Ok(Self { factors })
    }

    /// Factor for `month` (1-12).
    pub fn get(&self, month: u32) -> Result<f64> {
        if !(1..=MONTHS as u32).contains(&month) {
            return Err(YieldError::InvalidMonth {
                value: month.to_string(),
            });
        }
        Ok(self.factors[(month - 1) as usize])
    }

    pub fn as_array(&self) -> &[f64; MONTHS] {
        &self.factors
    }

    /// `(month, factor)` pairs, January first.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.factors
            .iter()
            .enumerate()
            .map(|(i, f)| (i as u32 + 1, *f))
    }

    pub fn to_map(&self) -> BTreeMap<u32, f64> {
        self.iter().collect()
    }
}

impl Default for SeasonalFactors {
    fn default() -> Self {
        Self::neutral()
    }
}

impl TryFrom<BTreeMap<u32, f64>> for SeasonalFactors {
    type Error = YieldError;

    fn try_from(map: BTreeMap<u32, f64>) -> std::result::Result<Self, Self::Error> {
        let expected: Vec<u32> = (1..=MONTHS as u32).collect();
        let found: Vec<u32> = map.keys().copied().collect();
        if found != expected {
            return Err(YieldError::InvalidParameter {
                param: "seasonal_factors".to_string(),
                value: format!("{:?}", found),
                reason: "table must contain exactly months 1-12".to_string(),
            });
        }
        let mut factors = [NEUTRAL_FACTOR; MONTHS];
        for (month, factor) in map {
            factors[(month - 1) as usize] = factor;
        }
        Self::from_array(factors)
    }
}

impl From<SeasonalFactors> for BTreeMap<u32, f64> {
    fn from(table: SeasonalFactors) -> Self {
        table.to_map()
    }
}

/// On-disk form of a factor table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedFactors {
    pub factors: SeasonalFactors,
    /// Where the factors were computed from, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Shared, atomically replaceable seasonal factor table.
#[derive(Debug)]
pub struct SeasonalFactorStore {
    table: RwLock<Arc<SeasonalFactors>>,
}

impl SeasonalFactorStore {
    pub fn new(factors: SeasonalFactors) -> Self {
        Self {
            table: RwLock::new(Arc::new(factors)),
        }
    }

    /// Store holding the neutral table.
    pub fn neutral() -> Self {
        Self::new(SeasonalFactors::neutral())
    }

    /// Compute the table from `series` and build a store around it.
    pub fn from_history(series: &HistoricalSeries) -> Result<Self> {
        Ok(Self::new(compute_seasonal_factors(series)?))
    }

    /// Factor for `month` from the current table.
    pub fn get(&self, month: u32) -> Result<f64> {
        self.table.read().get(month)
    }

    /// The current complete table.
    pub fn snapshot(&self) -> Arc<SeasonalFactors> {
        Arc::clone(&self.table.read())
    }

    /// Swap in a new table.
    pub fn replace(&self, factors: SeasonalFactors) {
        *self.table.write() = Arc::new(factors);
    }

    /// Recompute from `series` and swap in the result.
    ///
    /// On error the current table is left untouched.
    pub fn refresh(&self, series: &HistoricalSeries) -> Result<Arc<SeasonalFactors>> {
        let factors = Arc::new(compute_seasonal_factors(series)?);
        *self.table.write() = Arc::clone(&factors);
        info!(observations = series.len(), "refreshed seasonal factors");
        Ok(factors)
    }

    /// Write the current table as JSON.
    pub fn save(&self, path: impl AsRef<Path>, source: Option<&str>) -> Result<()> {
        let path = path.as_ref();
        let persisted = PersistedFactors {
            factors: *self.snapshot(),
            source: source.map(str::to_string),
        };
        let json = serde_json::to_string_pretty(&persisted)?;
        fs::write(path, json).map_err(|e| YieldError::Io(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "saved seasonal factors");
        Ok(())
    }

    /// Read a table written by [`SeasonalFactorStore::save`].
    pub fn read_persisted(path: impl AsRef<Path>) -> Result<PersistedFactors> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| YieldError::Io(format!("{}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Build a store from a persisted table without recomputation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let persisted = Self::read_persisted(path)?;
        info!(path = %path.display(), "loaded seasonal factors");
        Ok(Self::new(persisted.factors))
    }

    /// Swap in a persisted table.
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<()> {
        let persisted = Self::read_persisted(path)?;
        self.replace(persisted.factors);
        Ok(())
    }
}

impl Default for SeasonalFactorStore {
    fn default() -> Self {
        Self::neutral()
    }
}
