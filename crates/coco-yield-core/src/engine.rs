//! Prediction engine facade.
//!
//! [`YieldEngine`] ties the pipeline together: validation, feature
//! preparation, the two base estimators, the seasonal factor store and the
//! ensemble combiner. It is `Send + Sync`; requests share it read-only and
//! only a factor refresh writes, as a whole-table swap.

use crate::batch::{run_batch, MonthlyInput, YearPrediction, YearRequest};
use crate::config::EngineConfig;
use crate::ensemble::{EnsembleCombiner, PredictionResult};
use crate::error::{Result, YieldError};
use crate::estimators::{run_estimator, Estimator, EstimatorRegistry};
use crate::features::{prepare_features, FeatureGroup};
use crate::history::HistoricalSeries;
use crate::observation::{MonthlyObservation, PredictionDate, RawMonthlyRecord};
use crate::seasonality::{analyze_seasonal_patterns, compute_seasonal_factors, SeasonalAnalysis};
use crate::store::{SeasonalFactorStore, SeasonalFactors};
use crate::validation::validate_record;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Seasonal-adjusted ensemble yield engine.
#[derive(Debug)]
pub struct YieldEngine {
    config: EngineConfig,
    registry: EstimatorRegistry,
    soil: Arc<dyn Estimator>,
    weather: Arc<dyn Estimator>,
    store: SeasonalFactorStore,
    combiner: EnsembleCombiner,
}

impl YieldEngine {
    /// Build an engine; the configured estimators must exist in `registry`
    /// and belong to the soil and weather groups respectively.
    pub fn new(
        config: EngineConfig,
        registry: EstimatorRegistry,
        store: SeasonalFactorStore,
    ) -> Result<Self> {
        config.validate()?;
        let soil = resolve(&registry, &config.soil_estimator, FeatureGroup::Soil)?;
        let weather = resolve(&registry, &config.weather_estimator, FeatureGroup::Weather)?;
        let combiner = EnsembleCombiner::new(config.weights)?;

        info!(
            soil = %config.soil_estimator,
            weather = %config.weather_estimator,
            soil_weight = config.weights.soil,
            weather_weight = config.weights.weather,
            "yield engine ready"
        );

        Ok(Self {
            config,
            registry,
            soil,
            weather,
            store,
            combiner,
        })
    }

    /// Engine with the default configuration and a neutral factor table.
    pub fn with_registry(registry: EstimatorRegistry) -> Result<Self> {
        Self::new(EngineConfig::default(), registry, SeasonalFactorStore::neutral())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &EstimatorRegistry {
        &self.registry
    }

    pub fn store(&self) -> &SeasonalFactorStore {
        &self.store
    }

    /// Predict one validated month.
    pub fn predict_month(
        &self,
        observation: &MonthlyObservation,
        date: PredictionDate,
    ) -> Result<PredictionResult> {
        self.predict_with(observation, date, &self.store.snapshot())
    }

    /// Validate a raw record and predict it for `year`.
    pub fn predict_record(&self, record: &RawMonthlyRecord, year: i32) -> Result<PredictionResult> {
        self.predict_record_with(record, year, &self.store.snapshot())
    }

    /// Predict every month of a batch against one factor snapshot.
    ///
    /// Entries may be raw records or JSON values; a JSON entry that does not
    /// convert fails its own month only.
    pub fn predict_year<T: MonthlyInput>(&self, year: i32, records: &[T]) -> Result<YearPrediction> {
        let factors = self.store.snapshot();
        run_batch(year, records, self.config.average_decimals, |entry| {
            let record = entry.to_raw_record()?;
            self.predict_record_with(&record, year, &factors)
        })
    }

    /// Predict a [`YearRequest`]; the year defaults to the current one.
    pub fn predict_request(&self, request: &YearRequest) -> Result<YearPrediction> {
        self.predict_year(request.resolved_year(), &request.monthly_data)
    }

    /// Current month to factor mapping.
    pub fn seasonal_factors(&self) -> BTreeMap<u32, f64> {
        self.store.snapshot().to_map()
    }

    /// Recompute the factor table from `series` and swap it in.
    pub fn refresh_seasonal_factors(&self, series: &HistoricalSeries) -> Result<SeasonalFactors> {
        Ok(*self.store.refresh(series)?)
    }

    /// Load a history CSV and refresh the factor table from it.
    pub fn refresh_from_csv(&self, path: impl AsRef<Path>) -> Result<SeasonalFactors> {
        let series = self.load_history(path)?;
        self.refresh_seasonal_factors(&series)
    }

    /// Seasonal factors of a history file; the store is not touched.
    pub fn analyze_historical_series(&self, path: impl AsRef<Path>) -> Result<BTreeMap<u32, f64>> {
        let series = self.load_history(path)?;
        Ok(compute_seasonal_factors(&series)?.to_map())
    }

    /// Full seasonal report of a history file.
    pub fn analyze_seasonal_patterns(&self, path: impl AsRef<Path>) -> Result<SeasonalAnalysis> {
        analyze_seasonal_patterns(&self.load_history(path)?)
    }

    /// Read a history CSV using the configured column names.
    pub fn load_history(&self, path: impl AsRef<Path>) -> Result<HistoricalSeries> {
        HistoricalSeries::load_csv(path, &self.config.history)
    }

    /// Persist the current factor table.
    pub fn save_seasonal_factors(&self, path: impl AsRef<Path>, source: Option<&str>) -> Result<()> {
        self.store.save(path, source)
    }

    fn predict_record_with(
        &self,
        record: &RawMonthlyRecord,
        year: i32,
        factors: &SeasonalFactors,
    ) -> Result<PredictionResult> {
        let observation = validate_record(record, self.config.range_policy())?;
        let date = PredictionDate::new(year, observation.month)?;
        self.predict_with(&observation, date, factors)
    }

    fn predict_with(
        &self,
        observation: &MonthlyObservation,
        date: PredictionDate,
        factors: &SeasonalFactors,
    ) -> Result<PredictionResult> {
        if observation.month != date.month() {
            return Err(YieldError::InvalidParameter {
                param: "prediction_date".to_string(),
                value: date.to_string(),
                reason: format!("observation is for month {}", observation.month),
            });
        }

        let features = prepare_features(observation, date);
        let soil = run_estimator(self.soil.as_ref(), &features.soil);
        let weather = run_estimator(self.weather.as_ref(), &features.weather);
        let seasonal_factor = factors.get(date.month())?;
        let result = self
            .combiner
            .combine_results(date, soil, weather, seasonal_factor)
            .map_err(|e| with_month(e, observation.month))?;

        debug!(
            month = result.month,
            soil_estimate = result.soil_estimate,
            weather_estimate = result.weather_estimate,
            seasonal_factor,
            ensemble_prediction = result.ensemble_prediction,
            "month predicted"
        );
        Ok(result)
    }
}

fn resolve(
    registry: &EstimatorRegistry,
    id: &str,
    group: FeatureGroup,
) -> Result<Arc<dyn Estimator>> {
    let estimator = registry.get(id)?;
    if estimator.group() != group {
        return Err(YieldError::InvalidModel(format!(
            "estimator '{}' consumes {} features, expected {}",
            id,
            estimator.group(),
            group
        )));
    }
    Ok(Arc::clone(estimator))
}

/// Prefix estimation failures with the month they occurred in.
fn with_month(error: YieldError, month: u32) -> YieldError {
    match error {
        YieldError::Estimation { estimator, reason } => YieldError::Estimation {
            estimator,
            reason: format!("month {}: {}", month, reason),
        },
        other => other,
    }
}
