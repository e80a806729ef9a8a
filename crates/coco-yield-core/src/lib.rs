//! Core library of the coconut yield engine.
//!
//! This crate provides the seasonal-adjusted ensemble prediction engine:
//! input validation, per-group feature preparation, pretrained base
//! estimators, seasonal factors learned from historical yields, and the
//! yearly batch aggregate.

pub mod batch;
pub mod config;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod estimators;
pub mod features;
pub mod history;
pub mod observation;
pub mod seasonality;
pub mod store;
pub mod validation;

// Re-exports for convenience
pub use batch::{
    average_prediction, current_year, run_batch, MonthFailure, MonthlyInput, YearPrediction,
    YearRequest,
};
pub use config::EngineConfig;
pub use engine::YieldEngine;
pub use ensemble::{EnsembleBreakdown, EnsembleCombiner, EnsembleWeights, PredictionResult};
pub use error::{ErrorKind, Result, YieldError};
pub use estimators::{
    run_estimator, BaseEstimateResult, CategoricalEncoding, Estimator, EstimatorArtifact,
    EstimatorRegistry, LinearEstimator, RegressionTree, TreeEnsembleEstimator, TreeNode,
};
pub use features::{
    prepare_features, FeatureGroup, FeatureValue, FeatureVector, PreparedFeatures,
};
pub use history::{HistoricalRecord, HistoricalSeries, HistoryColumns};
pub use observation::{MonthlyObservation, PredictionDate, RawMonthlyRecord};
pub use seasonality::{
    analyze_seasonal_patterns, compute_seasonal_factors, MonthlyYieldStats, SeasonalAnalysis,
};
pub use store::{PersistedFactors, SeasonalFactorStore, SeasonalFactors};
pub use validation::{validate_record, RangePolicy};
