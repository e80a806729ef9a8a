//! Ensemble combination of base estimates and the seasonal factor.

use crate::error::{Result, YieldError};
use crate::estimators::BaseEstimateResult;
use crate::observation::PredictionDate;
use serde::{Deserialize, Serialize};

/// Tolerance on `soil + weather == 1` for ensemble weights.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Fixed per-estimator weights; they sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub soil: f64,
    pub weather: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            soil: 0.5,
            weather: 0.5,
        }
    }
}

impl EnsembleWeights {
    pub fn new(soil: f64, weather: f64) -> Result<Self> {
        let weights = Self { soil, weather };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<()> {
        for (param, value) in [("weights.soil", self.soil), ("weights.weather", self.weather)] {
            if !value.is_finite() || value < 0.0 {
                return Err(YieldError::InvalidParameter {
                    param: param.to_string(),
                    value: value.to_string(),
                    reason: "must be finite and non-negative".to_string(),
                });
            }
        }
        let sum = self.soil + self.weather;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(YieldError::InvalidParameter {
                param: "weights".to_string(),
                value: sum.to_string(),
                reason: "weights must sum to 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Explainable decomposition of one ensemble prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleBreakdown {
    pub soil_weight: f64,
    pub weather_weight: f64,
    /// `soil_weight * soil_estimate`
    pub soil_contribution: f64,
    /// `weather_weight * weather_estimate`
    pub weather_contribution: f64,
    /// Unadjusted weighted base estimate
    pub weighted_base: f64,
    pub seasonal_factor: f64,
    /// `ensemble_prediction - weighted_base`
    pub seasonal_adjustment: f64,
    /// `weighted_base * seasonal_factor`
    pub ensemble_prediction: f64,
}

/// Calibrated prediction for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub month: u32,
    pub prediction_date: PredictionDate,
    pub soil_estimate: f64,
    pub weather_estimate: f64,
    pub seasonal_factor: f64,
    pub ensemble_prediction: f64,
    pub breakdown: EnsembleBreakdown,
}

impl PredictionResult {
    pub fn new(
        prediction_date: PredictionDate,
        soil_estimate: f64,
        weather_estimate: f64,
        breakdown: EnsembleBreakdown,
    ) -> Self {
        Self {
            month: prediction_date.month(),
            prediction_date,
            soil_estimate,
            weather_estimate,
            seasonal_factor: breakdown.seasonal_factor,
            ensemble_prediction: breakdown.ensemble_prediction,
            breakdown,
        }
    }
}

/// Merges the soil and weather estimates with the month's seasonal factor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnsembleCombiner {
    weights: EnsembleWeights,
}

impl EnsembleCombiner {
    pub fn new(weights: EnsembleWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    /// Combine two raw estimates and a seasonal factor.
    ///
    /// Pure: the same inputs always give the same breakdown.
    pub fn combine(
        &self,
        soil_estimate: f64,
        weather_estimate: f64,
        seasonal_factor: f64,
    ) -> Result<EnsembleBreakdown> {
        for (name, value) in [
            ("soil_estimate", soil_estimate),
            ("weather_estimate", weather_estimate),
            ("seasonal_factor", seasonal_factor),
        ] {
            if !value.is_finite() {
                return Err(YieldError::Estimation {
                    estimator: "ensemble".to_string(),
                    reason: format!("{} is not finite ({})", name, value),
                });
            }
        }

        let soil_contribution = self.weights.soil * soil_estimate;
        let weather_contribution = self.weights.weather * weather_estimate;
        let weighted_base = soil_contribution + weather_contribution;
        let ensemble_prediction = weighted_base * seasonal_factor;
        for (name, value) in [
            ("weighted_base", weighted_base),
            ("ensemble_prediction", ensemble_prediction),
        ] {
            if !value.is_finite() {
                return Err(YieldError::Estimation {
                    estimator: "ensemble".to_string(),
                    reason: format!("{} overflowed ({})", name, value),
                });
            }
        }

        Ok(EnsembleBreakdown {
            soil_weight: self.weights.soil,
            weather_weight: self.weights.weather,
            soil_contribution,
            weather_contribution,
            weighted_base,
            seasonal_factor,
            seasonal_adjustment: ensemble_prediction - weighted_base,
            ensemble_prediction,
        })
    }

    /// Build the month's prediction from both estimator outcomes.
    ///
    /// Any failed estimator fails the month; there is no single-estimator
    /// fallback.
    pub fn combine_results(
        &self,
        date: PredictionDate,
        soil: Result<BaseEstimateResult>,
        weather: Result<BaseEstimateResult>,
        seasonal_factor: f64,
    ) -> Result<PredictionResult> {
        let soil = soil?;
        let weather = weather?;
        let breakdown = self.combine(soil.raw_value, weather.raw_value, seasonal_factor)?;
        Ok(PredictionResult::new(
            date,
            soil.raw_value,
            weather.raw_value,
            breakdown,
        ))
    }
}
