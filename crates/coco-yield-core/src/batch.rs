//! Yearly batch orchestration.
//!
//! Months are predicted independently. A failing month is recorded as a
//! [`MonthFailure`] and does not stop its siblings; only an empty request or
//! a batch in which every month failed is an error.

use crate::ensemble::PredictionResult;
use crate::error::{Result, YieldError};
use crate::observation::{month_number, RawMonthlyRecord};
use chrono::Datelike;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::borrow::Cow;
use tracing::{debug, warn};

/// Decimal places of the yearly average.
pub const DEFAULT_AVERAGE_DECIMALS: u32 = 2;

/// A yearly prediction request.
///
/// Entries stay as JSON until their month is processed, so a malformed entry
/// fails only its own month.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct YearRequest {
    /// Target year; the current calendar year when absent
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub monthly_data: Vec<Value>,
}

impl YearRequest {
    pub fn resolved_year(&self) -> i32 {
        self.year.unwrap_or_else(current_year)
    }
}

/// Current calendar year in local time.
pub fn current_year() -> i32 {
    chrono::Local::now().year()
}

/// One entry of a batch.
pub trait MonthlyInput {
    /// Requested month, when it is a valid month number.
    fn requested_month(&self) -> Option<u32>;

    /// Raw record to validate; an error here fails this month only.
    fn to_raw_record(&self) -> Result<Cow<'_, RawMonthlyRecord>>;
}

fn calendar_month(month: i64) -> Option<u32> {
    u32::try_from(month).ok().filter(|m| (1..=12).contains(m))
}

impl MonthlyInput for RawMonthlyRecord {
    fn requested_month(&self) -> Option<u32> {
        self.month.and_then(calendar_month)
    }

    fn to_raw_record(&self) -> Result<Cow<'_, RawMonthlyRecord>> {
        Ok(Cow::Borrowed(self))
    }
}

impl MonthlyInput for Value {
    fn requested_month(&self) -> Option<u32> {
        self.get("month")
            .and_then(|m| month_number(m).ok().flatten())
            .and_then(calendar_month)
    }

    fn to_raw_record(&self) -> Result<Cow<'_, RawMonthlyRecord>> {
        RawMonthlyRecord::from_json_value(self).map(Cow::Owned)
    }
}

/// A month of a batch that produced no prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthFailure {
    /// Position of the record in the request
    pub index: usize,
    /// Requested month, when it was a valid month number
    pub month: Option<u32>,
    #[serde(rename = "message", serialize_with = "error_message")]
    pub error: YieldError,
}

fn error_message<S: Serializer>(error: &YieldError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Outcome of a yearly batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearPrediction {
    pub year: i32,
    /// Successful months, in request order
    pub monthly_predictions: Vec<PredictionResult>,
    /// Failed months, in request order
    pub failures: Vec<MonthFailure>,
    /// Mean of the successful ensemble predictions, rounded
    pub average_prediction: f64,
}

/// Run `predict` over every record of a batch.
pub fn run_batch<T, F>(
    year: i32,
    records: &[T],
    decimals: u32,
    predict: F,
) -> Result<YearPrediction>
where
    T: MonthlyInput,
    F: Fn(&T) -> Result<PredictionResult>,
{
    if records.is_empty() {
        return Err(YieldError::EmptyBatch);
    }

    let mut monthly_predictions = Vec::with_capacity(records.len());
    let mut failures = Vec::new();

    for (index, record) in records.iter().enumerate() {
        match predict(record) {
            Ok(prediction) => monthly_predictions.push(prediction),
            Err(error) => {
                let month = record.requested_month();
                warn!(index, month = ?month, %error, "month prediction failed");
                failures.push(MonthFailure {
                    index,
                    month,
                    error,
                });
            }
        }
    }

    let average_prediction = match average_prediction(&monthly_predictions, decimals) {
        Some(avg) => avg,
        None => return Err(YieldError::BatchFailed { failures }),
    };

    debug!(
        year,
        succeeded = monthly_predictions.len(),
        failed = failures.len(),
        average_prediction,
        "batch complete"
    );

    Ok(YearPrediction {
        year,
        monthly_predictions,
        failures,
        average_prediction,
    })
}

/// Rounded mean of the ensemble predictions; `None` when there are none.
///
/// Values are summed in sorted order, so any permutation of `predictions`
/// yields the same result.
pub fn average_prediction(predictions: &[PredictionResult], decimals: u32) -> Option<f64> {
    if predictions.is_empty() {
        return None;
    }
    let mut values: Vec<f64> = predictions.iter().map(|p| p.ensemble_prediction).collect();
    values.sort_by(f64::total_cmp);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(round_to(mean, decimals))
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::EnsembleCombiner;
    use crate::observation::PredictionDate;

    fn prediction(month: u32, value: f64) -> PredictionResult {
        let breakdown = EnsembleCombiner::default()
            .combine(value, value, 1.0)
            .unwrap();
        PredictionResult::new(PredictionDate::new(2024, month).unwrap(), value, value, breakdown)
    }

    fn record(month: i64, value: Option<f64>) -> RawMonthlyRecord {
        RawMonthlyRecord {
            month: Some(month),
            sm_10: value,
            ..Default::default()
        }
    }

    fn fake_predict(record: &RawMonthlyRecord) -> Result<PredictionResult> {
        let month = record.month.unwrap_or_default() as u32;
        match record.sm_10 {
            Some(v) => Ok(prediction(month, v)),
            None => Err(YieldError::MissingField {
                month,
                field: "sm_10".to_string(),
            }),
        }
    }

    #[test]
    fn test_empty_batch_fails_fast() {
        let none: Vec<RawMonthlyRecord> = Vec::new();
        let err = run_batch(2024, &none, 2, fake_predict).unwrap_err();
        assert_eq!(err, YieldError::EmptyBatch);
    }

    #[test]
    fn test_partial_failure_keeps_successes() {
        let records = vec![record(1, Some(512.0)), record(2, None)];
        let result = run_batch(2024, &records, 2, fake_predict).unwrap();

        assert_eq!(result.year, 2024);
        assert_eq!(result.monthly_predictions.len(), 1);
        assert_eq!(result.monthly_predictions[0].month, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].index, 1);
        assert_eq!(result.failures[0].month, Some(2));
        assert_eq!(result.average_prediction, 512.0);
    }

    #[test]
    fn test_every_month_failing_is_batch_error() {
        let records = vec![record(3, None), record(4, None)];
        match run_batch(2024, &records, 2, fake_predict) {
            Err(YieldError::BatchFailed { failures }) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[1].month, Some(4));
            }
            other => panic!("expected BatchFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_month_number_is_not_reported_as_month() {
        let records = vec![record(13, None), record(5, Some(100.0))];
        let result = run_batch(2024, &records, 2, fake_predict).unwrap();
        assert_eq!(result.failures[0].month, None);
    }

    #[test]
    fn test_average_is_order_independent() {
        let values = [512.37, 498.112, 0.1, 1e6 + 0.3, 733.0, 0.2, 901.555];
        let forward: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| prediction(i as u32 + 1, *v))
            .collect();
        let mut reversed = forward.clone();
        reversed.reverse();
        let mut rotated = forward.clone();
        rotated.rotate_left(3);

        let expected = average_prediction(&forward, 2).unwrap();
        assert_eq!(average_prediction(&reversed, 2).unwrap().to_bits(), expected.to_bits());
        assert_eq!(average_prediction(&rotated, 2).unwrap().to_bits(), expected.to_bits());
    }

    #[test]
    fn test_average_rounding() {
        let preds = vec![prediction(1, 100.0), prediction(2, 100.01), prediction(3, 100.0)];
        assert_eq!(average_prediction(&preds, 2), Some(100.0));
        assert_eq!(round_to(2.675_1, 2), 2.68);
        assert_eq!(round_to(-1.005_1, 2), -1.01);
        assert_eq!(average_prediction(&[], 2), None);
    }

    #[test]
    fn test_year_request_defaults() {
        let request: YearRequest = serde_json::from_str(r#"{"monthly_data": []}"#).unwrap();
        assert_eq!(request.year, None);
        assert_eq!(request.resolved_year(), current_year());

        let request: YearRequest =
            serde_json::from_str(r#"{"year": 2025, "monthly_data": [{"month": 1}]}"#).unwrap();
        assert_eq!(request.resolved_year(), 2025);
        assert_eq!(request.monthly_data.len(), 1);
    }

    #[test]
    fn test_json_entries_fail_per_month() {
        let entries = vec![
            serde_json::json!({"month": 1, "sm_10": 512.0}),
            serde_json::json!({"month": 2, "sm_10": "abc"}),
            serde_json::json!({"month": 3.0, "sm_10": 488.0}),
        ];
        let result = run_batch(2024, &entries, 2, |entry: &Value| {
            fake_predict(&*entry.to_raw_record()?)
        })
        .unwrap();

        assert_eq!(result.monthly_predictions.len(), 2);
        assert_eq!(result.monthly_predictions[1].month, 3);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].index, 1);
        assert_eq!(result.failures[0].month, Some(2));
        assert!(matches!(
            result.failures[0].error,
            YieldError::InvalidField { month: 2, ref field, .. } if field == "sm_10"
        ));
        assert_eq!(result.average_prediction, 500.0);
    }

    #[test]
    fn test_requested_month_of_json_entry() {
        assert_eq!(serde_json::json!({"month": 4.0}).requested_month(), Some(4));
        assert_eq!(serde_json::json!({"month": 13}).requested_month(), None);
        assert_eq!(serde_json::json!({"month": "x"}).requested_month(), None);
        assert_eq!(serde_json::json!([]).requested_month(), None);
    }

    #[test]
    fn test_failure_serializes_message() {
        let failure = MonthFailure {
            index: 0,
            month: Some(2),
            error: YieldError::MissingField {
                month: 2,
                field: "sm_20".to_string(),
            },
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["message"], "Missing parameter for month 2: sm_20");
        assert_eq!(json["month"], 2);
    }
}
