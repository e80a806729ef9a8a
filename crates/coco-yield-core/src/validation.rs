//! Input validation for raw monthly records.
//!
//! Validation happens once, at the boundary: a [`RawMonthlyRecord`] either
//! becomes a [`MonthlyObservation`] or fails with an error naming the month
//! and the first offending field. Fields are checked in request order.

use crate::error::{Result, YieldError};
use crate::observation::{
    MonthlyObservation, RawMonthlyRecord, DEFAULT_WEATHER_DESCRIPTION, FIELD_AGE, FIELD_HUMIDITY,
    FIELD_RAINFALL, FIELD_SM_10, FIELD_SM_20, FIELD_SM_30, FIELD_SOIL_TYPE, FIELD_TEMPERATURE,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// How physically implausible (but finite) values are treated.
///
/// Values are never coerced into range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangePolicy {
    /// Accept the value as given and log a warning.
    #[default]
    Lenient,
    /// Reject the value with [`YieldError::InvalidField`].
    Strict,
}

impl FromStr for RangePolicy {
    type Err = YieldError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lenient" | "false" | "0" | "off" => Ok(Self::Lenient),
            "strict" | "true" | "1" | "on" => Ok(Self::Strict),
            _ => Err(YieldError::InvalidParameter {
                param: "strict_ranges".to_string(),
                value: s.to_string(),
                reason: "expected strict/lenient or a boolean".to_string(),
            }),
        }
    }
}

/// Plausible bounds for one physical quantity.
#[derive(Debug, Clone, Copy)]
struct PhysicalRange {
    min: f64,
    max: f64,
}

const PERCENT: PhysicalRange = PhysicalRange {
    min: 0.0,
    max: 100.0,
};

const NON_NEGATIVE: PhysicalRange = PhysicalRange {
    min: 0.0,
    max: f64::INFINITY,
};

/// Validate one raw record.
pub fn validate_record(record: &RawMonthlyRecord, policy: RangePolicy) -> Result<MonthlyObservation> {
    let month = validate_month(record.month)?;

    let soil_moisture_10 = require_number(record.sm_10, month, FIELD_SM_10)?;
    let soil_moisture_20 = require_number(record.sm_20, month, FIELD_SM_20)?;
    let soil_moisture_30 = require_number(record.sm_30, month, FIELD_SM_30)?;
    let plant_age_years = require_number(record.age, month, FIELD_AGE)?;
    let soil_type = require_label(record.soil_type.as_deref(), month, FIELD_SOIL_TYPE)?;
    let temperature_c = require_number(record.temperature_c, month, FIELD_TEMPERATURE)?;
    let humidity_pct = require_number(record.humidity_pct, month, FIELD_HUMIDITY)?;
    let rainfall_mm = require_number(record.rainfall_mm, month, FIELD_RAINFALL)?;

    let weather_description = record
        .weather_description
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_WEATHER_DESCRIPTION)
        .to_string();

    check_range(month, FIELD_SM_10, soil_moisture_10, PERCENT, policy)?;
    check_range(month, FIELD_SM_20, soil_moisture_20, PERCENT, policy)?;
    check_range(month, FIELD_SM_30, soil_moisture_30, PERCENT, policy)?;
    check_range(month, FIELD_AGE, plant_age_years, NON_NEGATIVE, policy)?;
    check_range(month, FIELD_HUMIDITY, humidity_pct, PERCENT, policy)?;
    check_range(month, FIELD_RAINFALL, rainfall_mm, NON_NEGATIVE, policy)?;

    Ok(MonthlyObservation {
        month,
        soil_moisture_10,
        soil_moisture_20,
        soil_moisture_30,
        plant_age_years,
        soil_type,
        temperature_c,
        humidity_pct,
        rainfall_mm,
        weather_description,
    })
}

/// Check that a month number is present and within 1-12.
pub fn validate_month(month: Option<i64>) -> Result<u32> {
    match month {
        Some(m) if (1..=12).contains(&m) => Ok(m as u32),
        Some(m) => Err(YieldError::InvalidMonth {
            value: m.to_string(),
        }),
        None => Err(YieldError::InvalidMonth {
            value: "missing".to_string(),
        }),
    }
}

fn require_number(value: Option<f64>, month: u32, field: &str) -> Result<f64> {
    let value = value.ok_or_else(|| YieldError::MissingField {
        month,
        field: field.to_string(),
    })?;
    if !value.is_finite() {
        return Err(YieldError::InvalidField {
            month,
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be a finite number".to_string(),
        });
    }
    Ok(value)
}

fn require_label(value: Option<&str>, month: u32, field: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(label) if !label.is_empty() => Ok(label.to_string()),
        _ => Err(YieldError::MissingField {
            month,
            field: field.to_string(),
        }),
    }
}

fn check_range(
    month: u32,
    field: &str,
    value: f64,
    range: PhysicalRange,
    policy: RangePolicy,
) -> Result<()> {
    if value >= range.min && value <= range.max {
        return Ok(());
    }
    match policy {
        RangePolicy::Lenient => {
            warn!(month, field, value, "accepting out-of-range observation value");
            Ok(())
        }
        RangePolicy::Strict => Err(YieldError::InvalidField {
            month,
            field: field.to_string(),
            value: value.to_string(),
            reason: format!("expected a value in [{}, {}]", range.min, range.max),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_record(month: i64) -> RawMonthlyRecord {
        RawMonthlyRecord {
            month: Some(month),
            sm_10: Some(25.2),
            sm_20: Some(31.3),
            sm_30: Some(41.9),
            age: Some(5.0),
            soil_type: Some("Red Yellow Podzolic".to_string()),
            temperature_c: Some(27.3),
            humidity_pct: Some(67.4),
            rainfall_mm: Some(5.0),
            weather_description: None,
        }
    }

    #[test]
    fn test_valid_record_defaults_weather_description() {
        let obs = validate_record(&complete_record(5), RangePolicy::Lenient).unwrap();
        assert_eq!(obs.month, 5);
        assert_eq!(obs.soil_type, "Red Yellow Podzolic");
        assert_eq!(obs.weather_description, DEFAULT_WEATHER_DESCRIPTION);
    }

    #[test]
    fn test_missing_field_names_field_and_month() {
        let mut record = complete_record(2);
        record.sm_20 = None;
        let err = validate_record(&record, RangePolicy::Lenient).unwrap_err();
        assert_eq!(
            err,
            YieldError::MissingField {
                month: 2,
                field: "sm_20".to_string()
            }
        );
    }

    #[test]
    fn test_first_missing_field_is_reported() {
        let mut record = complete_record(8);
        record.sm_10 = None;
        record.rainfall_mm = None;
        let err = validate_record(&record, RangePolicy::Lenient).unwrap_err();
        assert_eq!(err.to_string(), "Missing parameter for month 8: sm_10");
    }

    #[test]
    fn test_blank_soil_type_is_missing() {
        let mut record = complete_record(3);
        record.soil_type = Some("   ".to_string());
        let err = validate_record(&record, RangePolicy::Lenient).unwrap_err();
        assert_eq!(err.to_string(), "Missing parameter for month 3: soil_type");
    }

    #[test]
    fn test_invalid_month() {
        for month in [Some(0), Some(13), None] {
            let mut record = complete_record(1);
            record.month = month;
            let err = validate_record(&record, RangePolicy::Lenient).unwrap_err();
            assert!(matches!(err, YieldError::InvalidMonth { .. }));
        }
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let mut record = complete_record(6);
        record.temperature_c = Some(f64::NAN);
        let err = validate_record(&record, RangePolicy::Lenient).unwrap_err();
        assert!(matches!(
            err,
            YieldError::InvalidField { month: 6, ref field, .. } if field == "Temperature (°C)"
        ));
    }

    #[test]
    fn test_out_of_range_not_coerced() {
        let mut record = complete_record(4);
        record.humidity_pct = Some(-3.0);

        let obs = validate_record(&record, RangePolicy::Lenient).unwrap();
        assert_eq!(obs.humidity_pct, -3.0);

        let err = validate_record(&record, RangePolicy::Strict).unwrap_err();
        assert!(matches!(err, YieldError::InvalidField { month: 4, .. }));
    }

    #[test]
    fn test_range_policy_from_str() {
        assert_eq!("strict".parse::<RangePolicy>().unwrap(), RangePolicy::Strict);
        assert_eq!("TRUE".parse::<RangePolicy>().unwrap(), RangePolicy::Strict);
        assert_eq!("0".parse::<RangePolicy>().unwrap(), RangePolicy::Lenient);
        assert!("maybe".parse::<RangePolicy>().is_err());
    }
}
