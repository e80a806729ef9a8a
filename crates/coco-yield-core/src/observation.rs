//! Monthly observation records and the mid-month prediction date.

use crate::error::{Result, YieldError};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Request key for soil moisture at 10 cm.
pub const FIELD_SM_10: &str = "sm_10";
/// Request key for soil moisture at 20 cm.
pub const FIELD_SM_20: &str = "sm_20";
/// Request key for soil moisture at 30 cm.
pub const FIELD_SM_30: &str = "sm_30";
/// Request key for plant age in years.
pub const FIELD_AGE: &str = "age";
/// Request key for the soil type label.
pub const FIELD_SOIL_TYPE: &str = "soil_type";
/// Request key for mean temperature.
pub const FIELD_TEMPERATURE: &str = "Temperature (°C)";
/// Request key for relative humidity.
pub const FIELD_HUMIDITY: &str = "Humidity (%)";
/// Request key for rainfall.
pub const FIELD_RAINFALL: &str = "Rainfall (mm)";
/// Request key for the free-text weather description.
pub const FIELD_WEATHER_DESCRIPTION: &str = "Weather Description";

/// Weather description used when a record carries none.
pub const DEFAULT_WEATHER_DESCRIPTION: &str = "normal";

/// Day of month every prediction date is anchored to.
pub const ANCHOR_DAY: u32 = 15;

/// One month of unvalidated input, as received from a caller.
///
/// Every field is optional here; [`crate::validation::validate_record`] turns
/// this into a [`MonthlyObservation`] or names the first missing field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMonthlyRecord {
    pub month: Option<i64>,
    #[serde(rename = "sm_10", alias = "soil_moisture_10")]
    pub sm_10: Option<f64>,
    #[serde(rename = "sm_20", alias = "soil_moisture_20")]
    pub sm_20: Option<f64>,
    #[serde(rename = "sm_30", alias = "soil_moisture_30")]
    pub sm_30: Option<f64>,
    #[serde(rename = "age", alias = "plant_age_years")]
    pub age: Option<f64>,
    #[serde(rename = "soil_type")]
    pub soil_type: Option<String>,
    #[serde(rename = "Temperature (°C)", alias = "temperature_c")]
    pub temperature_c: Option<f64>,
    #[serde(rename = "Humidity (%)", alias = "humidity_pct")]
    pub humidity_pct: Option<f64>,
    #[serde(rename = "Rainfall (mm)", alias = "rainfall_mm")]
    pub rainfall_mm: Option<f64>,
    #[serde(rename = "Weather Description", alias = "weather_description")]
    pub weather_description: Option<String>,
}

impl RawMonthlyRecord {
    /// Read one request entry field by field.
    ///
    /// A wrongly typed field fails this entry only, as
    /// [`YieldError::InvalidField`] naming the field and month; an earlier
    /// missing field is reported first. A month given as an integral float
    /// such as `2.0` is accepted.
    pub fn from_json_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| YieldError::InvalidMonth {
            value: value.to_string(),
        })?;
        let month = month_number(object.get("month").unwrap_or(&Value::Null))?;
        let mut reader = FieldReader {
            object,
            month: crate::validation::validate_month(month)?,
            first_missing: None,
        };

        Ok(Self {
            month,
            sm_10: reader.number(FIELD_SM_10, "soil_moisture_10")?,
            sm_20: reader.number(FIELD_SM_20, "soil_moisture_20")?,
            sm_30: reader.number(FIELD_SM_30, "soil_moisture_30")?,
            age: reader.number(FIELD_AGE, "plant_age_years")?,
            soil_type: reader.label(FIELD_SOIL_TYPE, None, true)?,
            temperature_c: reader.number(FIELD_TEMPERATURE, "temperature_c")?,
            humidity_pct: reader.number(FIELD_HUMIDITY, "humidity_pct")?,
            rainfall_mm: reader.number(FIELD_RAINFALL, "rainfall_mm")?,
            weather_description: reader.label(
                FIELD_WEATHER_DESCRIPTION,
                Some("weather_description"),
                false,
            )?,
        })
    }
}

/// Month number of a JSON value; null is `None`.
///
/// Integral floats are accepted. Range checking is left to validation.
pub fn month_number(value: &Value) -> Result<Option<i64>> {
    let invalid = || YieldError::InvalidMonth {
        value: value.to_string(),
    };
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(m) = n.as_i64() {
                return Ok(Some(m));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() <= i64::MAX as f64 => Ok(Some(f as i64)),
                _ => Err(invalid()),
            }
        }
        _ => Err(invalid()),
    }
}

struct FieldReader<'a> {
    object: &'a Map<String, Value>,
    month: u32,
    first_missing: Option<&'static str>,
}

impl<'a> FieldReader<'a> {
    fn get(&self, key: &str, alias: Option<&str>) -> Option<&'a Value> {
        self.object
            .get(key)
            .or_else(|| alias.and_then(|a| self.object.get(a)))
            .filter(|v| !v.is_null())
    }

    fn number(&mut self, key: &'static str, alias: &str) -> Result<Option<f64>> {
        match self.get(key, Some(alias)) {
            None => {
                self.first_missing.get_or_insert(key);
                Ok(None)
            }
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(other) => Err(self.wrong_type(key, other, "expected a number")),
        }
    }

    fn label(
        &mut self,
        key: &'static str,
        alias: Option<&str>,
        required: bool,
    ) -> Result<Option<String>> {
        match self.get(key, alias) {
            None => {
                if required {
                    self.first_missing.get_or_insert(key);
                }
                Ok(None)
            }
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.wrong_type(key, other, "expected a string")),
        }
    }

    fn wrong_type(&self, key: &str, value: &Value, reason: &str) -> YieldError {
        match self.first_missing {
            Some(field) => YieldError::MissingField {
                month: self.month,
                field: field.to_string(),
            },
            None => YieldError::InvalidField {
                month: self.month,
                field: key.to_string(),
                value: value.to_string(),
                reason: reason.to_string(),
            },
        }
    }
}

/// A validated month of soil and weather observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyObservation {
    /// Calendar month (1-12)
    pub month: u32,
    /// Soil moisture at 10 cm depth (%)
    pub soil_moisture_10: f64,
    /// Soil moisture at 20 cm depth (%)
    pub soil_moisture_20: f64,
    /// Soil moisture at 30 cm depth (%)
    pub soil_moisture_30: f64,
    /// Plant age (years)
    pub plant_age_years: f64,
    /// Soil type label
    pub soil_type: String,
    /// Mean temperature (°C)
    pub temperature_c: f64,
    /// Relative humidity (%)
    pub humidity_pct: f64,
    /// Rainfall (mm)
    pub rainfall_mm: f64,
    /// Free-text weather description
    pub weather_description: String,
}

impl From<&MonthlyObservation> for RawMonthlyRecord {
    fn from(obs: &MonthlyObservation) -> Self {
        Self {
            month: Some(i64::from(obs.month)),
            sm_10: Some(obs.soil_moisture_10),
            sm_20: Some(obs.soil_moisture_20),
            sm_30: Some(obs.soil_moisture_30),
            age: Some(obs.plant_age_years),
            soil_type: Some(obs.soil_type.clone()),
            temperature_c: Some(obs.temperature_c),
            humidity_pct: Some(obs.humidity_pct),
            rainfall_mm: Some(obs.rainfall_mm),
            weather_description: Some(obs.weather_description.clone()),
        }
    }
}

/// Calendar date a monthly prediction is made for, anchored to the 15th.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionDate(NaiveDate);

impl PredictionDate {
    /// Build the mid-month date for `year` and `month`.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(YieldError::InvalidMonth {
                value: month.to_string(),
            });
        }
        NaiveDate::from_ymd_opt(year, month, ANCHOR_DAY)
            .map(Self)
            .ok_or_else(|| YieldError::InvalidParameter {
                param: "year".to_string(),
                value: year.to_string(),
                reason: "outside the supported calendar range".to_string(),
            })
    }

    /// Underlying calendar date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }
}

impl fmt::Display for PredictionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_date_anchor() {
        let date = PredictionDate::new(2024, 3).unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(date.month(), 3);
        assert_eq!(date.date().day(), ANCHOR_DAY);
        assert_eq!(date.to_string(), "2024-03-15");
    }

    #[test]
    fn test_prediction_date_invalid_month() {
        assert!(matches!(
            PredictionDate::new(2024, 0),
            Err(YieldError::InvalidMonth { .. })
        ));
        assert!(matches!(
            PredictionDate::new(2024, 13),
            Err(YieldError::InvalidMonth { .. })
        ));
    }

    #[test]
    fn test_raw_record_original_keys() {
        let json = r#"{
            "month": 4,
            "sm_10": 25.2,
            "sm_20": 31.3,
            "sm_30": 41.9,
            "age": 5,
            "soil_type": "Red Yellow Podzolic",
            "Temperature (°C)": 27.3,
            "Humidity (%)": 67.4,
            "Rainfall (mm)": 5.0
        }"#;
        let record: RawMonthlyRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.month, Some(4));
        assert_eq!(record.age, Some(5.0));
        assert_eq!(record.humidity_pct, Some(67.4));
        assert_eq!(record.weather_description, None);
    }

    #[test]
    fn test_raw_record_snake_case_aliases_and_nulls() {
        let json = r#"{
            "month": 2,
            "soil_moisture_10": 20.0,
            "sm_20": null,
            "temperature_c": 28.0,
            "weather_description": "rainy"
        }"#;
        let record: RawMonthlyRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.sm_10, Some(20.0));
        assert_eq!(record.sm_20, None);
        assert_eq!(record.temperature_c, Some(28.0));
        assert_eq!(record.weather_description.as_deref(), Some("rainy"));
    }

    #[test]
    fn test_from_json_value_accepts_integral_float_month() {
        let record = RawMonthlyRecord::from_json_value(&serde_json::json!({
            "month": 2.0,
            "sm_10": 20.0,
            "age": 5,
            "soil_type": "Lateritic",
            "Weather Description": null
        }))
        .unwrap();
        assert_eq!(record.month, Some(2));
        assert_eq!(record.sm_10, Some(20.0));
        assert_eq!(record.age, Some(5.0));
        assert_eq!(record.sm_20, None);
        assert_eq!(record.weather_description, None);

        assert!(matches!(
            RawMonthlyRecord::from_json_value(&serde_json::json!({"month": 2.5})),
            Err(YieldError::InvalidMonth { .. })
        ));
        assert!(matches!(
            RawMonthlyRecord::from_json_value(&serde_json::json!({"month": "2"})),
            Err(YieldError::InvalidMonth { .. })
        ));
        assert!(matches!(
            RawMonthlyRecord::from_json_value(&serde_json::json!([1, 2])),
            Err(YieldError::InvalidMonth { .. })
        ));
    }

    #[test]
    fn test_from_json_value_wrong_type_names_field_and_month() {
        let err = RawMonthlyRecord::from_json_value(&serde_json::json!({
            "month": 2,
            "sm_10": "abc",
            "sm_20": 31.3
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            YieldError::InvalidField { month: 2, ref field, .. } if field == "sm_10"
        ));
        assert_eq!(err.month(), Some(2));

        let err = RawMonthlyRecord::from_json_value(&serde_json::json!({
            "month": 9,
            "sm_10": 20.0,
            "Rainfall (mm)": "heavy"
        }))
        .unwrap_err();
        assert_eq!(
            err,
            YieldError::MissingField {
                month: 9,
                field: "sm_20".to_string()
            }
        );
    }
}
