//! C-compatible type definitions for FFI boundary.

use coco_yield_core::{PredictionResult, SeasonalFactors, YieldEngine, YieldError};
use libc::{c_char, c_double, c_int};

/// Error codes for FFI boundary.
///
/// Codes 2-7 mirror [`YieldError::to_code`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    NullPointer = 1,
    ValidationError = 2,
    EstimationError = 3,
    InsufficientData = 4,
    BatchError = 5,
    ConfigurationError = 6,
    IoError = 7,
    InvalidUtf8 = 8,
    AllocationError = 9,
    PanicCaught = 10,
}

impl From<&YieldError> for ErrorCode {
    fn from(e: &YieldError) -> Self {
        match e.to_code() {
            2 => ErrorCode::ValidationError,
            3 => ErrorCode::EstimationError,
            4 => ErrorCode::InsufficientData,
            5 => ErrorCode::BatchError,
            6 => ErrorCode::ConfigurationError,
            _ => ErrorCode::IoError,
        }
    }
}

/// Error structure with message buffer for FFI.
#[repr(C)]
pub struct CocoError {
    pub code: ErrorCode,
    pub message: [c_char; 256],
}

impl CocoError {
    /// Create a success error (no error).
    pub fn success() -> Self {
        Self {
            code: ErrorCode::Success,
            message: [0; 256],
        }
    }

    /// Set an error with code and message.
    ///
    /// Long messages are cut at the last character boundary that fits.
    pub fn set_error(&mut self, code: ErrorCode, msg: &str) {
        self.code = code;
        let mut len = msg.len().min(255);
        while !msg.is_char_boundary(len) {
            len -= 1;
        }
        let bytes = msg.as_bytes();
        for (i, &b) in bytes[..len].iter().enumerate() {
            self.message[i] = b as c_char;
        }
        self.message[len] = 0;
    }
}

impl Default for CocoError {
    fn default() -> Self {
        Self::success()
    }
}

/// One month of observations.
///
/// A NaN numeric field is treated as missing. `soil_type` must be set;
/// a null `weather_description` means "normal".
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CocoMonthlyObservation {
    /// Calendar month (1-12)
    pub month: c_int,
    pub sm_10: c_double,
    pub sm_20: c_double,
    pub sm_30: c_double,
    /// Plant age in years
    pub age: c_double,
    /// Null-terminated UTF-8 label
    pub soil_type: *const c_char,
    pub temperature_c: c_double,
    pub humidity_pct: c_double,
    pub rainfall_mm: c_double,
    /// Null-terminated UTF-8 label, or null
    pub weather_description: *const c_char,
}

/// Prediction for one month, flattened for C.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CocoPredictionResult {
    pub year: c_int,
    pub month: c_int,
    pub soil_estimate: c_double,
    pub weather_estimate: c_double,
    pub soil_weight: c_double,
    pub weather_weight: c_double,
    pub weighted_base: c_double,
    pub seasonal_factor: c_double,
    pub seasonal_adjustment: c_double,
    pub ensemble_prediction: c_double,
}

impl From<&PredictionResult> for CocoPredictionResult {
    fn from(r: &PredictionResult) -> Self {
        Self {
            year: r.prediction_date.year(),
            month: r.month as c_int,
            soil_estimate: r.soil_estimate,
            weather_estimate: r.weather_estimate,
            soil_weight: r.breakdown.soil_weight,
            weather_weight: r.breakdown.weather_weight,
            weighted_base: r.breakdown.weighted_base,
            seasonal_factor: r.seasonal_factor,
            seasonal_adjustment: r.breakdown.seasonal_adjustment,
            ensemble_prediction: r.ensemble_prediction,
        }
    }
}

/// Seasonal factor table; index 0 is January.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CocoSeasonalFactors {
    pub factors: [c_double; 12],
}

impl From<&SeasonalFactors> for CocoSeasonalFactors {
    fn from(table: &SeasonalFactors) -> Self {
        Self {
            factors: *table.as_array(),
        }
    }
}

/// Opaque engine handle.
pub struct CocoEngine {
    pub(crate) inner: YieldEngine,
}

impl CocoEngine {
    pub fn new(inner: YieldEngine) -> Self {
        Self { inner }
    }

    pub fn engine(&self) -> &YieldEngine {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_error_message_truncated_and_terminated() {
        let mut error = CocoError::default();
        let long = "x".repeat(400);
        error.set_error(ErrorCode::IoError, &long);
        let msg = unsafe { CStr::from_ptr(error.message.as_ptr()) };
        assert_eq!(msg.to_bytes().len(), 255);
        assert_eq!(error.code, ErrorCode::IoError);
    }

    #[test]
    fn test_error_message_truncation_keeps_utf8() {
        let mut error = CocoError::default();
        // '°' occupies bytes 254 and 255
        let long = format!("{}°C", "x".repeat(254));
        error.set_error(ErrorCode::ValidationError, &long);
        let msg = unsafe { CStr::from_ptr(error.message.as_ptr()) };
        assert_eq!(msg.to_str().unwrap(), "x".repeat(254));

        error.set_error(ErrorCode::ValidationError, "Temperature (°C)");
        let msg = unsafe { CStr::from_ptr(error.message.as_ptr()) };
        assert_eq!(msg.to_str().unwrap(), "Temperature (°C)");
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            ErrorCode::from(&YieldError::MissingField {
                month: 1,
                field: "sm_10".to_string()
            }),
            ErrorCode::ValidationError
        );
        assert_eq!(ErrorCode::from(&YieldError::EmptyBatch), ErrorCode::BatchError);
        assert_eq!(
            ErrorCode::from(&YieldError::InsufficientData { needed: 1, got: 0 }),
            ErrorCode::InsufficientData
        );
        assert_eq!(
            ErrorCode::from(&YieldError::UnknownEstimator("x".to_string())),
            ErrorCode::ConfigurationError
        );
        assert_eq!(
            ErrorCode::from(&YieldError::Io("gone".to_string())),
            ErrorCode::IoError
        );
    }
}
