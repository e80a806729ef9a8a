//! Error types for the yield engine.

use thiserror::Error;

use crate::batch::MonthFailure;

/// Result type for yield engine operations.
pub type Result<T> = std::result::Result<T, YieldError>;

/// Coarse classification of a [`YieldError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed, missing or out-of-range input field (month-scoped).
    Validation,
    /// A base estimator could not produce a value.
    Estimation,
    /// Historical series too small to derive seasonal factors.
    InsufficientData,
    /// No month in a batch produced a usable prediction.
    Batch,
    /// Invalid configuration, artifact or persisted table.
    Configuration,
    /// File system or decoding failure.
    Io,
}

/// Error types for yield engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum YieldError {
    #[error("Invalid month: {value}")]
    InvalidMonth { value: String },

    #[error("Missing parameter for month {month}: {field}")]
    MissingField { month: u32, field: String },

    #[error("Invalid parameter for month {month}: {field} = {value} ({reason})")]
    InvalidField {
        month: u32,
        field: String,
        value: String,
        reason: String,
    },

    #[error("Estimator '{estimator}' failed: {reason}")]
    Estimation { estimator: String, reason: String },

    #[error("Insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("No monthly data provided")]
    EmptyBatch,

    #[error("Failed to generate predictions: all {} months failed", .failures.len())]
    BatchFailed { failures: Vec<MonthFailure> },

    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),

    #[error("Invalid parameter '{param}' = '{value}': {reason}")]
    InvalidParameter {
        param: String,
        value: String,
        reason: String,
    },

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Unknown estimator: {0}")]
    UnknownEstimator(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl YieldError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            YieldError::InvalidMonth { .. }
            | YieldError::MissingField { .. }
            | YieldError::InvalidField { .. } => ErrorKind::Validation,
            YieldError::Estimation { .. } => ErrorKind::Estimation,
            YieldError::InsufficientData { .. } => ErrorKind::InsufficientData,
            YieldError::EmptyBatch | YieldError::BatchFailed { .. } => ErrorKind::Batch,
            YieldError::InvalidDateFormat(_)
            | YieldError::InvalidParameter { .. }
            | YieldError::InvalidModel(_)
            | YieldError::UnknownEstimator(_) => ErrorKind::Configuration,
            YieldError::Io(_) | YieldError::Serialization(_) => ErrorKind::Io,
        }
    }

    /// Month the error is scoped to, when known.
    pub fn month(&self) -> Option<u32> {
        match self {
            YieldError::MissingField { month, .. } | YieldError::InvalidField { month, .. } => {
                Some(*month)
            }
            _ => None,
        }
    }

    /// Convert to an error code for FFI.
    pub fn to_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Validation => 2,
            ErrorKind::Estimation => 3,
            ErrorKind::InsufficientData => 4,
            ErrorKind::Batch => 5,
            ErrorKind::Configuration => 6,
            ErrorKind::Io => 7,
        }
    }
}

impl From<std::io::Error> for YieldError {
    fn from(e: std::io::Error) -> Self {
        YieldError::Io(e.to_string())
    }
}

impl From<csv::Error> for YieldError {
    fn from(e: csv::Error) -> Self {
        YieldError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for YieldError {
    fn from(e: serde_json::Error) -> Self {
        YieldError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(YieldError::InvalidMonth { value: "13".into() }.to_code(), 2);
        assert_eq!(
            YieldError::MissingField {
                month: 2,
                field: "sm_20".into()
            }
            .to_code(),
            2
        );
        assert_eq!(
            YieldError::Estimation {
                estimator: "soil".into(),
                reason: "bad".into()
            }
            .to_code(),
            3
        );
        assert_eq!(
            YieldError::InsufficientData { needed: 1, got: 0 }.to_code(),
            4
        );
        assert_eq!(YieldError::EmptyBatch.to_code(), 5);
        assert_eq!(YieldError::InvalidModel("x".into()).to_code(), 6);
        assert_eq!(YieldError::Io("x".into()).to_code(), 7);
    }

    #[test]
    fn test_error_display() {
        let err = YieldError::MissingField {
            month: 2,
            field: "sm_20".into(),
        };
        assert_eq!(format!("{}", err), "Missing parameter for month 2: sm_20");

        let err = YieldError::InvalidMonth { value: "13".into() };
        assert_eq!(format!("{}", err), "Invalid month: 13");

        let err = YieldError::InsufficientData { needed: 1, got: 0 };
        assert_eq!(
            format!("{}", err),
            "Insufficient data: need at least 1 observations, got 0"
        );

        let err = YieldError::BatchFailed {
            failures: vec![MonthFailure {
                index: 0,
                month: Some(1),
                error: YieldError::EmptyBatch,
            }],
        };
        assert_eq!(
            format!("{}", err),
            "Failed to generate predictions: all 1 months failed"
        );
    }

    #[test]
    fn test_error_month_scope() {
        let err = YieldError::InvalidField {
            month: 7,
            field: "Humidity (%)".into(),
            value: "NaN".into(),
            reason: "must be finite".into(),
        };
        assert_eq!(err.month(), Some(7));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(YieldError::EmptyBatch.month(), None);
    }
}
