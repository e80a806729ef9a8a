//! Parameter conversion utilities for FFI functions.
//!
//! Missing values cross the boundary as NaN (numbers) or null (strings).

use crate::error_handling::FfiFailure;
use crate::types::{CocoMonthlyObservation, ErrorCode};
use coco_yield_core::RawMonthlyRecord;
use core::ffi::{c_char, c_double};
use std::ffi::CStr;

/// Convert a `c_double` to `Option<f64>`, where NaN becomes None.
#[inline]
pub fn nan_to_option(value: c_double) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

/// Read an optional C string; null is `None`, invalid UTF-8 is an error.
///
/// # Safety
/// The pointer must be null or point to a valid null-terminated string.
pub unsafe fn c_str_optional<'a>(ptr: *const c_char, param: &str) -> Result<Option<&'a str>, FfiFailure> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr).to_str().map(Some).map_err(|_| {
        FfiFailure::Boundary(
            ErrorCode::InvalidUtf8,
            format!("{} is not valid UTF-8", param),
        )
    })
}

/// Read a required C string.
///
/// # Safety
/// The pointer must be null or point to a valid null-terminated string.
pub unsafe fn c_str_required<'a>(ptr: *const c_char, param: &str) -> Result<&'a str, FfiFailure> {
    c_str_optional(ptr, param)?.ok_or_else(|| {
        FfiFailure::Boundary(ErrorCode::NullPointer, format!("{} must not be null", param))
    })
}

/// Convert a C observation into a raw record for validation.
///
/// A null `soil_type` surfaces as a missing field during validation.
///
/// # Safety
/// String pointers in `obs` must be null or valid null-terminated strings.
pub unsafe fn observation_to_record(
    obs: &CocoMonthlyObservation,
) -> Result<RawMonthlyRecord, FfiFailure> {
    Ok(RawMonthlyRecord {
        month: Some(i64::from(obs.month)),
        sm_10: nan_to_option(obs.sm_10),
        sm_20: nan_to_option(obs.sm_20),
        sm_30: nan_to_option(obs.sm_30),
        age: nan_to_option(obs.age),
        soil_type: c_str_optional(obs.soil_type, "soil_type")?.map(str::to_string),
        temperature_c: nan_to_option(obs.temperature_c),
        humidity_pct: nan_to_option(obs.humidity_pct),
        rainfall_mm: nan_to_option(obs.rainfall_mm),
        weather_description: c_str_optional(obs.weather_description, "weather_description")?
            .map(str::to_string),
    })
}
