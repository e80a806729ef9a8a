//! FFI boundary layer for the coconut yield engine.
//!
//! This crate provides C-compatible functions over
//! [`coco_yield_core::YieldEngine`] so the engine can be embedded in a host
//! process. Every function reports failures through an optional
//! [`CocoError`] out-parameter and never unwinds across the boundary.

pub mod allocation;
pub mod conversion;
pub mod error_handling;
pub mod types;

use crate::allocation::{free_c_string, string_to_c};
use crate::conversion::{c_str_optional, c_str_required, observation_to_record};
use crate::error_handling::{check_null_pointers, ffi_bool, ffi_try, FfiFailure};
use coco_yield_core::{
    EngineConfig, EstimatorRegistry, SeasonalFactorStore, YearRequest, YieldEngine, YieldError,
};
use libc::{c_char, c_int};
use serde::Serialize;
use std::ptr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use types::*;

fn to_json<T: ?Sized + Serialize>(value: &T) -> Result<String, FfiFailure> {
    serde_json::to_string(value).map_err(|e| FfiFailure::Core(YieldError::from(e)))
}

// ============================================================================
// Engine Lifecycle
// ============================================================================

/// Create an engine.
///
/// `artifacts_path` names the estimator artifact file. `config_path` may be
/// null, in which case defaults overlaid with `COCO_YIELD_*` environment
/// variables are used. `factors_path` may be null for a neutral factor table.
///
/// Returns null on error. Free with [`coco_engine_free`].
///
/// # Safety
/// String arguments must be null or valid null-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn coco_engine_new(
    artifacts_path: *const c_char,
    config_path: *const c_char,
    factors_path: *const c_char,
    out_error: *mut CocoError,
) -> *mut CocoEngine {
    ffi_try(out_error, || {
        let artifacts_path = c_str_required(artifacts_path, "artifacts_path")?;
        let config = match c_str_optional(config_path, "config_path")? {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::from_env()?,
        };
        let store = match c_str_optional(factors_path, "factors_path")? {
            Some(path) => SeasonalFactorStore::load(path)?,
            None => SeasonalFactorStore::neutral(),
        };
        let registry = EstimatorRegistry::load(artifacts_path)?;
        let engine = YieldEngine::new(config, registry, store)?;
        Ok(Box::into_raw(Box::new(CocoEngine::new(engine))))
    })
    .unwrap_or(ptr::null_mut())
}

/// Free an engine created by [`coco_engine_new`].
///
/// # Safety
/// `engine` must be null or a pointer returned by [`coco_engine_new`] that
/// has not been freed.
#[no_mangle]
pub unsafe extern "C" fn coco_engine_free(engine: *mut CocoEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

// ============================================================================
// Prediction
// ============================================================================

/// Predict one month for `year`.
///
/// # Safety
/// `engine`, `observation` and `out_result` must be valid and non-null.
#[no_mangle]
pub unsafe extern "C" fn coco_predict_month(
    engine: *const CocoEngine,
    year: c_int,
    observation: *const CocoMonthlyObservation,
    out_result: *mut CocoPredictionResult,
    out_error: *mut CocoError,
) -> bool {
    if check_null_pointers(
        out_error,
        &[
            engine as *const core::ffi::c_void,
            observation as *const core::ffi::c_void,
            out_result as *const core::ffi::c_void,
        ],
    ) {
        return false;
    }

    ffi_bool(out_error, || {
        let record = observation_to_record(&*observation)?;
        let prediction = (*engine).engine().predict_record(&record, year)?;
        *out_result = CocoPredictionResult::from(&prediction);
        Ok(())
    })
}

/// Predict a year from a JSON request `{"year": ..., "monthly_data": [...]}`.
///
/// Returns the yearly result as a JSON string, or null on error. Free the
/// string with [`coco_free_string`].
///
/// # Safety
/// `engine` must be valid; `request_json` must be a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn coco_predict_year_json(
    engine: *const CocoEngine,
    request_json: *const c_char,
    out_error: *mut CocoError,
) -> *mut c_char {
    if check_null_pointers(out_error, &[engine as *const core::ffi::c_void]) {
        return ptr::null_mut();
    }

    ffi_try(out_error, || {
        let json = c_str_required(request_json, "request_json")?;
        let request: YearRequest =
            serde_json::from_str(json).map_err(|e| FfiFailure::Core(YieldError::from(e)))?;
        let prediction = (*engine).engine().predict_request(&request)?;
        string_to_c(&to_json(&prediction)?)
    })
    .unwrap_or(ptr::null_mut())
}

// ============================================================================
// Seasonal Factors
// ============================================================================

/// Copy the current seasonal factor table.
///
/// # Safety
/// `engine` and `out_factors` must be valid and non-null.
#[no_mangle]
pub unsafe extern "C" fn coco_get_seasonal_factors(
    engine: *const CocoEngine,
    out_factors: *mut CocoSeasonalFactors,
    out_error: *mut CocoError,
) -> bool {
    if check_null_pointers(
        out_error,
        &[
            engine as *const core::ffi::c_void,
            out_factors as *const core::ffi::c_void,
        ],
    ) {
        return false;
    }

    ffi_bool(out_error, || {
        let snapshot = (*engine).engine().store().snapshot();
        *out_factors = CocoSeasonalFactors::from(&*snapshot);
        Ok(())
    })
}

/// Recompute the seasonal factors from a history CSV and swap them in.
///
/// `out_factors` may be null. On error the previous table stays in place.
///
/// # Safety
/// `engine` must be valid; `history_path` must be a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn coco_refresh_seasonal_factors(
    engine: *const CocoEngine,
    history_path: *const c_char,
    out_factors: *mut CocoSeasonalFactors,
    out_error: *mut CocoError,
) -> bool {
    if check_null_pointers(out_error, &[engine as *const core::ffi::c_void]) {
        return false;
    }

    ffi_bool(out_error, || {
        let path = c_str_required(history_path, "history_path")?;
        let factors = (*engine).engine().refresh_from_csv(path)?;
        if !out_factors.is_null() {
            *out_factors = CocoSeasonalFactors::from(&factors);
        }
        Ok(())
    })
}

/// Persist the current seasonal factor table as JSON.
///
/// `source` may be null.
///
/// # Safety
/// `engine` must be valid; string arguments must be null or valid
/// null-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn coco_save_seasonal_factors(
    engine: *const CocoEngine,
    path: *const c_char,
    source: *const c_char,
    out_error: *mut CocoError,
) -> bool {
    if check_null_pointers(out_error, &[engine as *const core::ffi::c_void]) {
        return false;
    }

    ffi_bool(out_error, || {
        let path = c_str_required(path, "path")?;
        let source = c_str_optional(source, "source")?;
        (*engine).engine().save_seasonal_factors(path, source)?;
        Ok(())
    })
}

/// Seasonal pattern report of a history CSV as a JSON string.
///
/// The engine's factor table is not modified. Returns null on error; free the
/// string with [`coco_free_string`].
///
/// # Safety
/// `engine` must be valid; `history_path` must be a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn coco_analyze_seasonality_json(
    engine: *const CocoEngine,
    history_path: *const c_char,
    out_error: *mut CocoError,
) -> *mut c_char {
    if check_null_pointers(out_error, &[engine as *const core::ffi::c_void]) {
        return ptr::null_mut();
    }

    ffi_try(out_error, || {
        let path = c_str_required(history_path, "history_path")?;
        let analysis = (*engine).engine().analyze_seasonal_patterns(path)?;
        string_to_c(&to_json(&analysis)?)
    })
    .unwrap_or(ptr::null_mut())
}

// ============================================================================
// Memory and Process
// ============================================================================

/// Free a string returned by this library.
///
/// # Safety
/// `ptr` must be null or a string returned by this library, freed once.
#[no_mangle]
pub unsafe extern "C" fn coco_free_string(ptr: *mut c_char) {
    free_c_string(ptr);
}

/// Install a stderr log subscriber.
///
/// `filter` uses `RUST_LOG` syntax; when null or invalid, `RUST_LOG` is used,
/// then `info`. Returns false if a subscriber was already installed.
///
/// # Safety
/// `filter` must be null or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn coco_init_logging(filter: *const c_char) -> bool {
    let directive = c_str_optional(filter, "filter").ok().flatten();
    let filter = directive
        .and_then(|d| EnvFilter::try_new(d).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}

/// Library version as a static null-terminated string.
#[no_mangle]
pub extern "C" fn coco_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}
