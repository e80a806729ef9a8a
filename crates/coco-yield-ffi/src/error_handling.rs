//! Error reporting for the `coco_*` entry points.
//!
//! Every entry point takes a nullable `CocoError` out-parameter. It is reset
//! to success on entry and filled with the error code and message of the
//! first failure. Panics are caught here and never cross into the host.

use crate::types::{CocoError, ErrorCode};
use coco_yield_core::YieldError;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Reset `out_error` to success; a null pointer is ignored.
///
/// # Safety
/// `out_error` must be null or point to a writable `CocoError`.
#[inline]
pub unsafe fn init_error(out_error: *mut CocoError) {
    if let Some(error) = out_error.as_mut() {
        *error = CocoError::success();
    }
}

/// Record `code` and `message` in `out_error`; a null pointer is ignored.
///
/// # Safety
/// `out_error` must be null or point to a writable `CocoError`.
#[inline]
pub unsafe fn set_error(out_error: *mut CocoError, code: ErrorCode, message: &str) {
    if let Some(error) = out_error.as_mut() {
        error.set_error(code, message);
    }
}

/// Report [`ErrorCode::NullPointer`] if any required argument is null.
///
/// Returns true when the call must stop.
///
/// # Safety
/// `out_error` must be null or point to a writable `CocoError`.
#[inline]
pub unsafe fn check_null_pointers(
    out_error: *mut CocoError,
    ptrs: &[*const core::ffi::c_void],
) -> bool {
    let missing = ptrs.iter().any(|p| p.is_null());
    if missing {
        set_error(out_error, ErrorCode::NullPointer, "required argument is null");
    }
    missing
}

/// Failure raised inside an FFI body.
#[derive(Debug)]
pub enum FfiFailure {
    Core(YieldError),
    Boundary(ErrorCode, String),
}

impl From<YieldError> for FfiFailure {
    fn from(e: YieldError) -> Self {
        FfiFailure::Core(e)
    }
}

/// Run an entry point body, translating its failure into `out_error`.
///
/// Engine errors map onto their [`ErrorCode`]; a panic becomes
/// [`ErrorCode::PanicCaught`]. Returns `None` on any failure.
///
/// # Safety
/// `out_error` must be null or point to a writable `CocoError`.
pub unsafe fn ffi_try<F, T>(out_error: *mut CocoError, f: F) -> Option<T>
where
    F: FnOnce() -> Result<T, FfiFailure>,
{
    init_error(out_error);

    let result = catch_unwind(AssertUnwindSafe(f));

    match result {
        Ok(Ok(value)) => Some(value),
        Ok(Err(FfiFailure::Core(e))) => {
            set_error(out_error, ErrorCode::from(&e), &e.to_string());
            None
        }
        Ok(Err(FfiFailure::Boundary(code, message))) => {
            set_error(out_error, code, &message);
            None
        }
        Err(_) => {
            set_error(out_error, ErrorCode::PanicCaught, "Panic in Rust code");
            None
        }
    }
}

/// [`ffi_try`] for bodies with no value; true on success.
///
/// # Safety
/// `out_error` must be null or point to a writable `CocoError`.
pub unsafe fn ffi_bool<F>(out_error: *mut CocoError, f: F) -> bool
where
    F: FnOnce() -> Result<(), FfiFailure>,
{
    ffi_try(out_error, f).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_error() {
        let mut error = CocoError::default();
        error.set_error(ErrorCode::IoError, "stale");
        unsafe {
            init_error(&mut error);
        }
        assert_eq!(error.code, ErrorCode::Success);
    }

    #[test]
    fn test_check_null_pointers() {
        let mut error = CocoError::default();
        let value = 1.0f64;
        let present = &value as *const f64 as *const core::ffi::c_void;
        unsafe {
            assert!(!check_null_pointers(&mut error, &[present]));
            assert!(check_null_pointers(&mut error, &[present, std::ptr::null()]));
        }
        assert_eq!(error.code, ErrorCode::NullPointer);
        let message = unsafe { std::ffi::CStr::from_ptr(error.message.as_ptr()) };
        assert_eq!(message.to_str().unwrap(), "required argument is null");

        unsafe {
            assert!(check_null_pointers(std::ptr::null_mut(), &[std::ptr::null()]));
        }
    }

    #[test]
    fn test_ffi_try_success() {
        let mut error = CocoError::default();
        let result = unsafe { ffi_try(&mut error, || Ok::<_, FfiFailure>(42)) };
        assert_eq!(result, Some(42));
        assert_eq!(error.code, ErrorCode::Success);
    }

    #[test]
    fn test_ffi_try_maps_core_error() {
        let mut error = CocoError::default();
        let result = unsafe {
            ffi_try(&mut error, || {
                Err::<i32, FfiFailure>(YieldError::MissingField {
                    month: 2,
                    field: "sm_20".to_string(),
                }
                .into())
            })
        };
        assert_eq!(result, None);
        assert_eq!(error.code, ErrorCode::ValidationError);
    }

    #[test]
    fn test_ffi_try_catches_panic() {
        let mut error = CocoError::default();
        let ok = unsafe { ffi_bool(&mut error, || panic!("boom")) };
        assert!(!ok);
        assert_eq!(error.code, ErrorCode::PanicCaught);
    }

    #[test]
    fn test_null_error_pointer_is_tolerated() {
        let result = unsafe {
            ffi_try(std::ptr::null_mut(), || {
                Err::<(), FfiFailure>(YieldError::EmptyBatch.into())
            })
        };
        assert_eq!(result, None);
    }
}
