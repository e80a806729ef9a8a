//! Memory allocation utilities for FFI functions.
//!
//! Strings handed to C are allocated with `malloc` and must be released with
//! `coco_free_string`.

use crate::error_handling::FfiFailure;
use crate::types::ErrorCode;
use core::ffi::c_char;
use libc::{free, malloc};
use std::ptr;

/// Copy a Rust string into a newly allocated, null-terminated C string.
///
/// # Safety
/// The returned pointer must be released with [`free_c_string`].
pub unsafe fn string_to_c(s: &str) -> Result<*mut c_char, FfiFailure> {
    let bytes = s.as_bytes();
    let ptr = malloc(bytes.len() + 1) as *mut c_char;
    if ptr.is_null() {
        return Err(FfiFailure::Boundary(
            ErrorCode::AllocationError,
            "Memory allocation failed".to_string(),
        ));
    }
    ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, ptr, bytes.len());
    *ptr.add(bytes.len()) = 0;
    Ok(ptr)
}

/// Free a string allocated by [`string_to_c`]. Null is ignored.
///
/// # Safety
/// `ptr` must be null or come from [`string_to_c`], and not be freed twice.
#[inline]
pub unsafe fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        free(ptr as *mut core::ffi::c_void);
    }
}
