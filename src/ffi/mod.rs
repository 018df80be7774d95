//! FFI module for the native StoreKit library
//!
//! This module holds everything that crosses the C boundary:
//! - `native`: declarations of the six entry points the Objective-C side implements
//! - `callbacks`: the four `#[no_mangle]` functions the native side calls back into
//! - `types`: JSON payloads exchanged in both directions
//! - `runtime`: the process-wide Tokio runtime used for asynchronous delivery

pub mod callbacks;
pub mod native;
pub mod runtime;
pub mod types;

pub use callbacks::*;
pub use types::*;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Convert a C string pointer to an owned Rust String
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated buffer valid for the call.
pub(crate) unsafe fn c_str_to_string(ptr: *const c_char) -> Result<String, String> {
    if ptr.is_null() {
        return Err("Null pointer".to_string());
    }
    let c_str = CStr::from_ptr(ptr);
    c_str
        .to_str()
        .map(|s| s.to_string())
        .map_err(|e| format!("Invalid UTF-8: {}", e))
}

/// Convert a Rust string to a C string, rejecting interior NUL bytes
pub(crate) fn to_c_string(value: &str, what: &str) -> Result<CString, crate::StoreKitError> {
    CString::new(value).map_err(|e| {
        crate::StoreKitError::InvalidArgument(format!("{} contains a NUL byte: {}", what, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_pointer_is_rejected() {
        let result = unsafe { c_str_to_string(std::ptr::null()) };
        assert_eq!(result, Err("Null pointer".to_string()));
    }

    #[test]
    fn test_c_string_round_trip() {
        let c = to_c_string("com.example.item", "product id").unwrap();
        let back = unsafe { c_str_to_string(c.as_ptr()) }.unwrap();
        assert_eq!(back, "com.example.item");
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let bytes = CString::new(vec![0xffu8, 0xfe]).unwrap();
        let result = unsafe { c_str_to_string(bytes.as_ptr()) };
        assert!(result.unwrap_err().starts_with("Invalid UTF-8"));
    }

    #[test]
    fn test_interior_nul_is_invalid_argument() {
        let err = to_c_string("bad\0id", "product id").unwrap_err();
        assert!(matches!(err, crate::StoreKitError::InvalidArgument(_)));
    }
}
