//! Entry points implemented by the native StoreKit library
//!
//! Only linked on macOS with the `native` feature. Every boolean means the
//! request was accepted; outcomes arrive later through [`super::callbacks`].

/// Whether the native StoreKit library is linked into this build
pub const fn is_linked() -> bool {
    cfg!(all(target_os = "macos", feature = "native"))
}

#[cfg(all(target_os = "macos", feature = "native"))]
mod sys {
    use std::os::raw::c_char;

    #[link(name = "storekit", kind = "static")]
    extern "C" {
        pub fn init_store_kit() -> bool;
        pub fn request_products(product_ids_json: *const c_char) -> bool;
        pub fn purchase_product(product_id: *const c_char) -> bool;
        pub fn restore_purchases() -> bool;
        pub fn get_receipt_data() -> *const c_char;
        pub fn finish_transaction(transaction_id: *const c_char) -> bool;
    }
}

#[cfg(all(target_os = "macos", feature = "native"))]
pub use safe::*;

#[cfg(all(target_os = "macos", feature = "native"))]
mod safe {
    use std::ffi::CStr;

    use super::sys;
    use crate::ffi::c_str_to_string;

    pub fn init_store_kit() -> bool {
        unsafe { sys::init_store_kit() }
    }

    pub fn request_products(product_ids_json: &CStr) -> bool {
        unsafe { sys::request_products(product_ids_json.as_ptr()) }
    }

    pub fn purchase_product(product_id: &CStr) -> bool {
        unsafe { sys::purchase_product(product_id.as_ptr()) }
    }

    pub fn restore_purchases() -> bool {
        unsafe { sys::restore_purchases() }
    }

    /// The returned buffer stays owned by the native side; copy it out immediately
    pub fn get_receipt_data() -> Option<String> {
        let receipt_ptr = unsafe { sys::get_receipt_data() };
        match unsafe { c_str_to_string(receipt_ptr) } {
            Ok(receipt) if !receipt.is_empty() => Some(receipt),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("No receipt from native side: {}", e);
                None
            }
        }
    }

    pub fn finish_transaction(transaction_id: &CStr) -> bool {
        unsafe { sys::finish_transaction(transaction_id.as_ptr()) }
    }
}
