//! Native store backends
//!
//! [`NativeStore`] mirrors the C surface: booleans for "request accepted",
//! `None` for a missing receipt. The manager turns these into `Result`s.

pub mod simulated;
#[cfg(all(target_os = "macos", feature = "native"))]
pub mod storekit;

pub use simulated::SimulatedStore;
#[cfg(all(target_os = "macos", feature = "native"))]
pub use storekit::StoreKitStore;

use std::ffi::CStr;

use crate::config::{BackendKind, BridgeConfig};
use crate::ffi::native;

pub trait NativeStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// `false` when this platform has no store at all
    fn available(&self) -> bool {
        true
    }

    fn init(&self) -> bool;
    fn request_products(&self, product_ids_json: &CStr) -> bool;
    fn purchase_product(&self, product_id: &CStr) -> bool;
    fn restore_purchases(&self) -> bool;
    fn receipt_data(&self) -> Option<String>;
    fn finish_transaction(&self, transaction_id: &CStr) -> bool;
}

/// Stand-in for platforms without StoreKit. Rejects every request.
#[derive(Debug, Default)]
pub struct UnavailableStore;

impl NativeStore for UnavailableStore {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn available(&self) -> bool {
        false
    }

    fn init(&self) -> bool {
        false
    }

    fn request_products(&self, _product_ids_json: &CStr) -> bool {
        false
    }

    fn purchase_product(&self, _product_id: &CStr) -> bool {
        false
    }

    fn restore_purchases(&self) -> bool {
        false
    }

    fn receipt_data(&self) -> Option<String> {
        None
    }

    fn finish_transaction(&self, _transaction_id: &CStr) -> bool {
        false
    }
}

/// Whether a real StoreKit backend was compiled in
pub fn native_available() -> bool {
    native::is_linked()
}

fn native_store() -> Box<dyn NativeStore> {
    #[cfg(all(target_os = "macos", feature = "native"))]
    {
        Box::new(StoreKitStore::new())
    }

    #[cfg(not(all(target_os = "macos", feature = "native")))]
    {
        tracing::warn!("StoreKit is only available on macOS with the `native` feature");
        Box::new(UnavailableStore)
    }
}

/// Pick the backend named by the configuration
pub fn from_config(config: &BridgeConfig) -> Box<dyn NativeStore> {
    match config.backend {
        BackendKind::Native | BackendKind::Auto => native_store(),
        BackendKind::Simulated => Box::new(SimulatedStore::from_config(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_unavailable_store_rejects_everything() {
        let store = UnavailableStore;
        let id = CString::new("pro").unwrap();
        assert!(!store.available());
        assert!(!store.init());
        assert!(!store.request_products(&id));
        assert!(!store.purchase_product(&id));
        assert!(!store.restore_purchases());
        assert!(store.receipt_data().is_none());
        assert!(!store.finish_transaction(&id));
    }

    #[test]
    fn test_from_config_selects_simulated() {
        let config = BridgeConfig {
            backend: BackendKind::Simulated,
            ..BridgeConfig::default()
        };
        assert_eq!(from_config(&config).name(), "simulated");
    }

    #[cfg(not(all(target_os = "macos", feature = "native")))]
    #[test]
    fn test_auto_without_native_is_unavailable() {
        let store = from_config(&BridgeConfig::default());
        assert!(!native_available());
        assert!(!store.available());
    }
}
