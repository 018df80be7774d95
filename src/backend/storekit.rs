//! StoreKit backend backed by the linked Objective-C library

use std::ffi::CStr;

use super::NativeStore;
use crate::ffi::native;

#[derive(Debug, Default)]
pub struct StoreKitStore;

impl StoreKitStore {
    pub fn new() -> Self {
        Self
    }
}

impl NativeStore for StoreKitStore {
    fn name(&self) -> &'static str {
        "storekit"
    }

    fn init(&self) -> bool {
        native::init_store_kit()
    }

    fn request_products(&self, product_ids_json: &CStr) -> bool {
        native::request_products(product_ids_json)
    }

    fn purchase_product(&self, product_id: &CStr) -> bool {
        native::purchase_product(product_id)
    }

    fn restore_purchases(&self) -> bool {
        native::restore_purchases()
    }

    fn receipt_data(&self) -> Option<String> {
        native::get_receipt_data()
    }

    fn finish_transaction(&self, transaction_id: &CStr) -> bool {
        native::finish_transaction(transaction_id)
    }
}
