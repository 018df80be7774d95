//! Callbacks invoked by the native StoreKit library
//!
//! The native side calls these from its own threads. Each one copies its
//! argument into an owned String before returning, records delivered
//! transactions in the ledger and posts a [`StoreEvent`] on the global bus.

use std::os::raw::c_char;

use super::c_str_to_string;
use super::types::{ProductsResponse, StoreTransaction};
use crate::events::{self, StoreEvent};
use crate::ledger;

fn read_argument(callback: &'static str, ptr: *const c_char) -> Option<String> {
    match unsafe { c_str_to_string(ptr) } {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!("{}: dropping argument ({})", callback, e);
            None
        }
    }
}

fn malformed(callback: &'static str, payload: String, error: serde_json::Error) -> StoreEvent {
    tracing::error!("{}: failed to parse payload: {}", callback, error);
    StoreEvent::MalformedPayload {
        callback,
        payload,
        error: error.to_string(),
    }
}

#[no_mangle]
pub extern "C" fn on_products_received(products_json: *const c_char) {
    const CALLBACK: &str = "on_products_received";
    let Some(payload) = read_argument(CALLBACK, products_json) else {
        return;
    };

    let event = match ProductsResponse::from_json(&payload) {
        Ok(response) => {
            tracing::info!(
                "Products received: {} valid, {} invalid",
                response.products.len(),
                response.invalid_product_ids.len()
            );
            StoreEvent::ProductsReceived(response)
        }
        Err(e) => malformed(CALLBACK, payload, e),
    };
    events::global().publish(event);
}

#[no_mangle]
pub extern "C" fn on_purchase_completed(transaction_json: *const c_char) {
    const CALLBACK: &str = "on_purchase_completed";
    let Some(payload) = read_argument(CALLBACK, transaction_json) else {
        return;
    };

    let event = match StoreTransaction::from_json(&payload) {
        Ok(transaction) => {
            tracing::info!(
                "Purchase completed: {} (transaction {})",
                transaction.product_id,
                transaction.transaction_id
            );
            ledger::global().record(&transaction);
            StoreEvent::PurchaseCompleted(transaction)
        }
        Err(e) => malformed(CALLBACK, payload, e),
    };
    events::global().publish(event);
}

#[no_mangle]
pub extern "C" fn on_purchase_failed(error_message: *const c_char) {
    let Some(message) = read_argument("on_purchase_failed", error_message) else {
        return;
    };

    tracing::error!("Purchase failed: {}", message);
    events::global().publish(StoreEvent::PurchaseFailed { message });
}

#[no_mangle]
pub extern "C" fn on_restore_completed(transactions_json: *const c_char) {
    const CALLBACK: &str = "on_restore_completed";
    let Some(payload) = read_argument(CALLBACK, transactions_json) else {
        return;
    };

    let event = match StoreTransaction::list_from_json(&payload) {
        Ok(transactions) => {
            tracing::info!("Restore completed: {} transactions", transactions.len());
            let ledger = ledger::global();
            for transaction in &transactions {
                ledger.record(transaction);
            }
            StoreEvent::RestoreCompleted(transactions)
        }
        Err(e) => malformed(CALLBACK, payload, e),
    };
    events::global().publish(event);
}
