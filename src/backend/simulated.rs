//! In-process stand-in for the native StoreKit library
//!
//! Answers requests from the bridge runtime after a short delay by calling the
//! real `extern "C"` callbacks, exactly as the Objective-C side would. Failure
//! messages always name the product so callers can correlate them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;
use std::time::Duration;

use super::NativeStore;
use crate::config::BridgeConfig;
use crate::ffi::callbacks;
use crate::ffi::runtime;
use crate::ffi::types::{Product, ProductIdList, ProductsResponse, StoreTransaction, TransactionState};

#[derive(Debug, Default)]
struct SimulatedState {
    initialized: bool,
    /// Every successful purchase, in order
    history: Vec<StoreTransaction>,
    /// Delivered but not yet finished, keyed by transaction id
    unfinished: HashMap<String, StoreTransaction>,
    receipt: Option<String>,
}

pub struct SimulatedStore {
    bundle_id: String,
    catalog: HashMap<String, Product>,
    declined: HashSet<String>,
    latency: Duration,
    state: Arc<Mutex<SimulatedState>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptBody<'a> {
    bundle_id: &'a str,
    in_app: &'a [StoreTransaction],
}

#[derive(Serialize)]
struct SignedReceipt<'a> {
    receipt: ReceiptBody<'a>,
    signature: String,
}

impl SimulatedStore {
    pub fn new(bundle_id: impl Into<String>, products: Vec<Product>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            catalog: products
                .into_iter()
                .map(|p| (p.product_id.clone(), p))
                .collect(),
            declined: HashSet::new(),
            latency: Duration::from_millis(crate::DEFAULT_CALLBACK_LATENCY_MS),
            state: Arc::new(Mutex::new(SimulatedState::default())),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.bundle_id.clone(), config.products())
            .with_declined(config.declined_products.iter().cloned())
            .with_latency(Duration::from_millis(config.callback_latency_ms))
    }

    /// Purchases of these products fail as if the user cancelled
    pub fn with_declined<I: IntoIterator<Item = String>>(mut self, product_ids: I) -> Self {
        self.declined.extend(product_ids);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Run `deliver` on the bridge runtime after the configured latency
    fn schedule<F>(&self, deliver: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let latency = self.latency;
        match runtime::spawn(async move {
            tokio::time::sleep(latency).await;
            deliver();
        }) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Simulated store cannot schedule delivery: {}", e);
                false
            }
        }
    }
}

fn invoke(callback: extern "C" fn(*const c_char), payload: String) {
    match CString::new(payload) {
        Ok(c_payload) => callback(c_payload.as_ptr()),
        Err(e) => tracing::error!("Simulated payload contains NUL: {}", e),
    }
}

fn new_transaction_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Base64 of the purchase history plus a SHA-256 over it. Deterministic for a
/// given history, so the receipt only changes when a purchase lands.
fn build_receipt(bundle_id: &str, history: &[StoreTransaction]) -> Option<String> {
    let body = ReceiptBody {
        bundle_id,
        in_app: history,
    };
    let body_json = serde_json::to_vec(&body).ok()?;
    let signature = hex::encode(Sha256::digest(&body_json));
    let signed = serde_json::to_vec(&SignedReceipt {
        receipt: body,
        signature,
    })
    .ok()?;
    Some(STANDARD.encode(signed))
}

impl NativeStore for SimulatedStore {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn init(&self) -> bool {
        let mut state = self.state.lock();
        if state.initialized {
            tracing::debug!("Simulated store already initialized");
        } else {
            tracing::info!("Simulated store initialized for {}", self.bundle_id);
            state.initialized = true;
        }
        true
    }

    fn request_products(&self, product_ids_json: &CStr) -> bool {
        if !self.is_initialized() {
            return false;
        }
        let ids = match product_ids_json
            .to_str()
            .map_err(|e| e.to_string())
            .and_then(|json| ProductIdList::from_json(json).map_err(|e| e.to_string()))
        {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Simulated store rejected product request: {}", e);
                return false;
            }
        };

        let mut response = ProductsResponse::default();
        for id in ids.iter() {
            match self.catalog.get(id) {
                Some(product) => response.products.push(product.clone()),
                None => response.invalid_product_ids.push(id.clone()),
            }
        }

        self.schedule(move || match serde_json::to_string(&response) {
            Ok(json) => invoke(callbacks::on_products_received, json),
            Err(e) => tracing::error!("Failed to serialize products: {}", e),
        })
    }

    fn purchase_product(&self, product_id: &CStr) -> bool {
        if !self.is_initialized() {
            return false;
        }
        let product_id = match product_id.to_str() {
            Ok(id) if !id.is_empty() => id.to_string(),
            _ => return false,
        };

        let known = self.catalog.contains_key(&product_id);
        let declined = self.declined.contains(&product_id);
        let bundle_id = self.bundle_id.clone();
        let state = self.state.clone();

        self.schedule(move || {
            if !known {
                invoke(
                    callbacks::on_purchase_failed,
                    format!("Unknown product: {}", product_id),
                );
                return;
            }
            if declined {
                invoke(
                    callbacks::on_purchase_failed,
                    format!("Purchase of {} cancelled by user", product_id),
                );
                return;
            }

            let transaction = StoreTransaction {
                transaction_id: new_transaction_id(),
                product_id,
                purchase_date: Utc::now(),
                original_transaction_id: None,
                state: TransactionState::Purchased,
            };
            {
                let mut state = state.lock();
                state.history.push(transaction.clone());
                state
                    .unfinished
                    .insert(transaction.transaction_id.clone(), transaction.clone());
                state.receipt = build_receipt(&bundle_id, &state.history);
            }
            match serde_json::to_string(&transaction) {
                Ok(json) => invoke(callbacks::on_purchase_completed, json),
                Err(e) => tracing::error!("Failed to serialize transaction: {}", e),
            }
        })
    }

    fn restore_purchases(&self) -> bool {
        if !self.is_initialized() {
            return false;
        }
        let state = self.state.clone();

        self.schedule(move || {
            let restored: Vec<StoreTransaction> = {
                let mut state = state.lock();
                let restored: Vec<StoreTransaction> = state
                    .history
                    .iter()
                    .map(|original| StoreTransaction {
                        transaction_id: new_transaction_id(),
                        product_id: original.product_id.clone(),
                        purchase_date: Utc::now(),
                        original_transaction_id: Some(original.transaction_id.clone()),
                        state: TransactionState::Restored,
                    })
                    .collect();
                for tx in &restored {
                    state.unfinished.insert(tx.transaction_id.clone(), tx.clone());
                }
                restored
            };
            match serde_json::to_string(&restored) {
                Ok(json) => invoke(callbacks::on_restore_completed, json),
                Err(e) => tracing::error!("Failed to serialize restored transactions: {}", e),
            }
        })
    }

    fn receipt_data(&self) -> Option<String> {
        let state = self.state.lock();
        if !state.initialized {
            return None;
        }
        state.receipt.clone()
    }

    fn finish_transaction(&self, transaction_id: &CStr) -> bool {
        let mut state = self.state.lock();
        if !state.initialized {
            return false;
        }
        match transaction_id.to_str() {
            Ok(id) => state.unfinished.remove(id).is_some(),
            Err(_) => false,
        }
    }
}
