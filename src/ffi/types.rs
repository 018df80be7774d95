//! FFI data types and JSON schemas
//!
//! Everything the native side hands back through a callback is JSON text.
//! Keys are camelCase to match what the Objective-C layer emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Product requests
// ============================================================================

/// Product identifiers passed to `request_products`, serialized as a JSON array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductIdList(pub Vec<String>);

impl ProductIdList {
    /// Build a list from the given ids, dropping duplicates but keeping first-seen order
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        let ids = ids
            .into_iter()
            .map(Into::into)
            .filter(|id: &String| seen.insert(id.clone()))
            .collect();
        Self(ids)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let ids: Vec<String> = serde_json::from_str(json)?;
        Ok(Self::new(ids))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

// ============================================================================
// Products
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Localized price as a decimal string, e.g. "1.99"
    pub price: String,
    pub currency_code: String,
    /// ISO 8601 period for subscriptions, e.g. "P1M"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_period: Option<String>,
}

/// Payload of `on_products_received`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductsResponse {
    #[serde(default)]
    pub products: Vec<Product>,
    /// Requested ids the store could not resolve
    #[serde(default)]
    pub invalid_product_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProductsPayload {
    Response(ProductsResponse),
    Bare(Vec<Product>),
}

impl ProductsResponse {
    /// Parse a products payload. A bare array of products is accepted as well.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(match serde_json::from_str(json)? {
            ProductsPayload::Response(response) => response,
            ProductsPayload::Bare(products) => ProductsResponse {
                products,
                invalid_product_ids: Vec::new(),
            },
        })
    }

    /// Every id this response accounts for, valid or not
    pub fn all_ids(&self) -> Vec<&str> {
        self.products
            .iter()
            .map(|p| p.product_id.as_str())
            .chain(self.invalid_product_ids.iter().map(String::as_str))
            .collect()
    }

    pub fn find(&self, product_id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.product_id == product_id)
    }
}

// ============================================================================
// Transactions
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    #[default]
    Purchased,
    Restored,
}

/// Payload of `on_purchase_completed`, and element of `on_restore_completed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreTransaction {
    pub transaction_id: String,
    pub product_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub purchase_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_transaction_id: Option<String>,
    #[serde(default)]
    pub state: TransactionState,
}

impl StoreTransaction {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn list_from_json(json: &str) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_restored(&self) -> bool {
        self.state == TransactionState::Restored
    }
}
