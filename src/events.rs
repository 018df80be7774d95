//! Store events and the channel that carries them
//!
//! The native callbacks never call into application code. They post a
//! [`StoreEvent`] on the [`EventBus`]; the application drains an
//! [`EventStream`] from its own event loop.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::ffi::types::{ProductsResponse, StoreTransaction};
use crate::StoreKitError;

/// Outcome reported by the native side through one of the four callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    ProductsReceived(ProductsResponse),
    PurchaseCompleted(StoreTransaction),
    PurchaseFailed { message: String },
    RestoreCompleted(Vec<StoreTransaction>),
    /// A callback delivered text that did not parse
    MalformedPayload {
        callback: &'static str,
        payload: String,
        error: String,
    },
}

impl StoreEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreEvent::ProductsReceived(_) => "products_received",
            StoreEvent::PurchaseCompleted(_) => "purchase_completed",
            StoreEvent::PurchaseFailed { .. } => "purchase_failed",
            StoreEvent::RestoreCompleted(_) => "restore_completed",
            StoreEvent::MalformedPayload { .. } => "malformed_payload",
        }
    }

    /// Whether this event reports on the given product.
    ///
    /// Failures carry free text only, so they match when the message names the
    /// product as a whole word (see [`names_product`]).
    pub fn mentions_product(&self, product_id: &str) -> bool {
        match self {
            StoreEvent::ProductsReceived(response) => response.all_ids().contains(&product_id),
            StoreEvent::PurchaseCompleted(tx) => tx.product_id == product_id,
            StoreEvent::PurchaseFailed { message } => names_product(message, product_id),
            StoreEvent::RestoreCompleted(txs) => txs.iter().any(|tx| tx.product_id == product_id),
            StoreEvent::MalformedPayload { payload, .. } => payload.contains(product_id),
        }
    }
}

/// Whether `message` names `product_id` as a whole word.
///
/// Words are split on whitespace and trimmed of surrounding punctuation, so
/// `"Purchase of pro.max cancelled"` names `pro.max` but not `pro`.
pub fn names_product(message: &str, product_id: &str) -> bool {
    if product_id.is_empty() {
        return false;
    }
    message
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-')))
        .any(|word| word == product_id)
}

lazy_static! {
    static ref GLOBAL_BUS: EventBus = EventBus::new();
}

/// The bus the `extern "C"` callbacks publish on
pub fn global() -> &'static EventBus {
    &GLOBAL_BUS
}

/// Fan-out of store events to any number of subscribers
pub struct EventBus {
    subscribers: Mutex<Vec<UnboundedSender<StoreEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        EventStream { rx }
    }

    /// Send `event` to every live subscriber, dropping closed ones.
    /// Returns the number of subscribers reached.
    pub fn publish(&self, event: StoreEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.is_empty() {
            tracing::warn!("No subscriber for {} event", event.kind());
        }
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of an [`EventBus`] subscription
pub struct EventStream {
    rx: UnboundedReceiver<StoreEvent>,
}

impl EventStream {
    /// Wait for the next event. `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<StoreEvent> {
        self.rx.recv().await
    }

    /// Wait for the next event for at most `timeout`
    pub async fn next_timeout(&mut self, timeout: Duration) -> Result<Option<StoreEvent>, StoreKitError> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .map_err(|_| StoreKitError::Timeout("store event".to_string()))
    }

    /// Non-blocking poll
    pub fn try_next(&mut self) -> Option<StoreEvent> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<StoreEvent> {
        UnboundedReceiverStream::new(self.rx)
    }
}
