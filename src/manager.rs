//! Rust-side entry point to the native store
//!
//! Wraps a [`NativeStore`] and turns its C-shaped contract (booleans meaning
//! "request accepted", nullable receipt) into `Result`s. Outcomes of accepted
//! requests arrive as [`StoreEvent`]s on an [`EventStream`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::backend::{self, NativeStore};
use crate::config::BridgeConfig;
use crate::events::{self, names_product, EventStream, StoreEvent};
use crate::ffi::to_c_string;
use crate::ffi::types::{ProductIdList, ProductsResponse, StoreTransaction};
use crate::ledger;
use crate::storage::EntitlementStore;
use crate::StoreKitError;

/// How a single purchase request ended
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    Completed(StoreTransaction),
    Failed(String),
}

pub struct StoreKitManager {
    store: Box<dyn NativeStore>,
    initialized: AtomicBool,
    storage: Option<EntitlementStore>,
}

impl StoreKitManager {
    pub fn new(store: Box<dyn NativeStore>) -> Self {
        Self {
            store,
            initialized: AtomicBool::new(false),
            storage: None,
        }
    }

    /// Build a manager on the configured backend, with entitlement storage if
    /// a storage directory is set
    pub fn from_config(config: &BridgeConfig) -> Result<Self, StoreKitError> {
        let mut manager = Self::new(backend::from_config(config));
        if let Some(dir) = &config.storage_directory {
            manager = manager.with_storage(EntitlementStore::new(dir)?);
        }
        tracing::info!("StoreKit manager using {} backend", manager.backend_name());
        Ok(manager)
    }

    pub fn with_storage(mut self, storage: EntitlementStore) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn storage(&self) -> Option<&EntitlementStore> {
        self.storage.as_ref()
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn ensure_ready(&self) -> Result<(), StoreKitError> {
        if !self.store.available() {
            return Err(StoreKitError::Unavailable);
        }
        if !self.is_initialized() {
            return Err(StoreKitError::NotInitialized);
        }
        Ok(())
    }

    /// One-time setup of the native store. Calling it again is a no-op.
    pub fn initialize(&self) -> Result<(), StoreKitError> {
        if !self.store.available() {
            return Err(StoreKitError::Unavailable);
        }
        if self.is_initialized() {
            tracing::debug!("StoreKit already initialized");
            return Ok(());
        }
        if !self.store.init() {
            return Err(StoreKitError::Rejected { operation: "init" });
        }
        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!("StoreKit initialized ({})", self.store.name());
        Ok(())
    }

    /// Ask for product details. Duplicate ids are sent once.
    pub fn request_products(&self, product_ids: &[String]) -> Result<(), StoreKitError> {
        self.ensure_ready()?;

        let ids = ProductIdList::new(product_ids.iter().cloned());
        if ids.is_empty() {
            return Err(StoreKitError::InvalidArgument("no product ids given".to_string()));
        }
        let product_ids_json = ids
            .to_json()
            .map_err(|e| StoreKitError::Serialization(format!("Failed to serialize product IDs: {}", e)))?;
        let c_product_ids = to_c_string(&product_ids_json, "product id list")?;

        if !self.store.request_products(&c_product_ids) {
            return Err(StoreKitError::Rejected {
                operation: "request_products",
            });
        }
        tracing::debug!("Requested {} products", ids.len());
        Ok(())
    }

    pub fn purchase_product(&self, product_id: &str) -> Result<(), StoreKitError> {
        self.ensure_ready()?;

        if product_id.is_empty() {
            return Err(StoreKitError::InvalidArgument("empty product id".to_string()));
        }
        let c_product_id = to_c_string(product_id, "product id")?;

        if !self.store.purchase_product(&c_product_id) {
            return Err(StoreKitError::Rejected {
                operation: "purchase_product",
            });
        }
        tracing::info!("Purchase started for {}", product_id);
        Ok(())
    }

    pub fn restore_purchases(&self) -> Result<(), StoreKitError> {
        self.ensure_ready()?;

        if !self.store.restore_purchases() {
            return Err(StoreKitError::Rejected {
                operation: "restore_purchases",
            });
        }
        tracing::info!("Restore started");
        Ok(())
    }

    /// Copy of the current receipt. Blocks until the native side answers.
    pub fn get_receipt_data(&self) -> Result<String, StoreKitError> {
        self.ensure_ready()?;

        let receipt = self.store.receipt_data().ok_or(StoreKitError::NoReceipt)?;
        if let Some(storage) = &self.storage {
            storage.store_receipt(&receipt)?;
        }
        Ok(receipt)
    }

    /// Acknowledge a transaction delivered by a completed purchase or restore.
    /// Unknown or already finished ids fail without reaching the native side.
    ///
    /// Once the native side has accepted the finish the call succeeds; a
    /// failure to update the entitlement record is only logged.
    pub fn finish_transaction(&self, transaction_id: &str) -> Result<(), StoreKitError> {
        self.ensure_ready()?;

        let c_transaction_id = to_c_string(transaction_id, "transaction id")?;
        let ledger = ledger::global();
        let transaction = ledger
            .take(transaction_id)
            .ok_or_else(|| StoreKitError::UnknownTransaction(transaction_id.to_string()))?;

        if !self.store.finish_transaction(&c_transaction_id) {
            ledger.reinstate(transaction);
            return Err(StoreKitError::Rejected {
                operation: "finish_transaction",
            });
        }

        tracing::info!("Finished transaction {}", transaction_id);
        if let Some(storage) = &self.storage {
            let persisted = storage
                .record_transaction(&transaction)
                .and_then(|_| storage.mark_finished(transaction_id));
            if let Err(e) = persisted {
                tracing::error!("Transaction {} finished but not recorded: {}", transaction_id, e);
            }
        }
        Ok(())
    }

    /// Delivered transactions not yet finished
    pub fn pending_transactions(&self) -> Vec<StoreTransaction> {
        ledger::global().pending()
    }

    pub fn subscribe(&self) -> EventStream {
        events::global().subscribe()
    }

    /// Persist what an event tells us about entitlements
    pub fn process_event(&self, event: &StoreEvent) -> Result<(), StoreKitError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        match event {
            StoreEvent::PurchaseCompleted(transaction) => {
                storage.record_transaction(transaction)?;
            }
            StoreEvent::RestoreCompleted(transactions) => {
                for transaction in transactions {
                    storage.record_transaction(transaction)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Read `events` until `matcher` accepts one.
    ///
    /// Every event read is passed to [`Self::process_event`]; a storage failure
    /// there is logged and does not lose the event. Events the matcher rejects
    /// are consumed and not returned.
    async fn wait_for<T>(
        &self,
        events: &mut EventStream,
        timeout: Duration,
        what: &str,
        mut matcher: impl FnMut(StoreEvent) -> Option<T>,
    ) -> Result<T, StoreKitError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = events
                .next_timeout(remaining)
                .await
                .map_err(|_| StoreKitError::Timeout(what.to_string()))?
                .ok_or_else(|| StoreKitError::Runtime("event bus closed".to_string()))?;

            if let Err(e) = self.process_event(&event) {
                tracing::error!("Failed to record {} event: {}", event.kind(), e);
            }
            if let Some(found) = matcher(event) {
                return Ok(found);
            }
        }
    }

    /// Wait for the outcome of a purchase of `product_id`.
    ///
    /// A failure matches when its message names `product_id` as a whole word.
    /// Unrelated events read while waiting are discarded; subscribe a second
    /// [`EventStream`] to observe them.
    pub async fn wait_for_purchase(
        &self,
        events: &mut EventStream,
        product_id: &str,
        timeout: Duration,
    ) -> Result<PurchaseOutcome, StoreKitError> {
        let what = format!("purchase of {}", product_id);
        self.wait_for(events, timeout, &what, |event| match event {
            StoreEvent::PurchaseCompleted(tx) if tx.product_id == product_id => {
                Some(PurchaseOutcome::Completed(tx))
            }
            StoreEvent::PurchaseFailed { message } if names_product(&message, product_id) => {
                Some(PurchaseOutcome::Failed(message))
            }
            _ => None,
        })
        .await
    }

    /// Wait for the next products response. Other events read while waiting
    /// are discarded.
    pub async fn wait_for_products(
        &self,
        events: &mut EventStream,
        timeout: Duration,
    ) -> Result<ProductsResponse, StoreKitError> {
        self.wait_for(events, timeout, "products", |event| match event {
            StoreEvent::ProductsReceived(response) => Some(response),
            _ => None,
        })
        .await
    }

    /// Wait for the next restore result. Other events read while waiting are
    /// discarded.
    pub async fn wait_for_restore(
        &self,
        events: &mut EventStream,
        timeout: Duration,
    ) -> Result<Vec<StoreTransaction>, StoreKitError> {
        self.wait_for(events, timeout, "restore", |event| match event {
            StoreEvent::RestoreCompleted(transactions) => Some(transactions),
            _ => None,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::UnavailableStore;
    use std::ffi::CStr;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Accepts every request and counts native calls
    #[derive(Default)]
    struct CountingStore {
        calls: Arc<AtomicUsize>,
        accept_finish: bool,
    }

    impl CountingStore {
        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl NativeStore for CountingStore {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn init(&self) -> bool {
            self.hit();
            true
        }
        fn request_products(&self, _json: &CStr) -> bool {
            self.hit();
            true
        }
        fn purchase_product(&self, _id: &CStr) -> bool {
            self.hit();
            true
        }
        fn restore_purchases(&self) -> bool {
            self.hit();
            true
        }
        fn receipt_data(&self) -> Option<String> {
            self.hit();
            Some("receipt".to_string())
        }
        fn finish_transaction(&self, _id: &CStr) -> bool {
            self.hit();
            self.accept_finish
        }
    }

    fn counting(accept_finish: bool) -> (StoreKitManager, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = CountingStore {
            calls: calls.clone(),
            accept_finish,
        };
        (StoreKitManager::new(Box::new(store)), calls)
    }

    #[test]
    fn test_everything_fails_before_initialize() {
        let (manager, calls) = counting(true);

        assert!(matches!(
            manager.request_products(&["a".to_string()]),
            Err(StoreKitError::NotInitialized)
        ));
        assert!(matches!(manager.purchase_product("a"), Err(StoreKitError::NotInitialized)));
        assert!(matches!(manager.restore_purchases(), Err(StoreKitError::NotInitialized)));
        assert!(matches!(manager.get_receipt_data(), Err(StoreKitError::NotInitialized)));
        assert!(matches!(manager.finish_transaction("t"), Err(StoreKitError::NotInitialized)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_initialize_once() {
        let (manager, calls) = counting(true);
        manager.initialize().unwrap();
        manager.initialize().unwrap();
        assert!(manager.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unavailable_platform() {
        let manager = StoreKitManager::new(Box::new(UnavailableStore));
        assert!(matches!(manager.initialize(), Err(StoreKitError::Unavailable)));
        assert!(matches!(manager.purchase_product("a"), Err(StoreKitError::Unavailable)));
    }

    #[test]
    fn test_invalid_arguments_never_reach_native() {
        let (manager, calls) = counting(true);
        manager.initialize().unwrap();

        assert!(matches!(manager.request_products(&[]), Err(StoreKitError::InvalidArgument(_))));
        assert!(matches!(manager.purchase_product(""), Err(StoreKitError::InvalidArgument(_))));
        assert!(matches!(
            manager.purchase_product("bad\0id"),
            Err(StoreKitError::InvalidArgument(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_finish_unknown_transaction() {
        let (manager, calls) = counting(true);
        manager.initialize().unwrap();

        let err = manager.finish_transaction("manager-test-never-delivered").unwrap_err();
        assert!(matches!(err, StoreKitError::UnknownTransaction(id) if id == "manager-test-never-delivered"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_refused_finish_keeps_transaction_pending() {
        let (manager, _calls) = counting(false);
        manager.initialize().unwrap();

        let tx = StoreTransaction {
            transaction_id: "manager-test-refused".to_string(),
            product_id: "p".to_string(),
            purchase_date: chrono::Utc::now(),
            original_transaction_id: None,
            state: Default::default(),
        };
        ledger::global().record(&tx);

        assert!(matches!(
            manager.finish_transaction("manager-test-refused"),
            Err(StoreKitError::Rejected { operation: "finish_transaction" })
        ));
        assert!(ledger::global().contains("manager-test-refused"));
        ledger::global().take("manager-test-refused");
    }

    fn transaction(id: &str, product_id: &str) -> StoreTransaction {
        StoreTransaction {
            transaction_id: id.to_string(),
            product_id: product_id.to_string(),
            purchase_date: chrono::Utc::now(),
            original_transaction_id: None,
            state: Default::default(),
        }
    }

    /// Storage whose record file has been replaced by a directory, so every
    /// read fails
    fn broken_storage(dir: &tempfile::TempDir) -> EntitlementStore {
        let storage = EntitlementStore::new(dir.path()).unwrap();
        std::fs::create_dir(dir.path().join("storekit_entitlements.json")).unwrap();
        assert!(storage.load().is_err());
        storage
    }

    #[test]
    fn test_finish_succeeds_when_storage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, calls) = counting(true);
        let manager = manager.with_storage(broken_storage(&dir));
        manager.initialize().unwrap();

        ledger::global().record(&transaction("manager-test-broken-storage", "p"));

        manager.finish_transaction("manager-test-broken-storage").unwrap();
        assert!(!ledger::global().contains("manager-test-broken-storage"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            manager.finish_transaction("manager-test-broken-storage"),
            Err(StoreKitError::UnknownTransaction(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_returns_event_when_storage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _calls) = counting(true);
        let manager = manager.with_storage(broken_storage(&dir));

        let bus = crate::events::EventBus::new();
        let mut events = bus.subscribe();
        let tx = transaction("manager-test-unsaved", "com.app.unsaved");
        bus.publish(StoreEvent::PurchaseCompleted(tx.clone()));

        let outcome = manager
            .wait_for_purchase(&mut events, "com.app.unsaved", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, PurchaseOutcome::Completed(tx));
    }

    #[tokio::test]
    async fn test_wait_for_purchase_skips_failure_of_longer_id() {
        let (manager, _calls) = counting(true);
        let bus = crate::events::EventBus::new();
        let mut events = bus.subscribe();

        bus.publish(StoreEvent::PurchaseFailed {
            message: "Purchase of com.app.pro.max cancelled by user".to_string(),
        });
        let tx = transaction("manager-test-prefix", "com.app.pro");
        bus.publish(StoreEvent::PurchaseCompleted(tx.clone()));

        let outcome = manager
            .wait_for_purchase(&mut events, "com.app.pro", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, PurchaseOutcome::Completed(tx));
        assert!(events.try_next().is_none());
    }

    #[test]
    fn test_receipt_is_copied_out() {
        let (manager, _calls) = counting(true);
        manager.initialize().unwrap();
        assert_eq!(manager.get_receipt_data().unwrap(), "receipt");
    }
}
