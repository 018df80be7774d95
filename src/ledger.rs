//! Transactions delivered by the native side and not yet finished
//!
//! `finish_transaction` is only meaningful for an id the native side handed
//! back through `on_purchase_completed` or `on_restore_completed`. The ledger
//! remembers those ids until they are finished.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::ffi::types::StoreTransaction;

lazy_static! {
    static ref GLOBAL_LEDGER: TransactionLedger = TransactionLedger::new();
}

/// The ledger the `extern "C"` callbacks record into
pub fn global() -> &'static TransactionLedger {
    &GLOBAL_LEDGER
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    transaction: StoreTransaction,
    delivered_at: DateTime<Utc>,
}

pub struct TransactionLedger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Remember a delivered transaction. A repeated delivery keeps the first entry.
    pub fn record(&self, transaction: &StoreTransaction) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&transaction.transaction_id) {
            tracing::debug!("Transaction {} already recorded", transaction.transaction_id);
            return false;
        }
        entries.insert(
            transaction.transaction_id.clone(),
            LedgerEntry {
                transaction: transaction.clone(),
                delivered_at: Utc::now(),
            },
        );
        true
    }

    pub fn contains(&self, transaction_id: &str) -> bool {
        self.entries.lock().contains_key(transaction_id)
    }

    /// Remove a transaction so that a concurrent finish of the same id fails
    pub fn take(&self, transaction_id: &str) -> Option<StoreTransaction> {
        self.entries
            .lock()
            .remove(transaction_id)
            .map(|entry| entry.transaction)
    }

    /// Put back a transaction whose finish the native side refused
    pub fn reinstate(&self, transaction: StoreTransaction) {
        self.record(&transaction);
    }

    /// Unfinished transactions, oldest delivery first
    pub fn pending(&self) -> Vec<StoreTransaction> {
        let entries = self.entries.lock();
        let mut pending: Vec<&LedgerEntry> = entries.values().collect();
        pending.sort_by_key(|entry| entry.delivered_at);
        pending.into_iter().map(|entry| entry.transaction.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for TransactionLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::types::TransactionState;

    fn tx(id: &str) -> StoreTransaction {
        StoreTransaction {
            transaction_id: id.to_string(),
            product_id: "pro".to_string(),
            purchase_date: Utc::now(),
            original_transaction_id: None,
            state: TransactionState::Purchased,
        }
    }

    #[test]
    fn test_record_and_take() {
        let ledger = TransactionLedger::new();
        assert!(ledger.record(&tx("t1")));
        assert!(!ledger.record(&tx("t1")));
        assert!(ledger.contains("t1"));

        assert_eq!(ledger.take("t1").unwrap().transaction_id, "t1");
        assert!(ledger.take("t1").is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_reinstate_after_refused_finish() {
        let ledger = TransactionLedger::new();
        ledger.record(&tx("t2"));
        let taken = ledger.take("t2").unwrap();
        ledger.reinstate(taken);
        assert!(ledger.contains("t2"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_pending_lists_all_unfinished() {
        let ledger = TransactionLedger::new();
        ledger.record(&tx("a"));
        ledger.record(&tx("b"));
        let mut ids: Vec<String> = ledger.pending().into_iter().map(|t| t.transaction_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
