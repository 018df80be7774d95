//! Persistent entitlements
//!
//! Keeps the purchases the app has been told about, plus the last receipt,
//! in a JSON file so entitlements survive restarts. Writes go to a temp file
//! first and are renamed into place.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ffi::types::StoreTransaction;

const ENTITLEMENTS_FILENAME: &str = "storekit_entitlements.json";
const RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entitlement {
    pub product_id: String,
    pub transaction_id: String,
    pub original_transaction_id: Option<String>,
    pub purchased_at: DateTime<Utc>,
    pub restored: bool,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&StoreTransaction> for Entitlement {
    fn from(tx: &StoreTransaction) -> Self {
        Self {
            product_id: tx.product_id.clone(),
            transaction_id: tx.transaction_id.clone(),
            original_transaction_id: tx.original_transaction_id.clone(),
            purchased_at: tx.purchase_date,
            restored: tx.is_restored(),
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementRecord {
    pub version: u32,
    pub entitlements: Vec<Entitlement>,
    pub receipt_data: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for EntitlementRecord {
    fn default() -> Self {
        Self {
            version: RECORD_VERSION,
            entitlements: Vec::new(),
            receipt_data: None,
            updated_at: Utc::now(),
        }
    }
}

impl EntitlementRecord {
    pub fn owns(&self, product_id: &str) -> bool {
        self.entitlements.iter().any(|e| e.product_id == product_id)
    }

    pub fn find(&self, transaction_id: &str) -> Option<&Entitlement> {
        self.entitlements
            .iter()
            .find(|e| e.transaction_id == transaction_id)
    }
}

/// File-backed entitlement storage
pub struct EntitlementStore {
    storage_dir: PathBuf,
    // serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl EntitlementStore {
    pub fn new(storage_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();

        if !storage_dir.exists() {
            fs::create_dir_all(&storage_dir)
                .map_err(|e| StorageError::Io(format!("Failed to create storage directory: {}", e)))?;
        }

        tracing::info!("Entitlement storage at: {}", storage_dir.display());

        Ok(Self {
            storage_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn record_path(&self) -> PathBuf {
        self.storage_dir.join(ENTITLEMENTS_FILENAME)
    }

    fn temp_path(&self) -> PathBuf {
        self.storage_dir.join(format!("{}.tmp", ENTITLEMENTS_FILENAME))
    }

    /// Load the record; a missing file yields an empty one
    pub fn load(&self) -> Result<EntitlementRecord, StorageError> {
        let path = self.record_path();
        if !path.exists() {
            tracing::debug!("No saved entitlements found, starting fresh");
            return Ok(EntitlementRecord::default());
        }

        let json = fs::read_to_string(&path)
            .map_err(|e| StorageError::Io(format!("Failed to read entitlements: {}", e)))?;
        let record: EntitlementRecord = serde_json::from_str(&json)
            .map_err(|e| StorageError::Deserialization(format!("Failed to deserialize entitlements: {}", e)))?;

        if record.version != RECORD_VERSION {
            return Err(StorageError::Deserialization(format!(
                "Unsupported entitlement record version {}",
                record.version
            )));
        }
        Ok(record)
    }

    /// Save the record (atomic write)
    pub fn save(&self, record: &EntitlementRecord) -> Result<(), StorageError> {
        let path = self.record_path();
        let temp_path = self.temp_path();

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StorageError::Serialization(format!("Failed to serialize entitlements: {}", e)))?;

        {
            let mut file = fs::File::create(&temp_path)
                .map_err(|e| StorageError::Io(format!("Failed to create temp file: {}", e)))?;
            file.write_all(json.as_bytes())
                .map_err(|e| StorageError::Io(format!("Failed to write temp file: {}", e)))?;
            file.sync_all()
                .map_err(|e| StorageError::Io(format!("Failed to sync temp file: {}", e)))?;
        }

        fs::rename(&temp_path, &path)
            .map_err(|e| StorageError::Io(format!("Failed to rename temp file: {}", e)))?;

        tracing::debug!("Saved {} entitlements to {}", record.entitlements.len(), path.display());
        Ok(())
    }

    fn update<T>(&self, f: impl FnOnce(&mut EntitlementRecord) -> T) -> Result<T, StorageError> {
        let _guard = self.write_lock.lock();
        let mut record = self.load()?;
        let result = f(&mut record);
        record.updated_at = Utc::now();
        self.save(&record)?;
        Ok(result)
    }

    /// Add a delivered transaction. Returns `false` if it was already stored.
    pub fn record_transaction(&self, transaction: &StoreTransaction) -> Result<bool, StorageError> {
        self.update(|record| {
            if record.find(&transaction.transaction_id).is_some() {
                return false;
            }
            record.entitlements.push(Entitlement::from(transaction));
            true
        })
    }

    /// Stamp `finished_at` on a stored transaction. Returns `false` if unknown.
    pub fn mark_finished(&self, transaction_id: &str) -> Result<bool, StorageError> {
        self.update(|record| {
            match record
                .entitlements
                .iter_mut()
                .find(|e| e.transaction_id == transaction_id)
            {
                Some(entitlement) => {
                    entitlement.finished_at.get_or_insert_with(Utc::now);
                    true
                }
                None => false,
            }
        })
    }

    pub fn store_receipt(&self, receipt_data: &str) -> Result<(), StorageError> {
        self.update(|record| record.receipt_data = Some(receipt_data.to_string()))
    }

    pub fn owns(&self, product_id: &str) -> Result<bool, StorageError> {
        Ok(self.load()?.owns(product_id))
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::types::TransactionState;
    use tempfile::TempDir;

    fn tx(id: &str, product: &str) -> StoreTransaction {
        StoreTransaction {
            transaction_id: id.to_string(),
            product_id: product.to_string(),
            purchase_date: Utc::now(),
            original_transaction_id: None,
            state: TransactionState::Purchased,
        }
    }

    #[test]
    fn test_missing_file_returns_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = EntitlementStore::new(temp_dir.path()).unwrap();
        let record = store.load().unwrap();
        assert!(record.entitlements.is_empty());
        assert!(record.receipt_data.is_none());
    }

    #[test]
    fn test_record_and_finish_transaction() {
        let temp_dir = TempDir::new().unwrap();
        let store = EntitlementStore::new(temp_dir.path()).unwrap();

        assert!(store.record_transaction(&tx("t1", "pro")).unwrap());
        assert!(!store.record_transaction(&tx("t1", "pro")).unwrap());
        assert!(store.owns("pro").unwrap());
        assert!(!store.owns("other").unwrap());

        assert!(store.mark_finished("t1").unwrap());
        assert!(!store.mark_finished("missing").unwrap());

        let record = store.load().unwrap();
        assert_eq!(record.entitlements.len(), 1);
        assert!(record.find("t1").unwrap().finished_at.is_some());
    }

    #[test]
    fn test_receipt_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = EntitlementStore::new(temp_dir.path()).unwrap();
            store.store_receipt("cmVjZWlwdA==").unwrap();
        }
        let reopened = EntitlementStore::new(temp_dir.path()).unwrap();
        assert_eq!(reopened.load().unwrap().receipt_data.as_deref(), Some("cmVjZWlwdA=="));
        assert!(!temp_dir.path().join("storekit_entitlements.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_deserialization_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(ENTITLEMENTS_FILENAME), "{oops").unwrap();
        let store = EntitlementStore::new(temp_dir.path()).unwrap();
        assert!(matches!(store.load(), Err(StorageError::Deserialization(_))));
    }

    #[test]
    fn test_creates_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        EntitlementStore::new(&nested).unwrap();
        assert!(nested.exists());
    }
}
