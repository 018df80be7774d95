//! StoreKit bridge - in-app purchases for Rust applications on Apple platforms
//!
//! The native StoreKit side is an Objective-C library exposing six C entry points
//! (see `include/storekit_bridge.h`). This crate declares them, implements the four
//! callbacks the native side invokes, and turns those callbacks into [`StoreEvent`]s
//! posted on a channel instead of re-entrant calls into application code.
//!
//! Off macOS (or without the `native` feature) the [`backend::SimulatedStore`]
//! plays the native side in-process so the full purchase flow can be exercised.

pub mod backend;
pub mod config;
pub mod events;
pub mod ffi;
pub mod ledger;
pub mod logging;
pub mod manager;
pub mod storage;

pub use backend::NativeStore;
pub use config::{BackendKind, BridgeConfig};
pub use events::{EventBus, EventStream, StoreEvent};
pub use ffi::types::{Product, ProductsResponse, StoreTransaction, TransactionState};
pub use manager::{PurchaseOutcome, StoreKitManager};

use thiserror::Error;

/// Error types for bridge operations
#[derive(Error, Debug)]
pub enum StoreKitError {
    #[error("StoreKit not initialized")]
    NotInitialized,

    #[error("StoreKit is not available on this platform")]
    Unavailable,

    #[error("Native store rejected {operation} request")]
    Rejected { operation: &'static str },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No receipt data available")]
    NoReceipt,

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "STOREKIT";

/// Default delay before the simulated store answers a request
pub const DEFAULT_CALLBACK_LATENCY_MS: u64 = 25;
