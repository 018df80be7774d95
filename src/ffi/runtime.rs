//! Async runtime management for FFI
//!
//! Maintains a single multi-threaded Tokio runtime that is created once and
//! used to deliver native callbacks off the caller's thread.

use once_cell::sync::OnceCell;
use tokio::runtime::Runtime;

use crate::StoreKitError;

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Initialize the global async runtime. Calling it again is a no-op.
pub fn init_runtime() -> Result<(), StoreKitError> {
    get_runtime().map(|_| ())
}

/// Get a reference to the global runtime, creating it on first use
pub fn get_runtime() -> Result<&'static Runtime, StoreKitError> {
    RUNTIME.get_or_try_init(|| {
        tracing::debug!("Creating StoreKit bridge runtime");
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("storekit-bridge")
            .enable_all()
            .build()
            .map_err(|e| StoreKitError::Runtime(format!("Failed to create runtime: {}", e)))
    })
}

/// Spawn a task on the global runtime
pub fn spawn<F>(future: F) -> Result<tokio::task::JoinHandle<F::Output>, StoreKitError>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    Ok(get_runtime()?.spawn(future))
}
