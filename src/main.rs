//! StoreKit bridge demonstration
//!
//! Walks through the purchase flow: request the catalog, buy the first product,
//! finish the transaction and read the receipt. Off macOS it runs against the
//! simulated store.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use storekit_bridge::{backend, logging, BackendKind, BridgeConfig, PurchaseOutcome, StoreKitManager};
use tracing::{error, info, warn};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = BridgeConfig::load(config_path.as_deref()).context("loading bridge config")?;
    if config.backend == BackendKind::Auto && !backend::native_available() {
        config.backend = BackendKind::Simulated;
    }
    logging::init_logging(&config);

    let manager = StoreKitManager::from_config(&config)?;
    let mut events = manager.subscribe();
    manager.initialize().context("initializing StoreKit")?;
    info!("Using {} store for {}", manager.backend_name(), config.bundle_id);

    // Step 1: catalog
    manager.request_products(&config.product_ids())?;
    let products = manager.wait_for_products(&mut events, EVENT_TIMEOUT).await?;
    for product in &products.products {
        info!("  {} - {} {} {}", product.product_id, product.title, product.price, product.currency_code);
    }
    for invalid in &products.invalid_product_ids {
        warn!("  {} is not available", invalid);
    }

    let Some(product) = products.products.first() else {
        warn!("Nothing to purchase");
        return Ok(());
    };

    // Step 2: purchase
    manager.purchase_product(&product.product_id)?;
    match manager
        .wait_for_purchase(&mut events, &product.product_id, EVENT_TIMEOUT)
        .await?
    {
        PurchaseOutcome::Completed(transaction) => {
            info!("Purchased {} as transaction {}", transaction.product_id, transaction.transaction_id);
            manager.finish_transaction(&transaction.transaction_id)?;
        }
        PurchaseOutcome::Failed(message) => error!("Purchase failed: {}", message),
    }

    // Step 3: receipt
    match manager.get_receipt_data() {
        Ok(receipt) => info!("Receipt ({} bytes): {}", receipt.len(), receipt),
        Err(e) => warn!("No receipt: {}", e),
    }

    // Step 4: restore
    manager.restore_purchases()?;
    let restored = manager.wait_for_restore(&mut events, EVENT_TIMEOUT).await?;
    info!("Restored {} transactions", restored.len());
    for transaction in restored {
        manager.finish_transaction(&transaction.transaction_id)?;
    }

    Ok(())
}
