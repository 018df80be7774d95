//! Bridge configuration
//!
//! Layered from built-in defaults, an optional JSON file and `STOREKIT_*`
//! environment variables (later sources win). Hosts that drive the bridge over
//! FFI can also pass the whole configuration as a JSON blob.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ffi::types::Product;
use crate::StoreKitError;

/// Which native store implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The linked StoreKit library when available, otherwise no store
    #[default]
    Auto,
    Native,
    Simulated,
}

/// A product offered by the simulated store.
///
/// Keys are single lowercase words so that every configuration source
/// (file or environment) spells them the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub period: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl CatalogEntry {
    pub fn to_product(&self) -> Product {
        Product {
            product_id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            price: self.price.clone(),
            currency_code: self.currency.clone(),
            subscription_period: self.period.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub bundle_id: String,
    pub backend: BackendKind,
    pub enable_logging: bool,
    pub log_level: Option<String>,
    /// Where entitlements are persisted; nothing is written when unset
    pub storage_directory: Option<String>,
    pub catalog: Vec<CatalogEntry>,
    /// Simulated purchases of these products fail as if the user cancelled
    pub declined_products: Vec<String>,
    pub callback_latency_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bundle_id: "com.example.storekit".to_string(),
            backend: BackendKind::Auto,
            enable_logging: true,
            log_level: None,
            storage_directory: None,
            catalog: vec![
                CatalogEntry {
                    id: "com.example.storekit.monthly".to_string(),
                    title: "Monthly".to_string(),
                    description: "Monthly subscription".to_string(),
                    price: "1.99".to_string(),
                    currency: default_currency(),
                    period: Some("P1M".to_string()),
                },
                CatalogEntry {
                    id: "com.example.storekit.yearly".to_string(),
                    title: "Yearly".to_string(),
                    description: "Yearly subscription".to_string(),
                    price: "19.99".to_string(),
                    currency: default_currency(),
                    period: Some("P1Y".to_string()),
                },
            ],
            declined_products: Vec::new(),
            callback_latency_ms: crate::DEFAULT_CALLBACK_LATENCY_MS,
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration passed across FFI as JSON. Missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self, StoreKitError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StoreKitError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults, then `path` (JSON) if given, then `STOREKIT_*` variables
    #[cfg(feature = "config-file")]
    pub fn load(path: Option<&Path>) -> Result<Self, StoreKitError> {
        Self::load_layered(path, Self::environment())
    }

    #[cfg(feature = "config-file")]
    fn environment() -> config::Environment {
        config::Environment::with_prefix(crate::ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("declined_products")
    }

    #[cfg(feature = "config-file")]
    fn load_layered(path: Option<&Path>, environment: config::Environment) -> Result<Self, StoreKitError> {
        use config::{Config, File, FileFormat};

        let to_config_err = |e: config::ConfigError| StoreKitError::Configuration(e.to_string());

        let mut builder = Config::builder().add_source(Config::try_from(&Self::default()).map_err(to_config_err)?);
        if let Some(path) = path {
            tracing::info!("Loading bridge config from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Json).required(true));
        }
        builder = builder.add_source(environment);

        let config: Self = builder
            .build()
            .map_err(to_config_err)?
            .try_deserialize()
            .map_err(to_config_err)?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults, then `path` (JSON) if given
    #[cfg(not(feature = "config-file"))]
    pub fn load(path: Option<&Path>) -> Result<Self, StoreKitError> {
        match path {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|e| {
                    StoreKitError::Configuration(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_json(&json)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), StoreKitError> {
        if self.bundle_id.trim().is_empty() {
            return Err(StoreKitError::Configuration("bundle_id must not be empty".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.catalog {
            if entry.id.trim().is_empty() {
                return Err(StoreKitError::Configuration("catalog entry without id".to_string()));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(StoreKitError::Configuration(format!(
                    "duplicate catalog entry: {}",
                    entry.id
                )));
            }
        }
        Ok(())
    }

    /// Ids of every catalog product, in catalog order
    pub fn product_ids(&self) -> Vec<String> {
        self.catalog.iter().map(|entry| entry.id.clone()).collect()
    }

    pub fn products(&self) -> Vec<Product> {
        self.catalog.iter().map(CatalogEntry::to_product).collect()
    }
}
