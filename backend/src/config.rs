//! Configuration management for the stock ledger service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with LEDGER_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::{Pagination, StockThresholds};

/// Main application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Ledger rules and listing limits
    pub ledger: LedgerConfig,

    /// User directory used for audit display names
    pub identity: ServiceEndpoint,

    /// Supplier and customer master data
    pub master_data: ServiceEndpoint,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Thresholds for entries created by a stock read
    pub read_default_min_stock: i64,
    pub read_default_max_stock: i64,

    /// Thresholds for entries created by an import confirm
    pub import_default_min_stock: i64,
    pub import_default_max_stock: i64,

    /// Notes and reject reasons are cut to this many characters
    pub note_max_length: usize,

    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl LedgerConfig {
    pub fn read_defaults(&self) -> StockThresholds {
        StockThresholds {
            min_stock: self.read_default_min_stock,
            max_stock: self.read_default_max_stock,
        }
    }

    pub fn import_defaults(&self) -> StockThresholds {
        StockThresholds {
            min_stock: self.import_default_min_stock,
            max_stock: self.import_default_max_stock,
        }
    }

    /// Zero-based page with the size defaulted and clamped
    pub fn pagination(&self, page: Option<u32>, size: Option<u32>) -> Pagination {
        Pagination::new(
            page.unwrap_or(0),
            size.unwrap_or(self.default_page_size),
        )
        .clamped(self.max_page_size)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServiceEndpoint {
    /// Base URL; lookups are skipped when empty
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("LEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("ledger.read_default_min_stock", 0)?
            .set_default("ledger.read_default_max_stock", 999_999)?
            .set_default("ledger.import_default_min_stock", 10)?
            .set_default("ledger.import_default_max_stock", 1000)?
            .set_default("ledger.note_max_length", 255)?
            .set_default("ledger.default_page_size", 10)?
            .set_default("ledger.max_page_size", 100)?
            .set_default("identity.base_url", "")?
            .set_default("identity.timeout_secs", 5)?
            .set_default("master_data.base_url", "")?
            .set_default("master_data.timeout_secs", 5)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (LEDGER_ prefix)
            .add_source(
                Environment::with_prefix("LEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            read_default_min_stock: 0,
            read_default_max_stock: 999_999,
            import_default_min_stock: 10,
            import_default_max_stock: 1000,
            note_max_length: shared::NOTE_MAX_LENGTH,
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults_and_clamps() {
        let ledger = LedgerConfig::default();

        let defaulted = ledger.pagination(None, None);
        assert_eq!(defaulted.page, 0);
        assert_eq!(defaulted.per_page, 10);

        assert_eq!(ledger.pagination(Some(3), Some(500)).per_page, 100);
        assert_eq!(ledger.pagination(Some(3), Some(0)).per_page, 1);
    }

    #[test]
    fn test_threshold_profiles_differ() {
        let ledger = LedgerConfig::default();
        assert_eq!(ledger.read_defaults().min_stock, 0);
        assert_eq!(ledger.read_defaults().max_stock, 999_999);
        assert_eq!(ledger.import_defaults().min_stock, 10);
        assert_eq!(ledger.import_defaults().max_stock, 1000);
    }
}
