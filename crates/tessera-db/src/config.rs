//! # Tessera Configuration
//!
//! Settings for the database pool and the save pipeline.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TESSERA_DATABASE_PATH=./data/tessera.db                            │
//! │     TESSERA_SAVE_STRATEGY=staged                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     tessera.toml (path supplied by the caller)                         │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Atomic saves, lenient numbers, EUR                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # tessera.toml
//! [database]
//! path = "./data/tessera.db"
//! max_connections = 5
//!
//! [documents]
//! save_strategy = "atomic"    # atomic | staged
//! numeric_policy = "lenient"  # lenient | strict
//! default_currency = "EUR"
//! number_prefix = "INV-"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_core::validation::{validate_currency, InputRules, NumericPolicy};
use tessera_core::DEFAULT_TENANT_ID;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::persister::{PersisterConfig, SaveStrategy};
use crate::pool::DbConfig;

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_database_path() -> String {
    "tessera.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: true,
        }
    }
}

/// `[documents]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSettings {
    #[serde(default)]
    pub save_strategy: SaveStrategy,

    #[serde(default)]
    pub numeric_policy: NumericPolicy,

    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Tenant used by development tooling when no session is present.
    #[serde(default = "default_tenant")]
    pub default_tenant: String,

    /// Prepended to the sequence number when a document is issued.
    #[serde(default = "default_number_prefix")]
    pub number_prefix: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_tenant() -> String {
    DEFAULT_TENANT_ID.to_string()
}

fn default_number_prefix() -> String {
    "INV-".to_string()
}

impl Default for DocumentSettings {
    fn default() -> Self {
        DocumentSettings {
            save_strategy: SaveStrategy::default(),
            numeric_policy: NumericPolicy::default(),
            default_currency: default_currency(),
            default_tenant: default_tenant(),
            number_prefix: default_number_prefix(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete Tessera configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesseraConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub documents: DocumentSettings,
}

impl TesseraConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file, if given and present
    /// 3. `TESSERA_*` environment variables
    pub fn load(config_path: Option<&Path>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(path)?;
                config = Self::from_toml_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns the default if loading fails.
    pub fn load_or_default(config_path: Option<&Path>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document. Missing sections and keys take defaults.
    pub fn from_toml_str(contents: &str) -> DbResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies `TESSERA_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("TESSERA_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = path;
        }

        if let Some(max) = lookup("TESSERA_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(max) => self.database.max_connections = max,
                Err(_) => warn!(value = %max, "Ignoring invalid TESSERA_MAX_CONNECTIONS"),
            }
        }

        if let Some(strategy) = lookup("TESSERA_SAVE_STRATEGY") {
            match strategy.parse() {
                Ok(parsed) => {
                    debug!(strategy = %strategy, "Overriding save strategy from environment");
                    self.documents.save_strategy = parsed;
                }
                Err(_) => warn!(value = %strategy, "Unknown save strategy in environment"),
            }
        }

        if let Some(policy) = lookup("TESSERA_NUMERIC_POLICY") {
            match policy.parse() {
                Ok(parsed) => self.documents.numeric_policy = parsed,
                Err(_) => warn!(value = %policy, "Unknown numeric policy in environment"),
            }
        }

        if let Some(currency) = lookup("TESSERA_DEFAULT_CURRENCY") {
            self.documents.default_currency = currency;
        }

        if let Some(tenant) = lookup("TESSERA_TENANT_ID") {
            self.documents.default_tenant = tenant;
        }

        if let Some(prefix) = lookup("TESSERA_NUMBER_PREFIX") {
            self.documents.number_prefix = prefix;
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.path.trim().is_empty() {
            return Err(DbError::InvalidConfig("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(DbError::InvalidConfig(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        validate_currency(&self.documents.default_currency)
            .map_err(|e| DbError::InvalidConfig(format!("documents.default_currency: {}", e)))?;

        if self.documents.default_tenant.trim().is_empty() {
            return Err(DbError::InvalidConfig(
                "documents.default_tenant must not be empty".into(),
            ));
        }

        Ok(())
    }

    // =========================================================================
    // Derived Settings
    // =========================================================================

    /// Pool settings for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        if self.database.path == DbConfig::MEMORY_PATH {
            return DbConfig::in_memory().run_migrations(self.database.run_migrations);
        }

        DbConfig::new(PathBuf::from(&self.database.path))
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(self.database.idle_timeout_secs))
            .run_migrations(self.database.run_migrations)
    }

    /// Save pipeline settings for [`crate::DocumentPersister`].
    pub fn persister_config(&self) -> PersisterConfig {
        PersisterConfig {
            save_strategy: self.documents.save_strategy,
            input_rules: InputRules {
                numeric_policy: self.documents.numeric_policy,
                default_currency: self.documents.default_currency.clone(),
            },
            number_prefix: self.documents.number_prefix.clone(),
        }
    }
}
