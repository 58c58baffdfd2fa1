//! # tessera-db: Database Layer for Tessera
//!
//! SQLite storage for invoice documents and the save pipeline that keeps
//! their line items and cached totals consistent.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tessera Data Flow                                │
//! │                                                                         │
//! │  Invoice editor ── save(principal, header, items) ──┐                  │
//! │                                                      │                  │
//! │  ┌───────────────────────────────────────────────────▼─────────────┐   │
//! │  │                     tessera-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐  ┌───────────────┐  ┌──────────────────┐  │   │
//! │  │   │ DocumentPer-  │  │ Repositories  │  │    Database      │  │   │
//! │  │   │ sister        │─►│ document.rs   │─►│   (pool.rs)      │  │   │
//! │  │   │ (persister.rs)│  │ line_item.rs  │  │ SqlitePool +     │  │   │
//! │  │   └───────┬───────┘  └───────────────┘  │ migrations       │  │   │
//! │  │           │ normalize / reconcile /     └──────────────────┘  │   │
//! │  │           │ totals / lifecycle                                 │   │
//! │  └───────────┼─────────────────────────────────────────────────────┘   │
//! │              ▼                                                          │
//! │        tessera-core (pure)                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - `TesseraConfig` (TOML + environment)
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`repository`] - Document and line item SQL
//! - [`persister`] - Save pipeline and lifecycle operations
//! - [`error`] - Storage and save errors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tessera_db::{Database, TesseraConfig};
//!
//! let config = TesseraConfig::load(Some(Path::new("tessera.toml")))?;
//! let db = Database::new(config.db_config()).await?;
//! let persister = db.persister(config.persister_config());
//!
//! let outcome = persister.save(&principal, header_input, item_inputs).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod persister;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::TesseraConfig;
pub use error::{DbError, DbResult, SaveError, SaveResult};
pub use persister::{DocumentPersister, PersisterConfig, SaveOutcome, SaveStatus, SaveStrategy};
pub use pool::{Database, DbConfig, DbLocation};
