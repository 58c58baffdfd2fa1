//! # Repository Module
//!
//! SQL for documents and line items, one repository per table.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories over a Connection                       │
//! │                                                                         │
//! │  DocumentPersister                                                     │
//! │       │                                                                 │
//! │       │  let mut tx = pool.begin().await?;          (atomic)           │
//! │       │  let mut conn = pool.acquire().await?;      (staged)           │
//! │       ▼                                                                 │
//! │  DocumentRepository::new(&mut *tx)                                     │
//! │  ├── find / list / insert / update_header                              │
//! │  └── update_totals / issue / set_status / delete_draft                 │
//! │  LineItemRepository::new(&mut *tx)                                     │
//! │  └── list_for_document / insert / update / delete_many                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Repositories borrow a connection instead of owning the pool, so the  │
//! │  same code runs inside a transaction or statement by statement.       │
//! │  Every query is scoped by tenant_id.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`DocumentRepository`] - Document headers and lifecycle columns
//! - [`LineItemRepository`] - Line items of one document

pub mod document;
pub mod line_item;

pub use document::DocumentRepository;
pub use line_item::LineItemRepository;

use tessera_core::Rate;

/// Reads a basis-point column. The schema's CHECK keeps values in range.
pub(crate) fn rate_from_column(bps: i64) -> Rate {
    Rate::from_bps(bps.clamp(0, i64::from(Rate::MAX_BPS)) as u32)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for repository and persister tests.

    use crate::pool::{Database, DbConfig};

    pub const TENANT: &str = "tenant-a";
    pub const OTHER_TENANT: &str = "tenant-b";
    pub const USER: &str = "user-1";

    pub async fn setup_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }
}
