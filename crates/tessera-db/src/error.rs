//! # Storage Errors
//!
//! [`DbError`] describes what went wrong in SQLite or while loading config.
//! [`SaveError`] is what every [`crate::DocumentPersister`] call returns: a
//! refused request ([`CoreError`]) or a storage failure ([`DbError`]).

use tessera_core::{CoreError, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// A lookup found nothing, or an update matched no row for this
    /// tenant and document.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// e.g. two documents of one tenant issued with the same number
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A schema CHECK rejected the row (negative quantity, rate over 100%).
    #[error("Constraint violation: {message}")]
    CheckViolation { message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Any other statement failure, including `RAISE(ABORT)` from a trigger.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    /// Sorts a SQLite error message by the constraint it names.
    fn from_sqlite_message(msg: &str) -> Self {
        if let Some(column) = msg.strip_prefix("UNIQUE constraint failed: ") {
            DbError::UniqueViolation {
                field: column.to_string(),
                value: "unknown".to_string(),
            }
        } else if msg.contains("FOREIGN KEY constraint failed") {
            DbError::ForeignKeyViolation {
                message: msg.to_string(),
            }
        } else if msg.contains("CHECK constraint failed") {
            DbError::CheckViolation {
                message: msg.to_string(),
            }
        } else {
            DbError::QueryFailed(msg.to_string())
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => DbError::from_sqlite_message(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for DbError {
    fn from(err: toml::de::Error) -> Self {
        DbError::ConfigLoadFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Save Pipeline Errors
// =============================================================================

/// Error returned by [`crate::DocumentPersister`] operations.
///
/// Domain errors mean the request was refused before anything was written
/// (or, in atomic mode, that everything was rolled back). Storage errors mean
/// the database failed underneath.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Domain(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] DbError),
}

impl From<ValidationError> for SaveError {
    fn from(err: ValidationError) -> Self {
        SaveError::Domain(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for SaveError {
    fn from(err: sqlx::Error) -> Self {
        SaveError::Storage(DbError::from(err))
    }
}

impl SaveError {
    /// Returns the domain error, if this is one.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            SaveError::Domain(err) => Some(err),
            SaveError::Storage(_) => None,
        }
    }
}

pub type SaveResult<T> = Result<T, SaveError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::DocumentStatus;

    #[test]
    fn test_sqlite_messages_are_classified() {
        assert!(matches!(
            DbError::from_sqlite_message("UNIQUE constraint failed: documents.tenant_id, documents.number"),
            DbError::UniqueViolation { ref field, .. } if field == "documents.tenant_id, documents.number"
        ));
        assert!(matches!(
            DbError::from_sqlite_message("CHECK constraint failed: quantity_milli >= 0"),
            DbError::CheckViolation { .. }
        ));
        assert!(matches!(
            DbError::from_sqlite_message("FOREIGN KEY constraint failed"),
            DbError::ForeignKeyViolation { .. }
        ));
        assert!(matches!(
            DbError::from_sqlite_message("totals are frozen"),
            DbError::QueryFailed(_)
        ));
    }

    #[test]
    fn test_not_found_message() {
        let err = DbError::not_found("LineItem", 42);
        assert_eq!(err.to_string(), "LineItem not found: 42");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_save_error_is_transparent() {
        let err = SaveError::from(CoreError::DocumentLocked {
            document_id: 3,
            status: DocumentStatus::Issued,
        });
        assert_eq!(
            err.to_string(),
            "Document 3 is issued, only drafts can be modified"
        );
        assert!(err.as_domain().is_some());

        let err = SaveError::from(DbError::PoolExhausted);
        assert!(err.as_domain().is_none());
    }

    #[test]
    fn test_validation_wraps_as_domain() {
        let err = SaveError::from(ValidationError::Required {
            field: "currency".to_string(),
        });
        assert!(matches!(
            err,
            SaveError::Domain(CoreError::Validation(ValidationError::Required { .. }))
        ));
    }
}
