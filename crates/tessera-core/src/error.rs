//! # Errors
//!
//! `ValidationError` covers malformed input from the editor. `CoreError`
//! covers document rules: locked documents, unknown ids, and illegal
//! lifecycle moves. The storage crate wraps both in its `SaveError`.

use thiserror::Error;

use crate::types::DocumentStatus;

/// A document rule was broken. Nothing has been written when this is returned.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Header, items, or totals of a non-draft document were about to change.
    #[error("Document {document_id} is {status}, only drafts can be modified")]
    DocumentLocked {
        document_id: i64,
        status: DocumentStatus,
    },

    /// No such document for the caller's tenant.
    #[error("Document not found: {0}")]
    DocumentNotFound(i64),

    #[error("Document {document_id} cannot move from {from} to {to}")]
    InvalidTransition {
        document_id: i64,
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Rejected input, keyed by the offending field.
///
/// `NotFinite` and `Negative` only surface under
/// [`NumericPolicy::Strict`](crate::validation::NumericPolicy::Strict);
/// the lenient policy turns those values into zero instead.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// NaN, infinity, or text that doesn't parse as a number.
    #[error("{field} is not a valid number")]
    NotFinite { field: String },

    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Bad currency code, item token, or date ordering.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_document_message() {
        let err = CoreError::DocumentLocked {
            document_id: 42,
            status: DocumentStatus::Issued,
        };
        assert_eq!(
            err.to_string(),
            "Document 42 is issued, only drafts can be modified"
        );
    }

    #[test]
    fn test_field_messages() {
        let nan = ValidationError::NotFinite {
            field: "quantity".to_string(),
        };
        assert_eq!(nan.to_string(), "quantity is not a valid number");

        let long = ValidationError::TooLong {
            field: "description".to_string(),
            max: 500,
        };
        assert_eq!(long.to_string(), "description must be at most 500 characters");
    }

    #[test]
    fn test_validation_lifts_into_core_error() {
        let core: CoreError = ValidationError::Required {
            field: "currency".to_string(),
        }
        .into();
        assert!(matches!(core, CoreError::Validation(ValidationError::Required { .. })));
    }
}
