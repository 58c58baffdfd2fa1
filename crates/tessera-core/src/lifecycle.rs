//! # Document Lifecycle Rules
//!
//! Guards used by the persister before any write. Kept here so the rules
//! stay testable without a database.

use crate::error::{CoreError, CoreResult};
use crate::types::DocumentStatus;

/// Fails with [`CoreError::DocumentLocked`] unless the document is a draft.
pub fn ensure_editable(document_id: i64, status: DocumentStatus) -> CoreResult<()> {
    if status.is_editable() {
        Ok(())
    } else {
        Err(CoreError::DocumentLocked {
            document_id,
            status,
        })
    }
}

/// Fails with [`CoreError::InvalidTransition`] for moves the state machine
/// does not allow.
pub fn ensure_transition(
    document_id: i64,
    from: DocumentStatus,
    to: DocumentStatus,
) -> CoreResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            document_id,
            from,
            to,
        })
    }
}
