//! # Item Reconciler
//!
//! Diffs a submitted line item list against the persisted one by identity.
//!
//! ## Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  persisted: [ 7, 8, 9 ]         submitted: [ 7, temp-a, 9, temp-b ]    │
//! │                                                                         │
//! │      7 ── in both ────────────────────────────► to_update (7)          │
//! │      8 ── persisted, not resubmitted ─────────► to_delete (8)          │
//! │      9 ── in both ────────────────────────────► to_update (9)          │
//! │ temp-a ── transient ──────────────────────────► to_insert              │
//! │ temp-b ── transient ──────────────────────────► to_insert              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Omission is deletion: a caller that does not resend an unchanged item
//! will have it removed. Upserts are full-record writes; nothing is diffed
//! field by field.

use std::collections::HashSet;

use serde::Serialize;

use crate::money::Money;
use crate::totals::{compute_from_aggregates, Adjustments, DocumentTotals};
use crate::types::{ItemId, LineItem, LineItemData};

/// A new line to insert. The token is kept only to map the storage-assigned
/// id back to the caller's row; it is never written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemInsert {
    pub token: String,
    pub data: LineItemData,
}

/// A full-record rewrite of an existing line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemUpdate {
    pub id: i64,
    pub data: LineItemData,
}

/// The outcome of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub to_insert: Vec<ItemInsert>,
    pub to_update: Vec<ItemUpdate>,
    /// Durable ids to remove.
    pub to_delete: Vec<i64>,
    /// Σ quantity × unit_price over the submitted items.
    pub calculated_subtotal: Money,
    /// Σ line discount over the submitted items.
    pub calculated_total_line_discount: Money,
}

impl ReconciliationResult {
    /// Finishes the totals calculation from the accumulated sums.
    pub fn totals(&self, adjustments: &Adjustments) -> DocumentTotals {
        compute_from_aggregates(
            self.calculated_subtotal,
            self.calculated_total_line_discount,
            adjustments,
        )
    }

    /// Number of storage writes this result will cause.
    pub fn write_count(&self) -> usize {
        self.to_insert.len() + self.to_update.len() + self.to_delete.len()
    }
}

/// Reconciles `submitted` against `persisted`.
///
/// Duplicate transient tokens are not deduplicated; each becomes its own
/// insert. Durable ids in `submitted` must be unique, which
/// [`normalize_items`](crate::validation::normalize_items) enforces.
/// Persisted entries are expected to carry durable ids only.
pub fn reconcile(persisted: &[LineItem], submitted: Vec<LineItem>) -> ReconciliationResult {
    let resubmitted: HashSet<i64> = submitted
        .iter()
        .filter_map(|item| item.id.durable())
        .collect();

    let to_delete = persisted
        .iter()
        .filter_map(|item| item.id.durable())
        .filter(|id| !resubmitted.contains(id))
        .collect();

    let mut result = ReconciliationResult {
        to_delete,
        ..ReconciliationResult::default()
    };

    for item in submitted {
        result.calculated_subtotal += item.data.gross();
        result.calculated_total_line_discount += item.data.line_discount();

        match item.id {
            ItemId::Transient(token) => result.to_insert.push(ItemInsert {
                token,
                data: item.data,
            }),
            ItemId::Durable(id) => result.to_update.push(ItemUpdate {
                id,
                data: item.data,
            }),
        }
    }

    result
}

// =============================================================================
// Unit Tests
// =============================================================================
