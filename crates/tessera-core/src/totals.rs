//! # Totals Calculator
//!
//! Computes a document's monetary totals from its line items and the three
//! header-level adjustments.
//!
//! ## Order of Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  subtotal            = Σ quantity × unit_price        (pre-discount)   │
//! │  total_line_discount = Σ line discount                                  │
//! │  effective_subtotal  = subtotal − line discounts − general discount    │
//! │  tax_amount          = effective_subtotal > 0                           │
//! │                          ? effective_subtotal × tax_rate                │
//! │                          : 0                                            │
//! │  total_amount        = effective_subtotal + tax_amount + shipping      │
//! │                                                                         │
//! │  Shipping is never taxed. Tax is never computed on a non-positive      │
//! │  base, so a discount larger than the lines cannot create negative tax. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The header's `subtotal`, `tax_amount` and `total_amount` are a cache of
//! this module's output and are rewritten after every item change.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{LineItemData, Rate};

/// Header fields that feed the totals calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Adjustments {
    /// General discount, absolute.
    pub discount_amount: Money,
    pub tax_rate: Rate,
    pub shipping_cost: Money,
}

/// Output of the totals calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentTotals {
    pub subtotal: Money,
    pub total_line_discount: Money,
    pub effective_subtotal: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
}

/// Computes totals over a set of line items.
///
/// ## Example
/// ```rust
/// use tessera_core::money::Money;
/// use tessera_core::totals::{compute_totals, Adjustments};
/// use tessera_core::types::LineItemData;
///
/// let no_items: Vec<LineItemData> = Vec::new();
/// let adjustments = Adjustments {
///     shipping_cost: Money::from_cents(500),
///     ..Adjustments::default()
/// };
///
/// let totals = compute_totals(&no_items, &adjustments);
/// assert_eq!(totals.total_amount.cents(), 500);
/// ```
pub fn compute_totals<'a, I>(items: I, adjustments: &Adjustments) -> DocumentTotals
where
    I: IntoIterator<Item = &'a LineItemData>,
{
    let (subtotal, line_discount) = items
        .into_iter()
        .fold((Money::zero(), Money::zero()), |(gross, discount), item| {
            (gross + item.gross(), discount + item.line_discount())
        });

    compute_from_aggregates(subtotal, line_discount, adjustments)
}

/// Computes totals from pre-aggregated line sums.
///
/// The reconciler accumulates both sums while it scans the submission, so
/// the persister can finish the calculation without a second pass.
pub fn compute_from_aggregates(
    subtotal: Money,
    total_line_discount: Money,
    adjustments: &Adjustments,
) -> DocumentTotals {
    let effective_subtotal = subtotal - total_line_discount - adjustments.discount_amount;

    let tax_amount = if effective_subtotal.is_positive() {
        effective_subtotal.calculate_tax(adjustments.tax_rate)
    } else {
        Money::zero()
    };

    DocumentTotals {
        subtotal,
        total_line_discount,
        effective_subtotal,
        tax_amount,
        total_amount: effective_subtotal + tax_amount + adjustments.shipping_cost,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
