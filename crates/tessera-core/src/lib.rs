//! # tessera-core: Pure Invoice Document Logic
//!
//! Everything here is synchronous and side-effect free: the storage crate
//! loads a document, hands this crate the persisted state plus the editor's
//! submission, and writes back whatever comes out.
//!
//! ```text
//! editor snapshot (header + items, loose numbers)
//!        │ validation::normalize_header / normalize_items
//!        ▼
//! typed LineItem list ──► reconcile(submitted, persisted) ──► insert / update / delete
//!        │
//!        ▼
//! totals::compute_totals ──► subtotal, discounts, tax, shipping, total
//!
//! lifecycle: only Draft documents accept any of the above
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Headers, line items, item ids, quantities, rates
//! - [`money`] - Integer cents
//! - [`totals`] - Totals calculator
//! - [`reconcile`] - Submitted vs. persisted item diff
//! - [`lifecycle`] - Status transitions and the draft lock
//! - [`validation`] - Editor input normalization
//! - [`error`] - Rule and input errors
//!
//! ## Example Usage
//!
//! ```rust
//! use tessera_core::money::Money;
//! use tessera_core::totals::{compute_totals, Adjustments};
//! use tessera_core::types::{LineDiscount, LineItemData, Quantity, Rate};
//!
//! let line = LineItemData {
//!     description: "Consulting".to_string(),
//!     quantity: Quantity::from_units(2),
//!     unit_price: Money::from_cents(5000),
//!     discount: LineDiscount::Percentage(Rate::from_bps(1000)),
//!     tax_rate: None,
//!     position: 0,
//! };
//!
//! let adjustments = Adjustments {
//!     discount_amount: Money::zero(),
//!     tax_rate: Rate::from_bps(2100),
//!     shipping_cost: Money::from_cents(500),
//! };
//!
//! let totals = compute_totals([&line], &adjustments);
//! assert_eq!(totals.tax_amount.cents(), 1890);
//! assert_eq!(totals.total_amount.cents(), 11390);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod lifecycle;
pub mod money;
pub mod reconcile;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use reconcile::{reconcile, ReconciliationResult};
pub use totals::{compute_totals, Adjustments, DocumentTotals};
pub use types::*;
pub use validation::{DocumentHeaderInput, InputRules, LineItemInput, NumericPolicy};

// =============================================================================
// Limits and Defaults
// =============================================================================

/// Default tenant ID used by development tooling (seed data, local config).
pub const DEFAULT_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Prefix carried by client-assigned line item tokens.
pub const TRANSIENT_ID_PREFIX: &str = "temp-";

/// Maximum number of line items accepted in one submission.
pub const MAX_LINE_ITEMS: usize = 500;

/// Maximum length of a line item description.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Upper bound for any submitted amount and for a document's subtotal,
/// in cents (1 000 000 000.00).
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

/// Upper bound for a line quantity, in whole units.
pub const MAX_QUANTITY_UNITS: i64 = 1_000_000;
