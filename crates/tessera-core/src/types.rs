//! # Domain Types
//!
//! Core domain types used throughout Tessera.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────────┐        ┌──────────────────────┐              │
//! │  │   DocumentHeader     │ 1    * │      LineItem        │              │
//! │  │  ──────────────────  │───────►│  ──────────────────  │              │
//! │  │  id (i64, optional)  │        │  id: ItemId          │              │
//! │  │  status              │        │  description         │              │
//! │  │  tax_rate (Rate)     │        │  quantity (Quantity) │              │
//! │  │  discount_amount     │        │  unit_price (Money)  │              │
//! │  │  shipping_cost       │        │  discount            │              │
//! │  │  subtotal ┐          │        └──────────────────────┘              │
//! │  │  tax      ├ computed │                                               │
//! │  │  total    ┘          │        ItemId = Transient(token)              │
//! │  └──────────────────────┘               | Durable(i64)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Kinds of Line Identity
//! The invoice editor creates rows before they exist in storage. Those rows
//! carry a client-side token (`temp-…`); storage never sees it and assigns a
//! durable integer id on first insert. [`ItemId`] keeps the two apart in the
//! type system so the reconciler's branch is exhaustive.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::Money;
use crate::totals::{Adjustments, DocumentTotals};
use crate::TRANSIENT_ID_PREFIX;

// =============================================================================
// Rate
// =============================================================================

/// A percentage represented in basis points (bps).
///
/// Used for header tax rates, per-line tax overrides and line discount
/// percentages. 1 basis point = 0.01%, so 2100 bps = 21%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// 100% in basis points.
    pub const MAX_BPS: u32 = 10_000;

    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a percentage (for convenience).
    ///
    /// Callers are expected to pass a finite, non-negative value; see
    /// [`crate::validation`] for the checked conversion.
    pub fn from_percentage(pct: f64) -> Self {
        Rate((pct * 100.0).round() as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// A non-negative quantity in thousandths of a unit.
///
/// Invoices bill fractional quantities (1.5 hours, 0.25 kg), so a whole-unit
/// integer count is not enough. Storing thousandths keeps the math integral:
/// `Quantity::from_milli(1500)` is one and a half units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    /// Number of stored steps per whole unit.
    pub const MILLI_PER_UNIT: i64 = 1_000;

    /// Creates a quantity from thousandths, clamping negatives to zero.
    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        if milli < 0 {
            Quantity(0)
        } else {
            Quantity(milli)
        }
    }

    /// Creates a quantity from whole units.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity::from_milli(units * Self::MILLI_PER_UNIT)
    }

    /// Returns the stored thousandths.
    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    /// Returns the quantity as a float (for display only).
    #[inline]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / Self::MILLI_PER_UNIT as f64
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::zero()
    }
}

// =============================================================================
// Document Status
// =============================================================================

/// Lifecycle status of an invoice document.
///
/// ## State Machine
/// ```text
///            ┌──────────┐  finalize   ┌──────────┐   payment   ┌──────────┐
///   save ──► │  Draft   │ ──────────► │  Issued  │ ──────────► │   Paid   │
///            └────┬─────┘             └────┬─────┘             └──────────┘
///                 │ cancel                 │ cancel
///                 ▼                        ▼
///            ┌──────────────────────────────────┐
///            │            Cancelled             │
///            └──────────────────────────────────┘
/// ```
/// Only `Draft` is editable; everything else is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Being edited; header and items may change.
    Draft,
    /// Finalized (numbered); header and items are immutable.
    Issued,
    /// Settled by payment.
    Paid,
    /// Withdrawn.
    Cancelled,
}

impl DocumentStatus {
    /// Returns true if header and items may still be written.
    #[inline]
    pub const fn is_editable(&self) -> bool {
        matches!(self, DocumentStatus::Draft)
    }

    /// Returns true if `self → to` is an allowed lifecycle move.
    pub fn can_transition_to(&self, to: DocumentStatus) -> bool {
        matches!(
            (self, to),
            (DocumentStatus::Draft, DocumentStatus::Issued)
                | (DocumentStatus::Draft, DocumentStatus::Cancelled)
                | (DocumentStatus::Issued, DocumentStatus::Paid)
                | (DocumentStatus::Issued, DocumentStatus::Cancelled)
        )
    }

    /// Lowercase name, matching the stored column value.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Issued => "issued",
            DocumentStatus::Paid => "paid",
            DocumentStatus::Cancelled => "cancelled",
        }
    }
}

impl Default for DocumentStatus {
    fn default() -> Self {
        DocumentStatus::Draft
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(DocumentStatus::Draft),
            "issued" => Ok(DocumentStatus::Issued),
            "paid" => Ok(DocumentStatus::Paid),
            "cancelled" | "canceled" => Ok(DocumentStatus::Cancelled),
            _ => Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: vec![
                    "draft".to_string(),
                    "issued".to_string(),
                    "paid".to_string(),
                    "cancelled".to_string(),
                ],
            }),
        }
    }
}

// =============================================================================
// Item Identity
// =============================================================================

/// Identity of a line item.
///
/// On the wire a durable id is a JSON number and a transient id is a
/// `temp-` prefixed string token. Numeric strings (`"17"`) are read as
/// durable ids, since that is how form libraries tend to round-trip them.
/// Any other string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawItemId", into = "RawItemId")]
pub enum ItemId {
    /// Client-assigned placeholder, never written to storage.
    Transient(String),
    /// Storage-assigned primary key.
    Durable(i64),
}

impl ItemId {
    /// Generates a fresh transient token, e.g. `temp-6f1c…`.
    pub fn new_transient() -> Self {
        ItemId::Transient(format!("{}{}", TRANSIENT_ID_PREFIX, Uuid::new_v4()))
    }

    /// Parses the textual form used by the editor.
    ///
    /// ## Example
    /// ```rust
    /// use tessera_core::types::ItemId;
    ///
    /// assert_eq!(ItemId::parse("17").unwrap(), ItemId::Durable(17));
    /// assert!(ItemId::parse("temp-123").unwrap().is_transient());
    /// assert!(ItemId::parse("  ").is_err());
    /// assert!(ItemId::parse("12a").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ValidationError::Required {
                field: "item id".to_string(),
            });
        }
        if raw.len() > TRANSIENT_ID_PREFIX.len() && raw.starts_with(TRANSIENT_ID_PREFIX) {
            return Ok(ItemId::Transient(raw.to_string()));
        }
        match raw.parse::<i64>() {
            Ok(id) => ItemId::durable_checked(id),
            Err(_) => Err(ValidationError::InvalidFormat {
                field: "item id".to_string(),
                reason: format!(
                    "'{}' is neither a durable id nor a '{}' token",
                    raw, TRANSIENT_ID_PREFIX
                ),
            }),
        }
    }

    fn durable_checked(id: i64) -> Result<Self, ValidationError> {
        if id <= 0 {
            return Err(ValidationError::OutOfRange {
                field: "item id".to_string(),
                min: 1,
                max: i64::MAX,
            });
        }
        Ok(ItemId::Durable(id))
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, ItemId::Transient(_))
    }

    /// Returns the durable id, if any.
    #[inline]
    pub fn durable(&self) -> Option<i64> {
        match self {
            ItemId::Durable(id) => Some(*id),
            ItemId::Transient(_) => None,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Transient(token) => f.write_str(token),
            ItemId::Durable(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for ItemId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemId::parse(s)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawItemId {
    Number(i64),
    Text(String),
}

impl TryFrom<RawItemId> for ItemId {
    type Error = ValidationError;

    fn try_from(raw: RawItemId) -> Result<Self, Self::Error> {
        match raw {
            RawItemId::Number(id) => ItemId::durable_checked(id),
            RawItemId::Text(text) => ItemId::parse(&text),
        }
    }
}

impl From<ItemId> for RawItemId {
    fn from(id: ItemId) -> Self {
        match id {
            ItemId::Durable(id) => RawItemId::Number(id),
            ItemId::Transient(token) => RawItemId::Text(token),
        }
    }
}

// =============================================================================
// Line Items
// =============================================================================

/// Line-level discount. Percentage and absolute amount are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LineDiscount {
    #[default]
    None,
    /// Fraction of the line gross.
    Percentage(Rate),
    /// Fixed amount off the line gross.
    Amount(Money),
}

/// Everything about a line item except its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItemData {
    pub description: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    #[serde(default)]
    pub discount: LineDiscount,
    /// Per-line tax override. Stored for display and export; document tax is
    /// always computed from the header rate.
    pub tax_rate: Option<Rate>,
    /// Display order within the document.
    #[serde(default)]
    pub position: i64,
}

impl LineItemData {
    /// `quantity × unit_price`, before any discount.
    #[inline]
    pub fn gross(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    /// Discount taken off this line.
    pub fn line_discount(&self) -> Money {
        match self.discount {
            LineDiscount::None => Money::zero(),
            LineDiscount::Amount(amount) => amount.non_negative(),
            LineDiscount::Percentage(rate) => self.gross().percentage(rate),
        }
    }

    /// Line total after line discount, before document discount and tax.
    #[inline]
    pub fn total(&self) -> Money {
        self.gross() - self.line_discount()
    }
}

/// A line item on an invoice document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    #[ts(type = "number | string")]
    pub id: ItemId,
    #[serde(flatten)]
    pub data: LineItemData,
}

impl LineItem {
    /// Creates a line item with a fresh transient id.
    pub fn new_transient(data: LineItemData) -> Self {
        LineItem {
            id: ItemId::new_transient(),
            data,
        }
    }

    #[inline]
    pub fn total(&self) -> Money {
        self.data.total()
    }
}

// =============================================================================
// Document Header
// =============================================================================

/// Header of an invoice document.
///
/// `subtotal`, `tax_amount` and `total_amount` are a cache of
/// [`crate::totals::compute_totals`] over the current items and the three
/// adjustment fields. Only the persister writes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentHeader {
    /// Absent until the document is first saved.
    pub id: Option<i64>,
    /// Legal number, assigned when the document is issued.
    pub number: Option<String>,
    pub status: DocumentStatus,
    /// ISO 4217 code.
    pub currency: String,
    #[ts(as = "Option<String>")]
    pub issue_date: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub tax_rate: Rate,
    /// General (document-level) discount, applied after line discounts.
    pub discount_amount: Money,
    pub shipping_cost: Money,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub updated_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub issued_at: Option<DateTime<Utc>>,
}

impl DocumentHeader {
    /// Creates an empty draft header in the given currency.
    pub fn draft(currency: impl Into<String>) -> Self {
        DocumentHeader {
            id: None,
            number: None,
            status: DocumentStatus::Draft,
            currency: currency.into(),
            issue_date: None,
            due_date: None,
            notes: None,
            tax_rate: Rate::zero(),
            discount_amount: Money::zero(),
            shipping_cost: Money::zero(),
            subtotal: Money::zero(),
            tax_amount: Money::zero(),
            total_amount: Money::zero(),
            created_at: None,
            updated_at: None,
            issued_at: None,
        }
    }

    /// The header-level inputs of the totals calculation.
    pub fn adjustments(&self) -> Adjustments {
        Adjustments {
            discount_amount: self.discount_amount,
            tax_rate: self.tax_rate,
            shipping_cost: self.shipping_cost,
        }
    }

    /// Copies computed totals onto the cached header fields.
    pub fn apply_totals(&mut self, totals: &DocumentTotals) {
        self.subtotal = totals.subtotal;
        self.tax_amount = totals.tax_amount;
        self.total_amount = totals.total_amount;
    }

    /// Rebuilds the full totals breakdown from the cached header fields.
    ///
    /// Only `subtotal`, `tax_amount` and `total_amount` are stored; the other
    /// two follow from the totals formula. When the cache is stale the result
    /// is stale too.
    pub fn cached_totals(&self) -> DocumentTotals {
        let effective_subtotal = self.total_amount - self.tax_amount - self.shipping_cost;
        DocumentTotals {
            subtotal: self.subtotal,
            total_line_discount: self.subtotal - effective_subtotal - self.discount_amount,
            effective_subtotal,
            tax_amount: self.tax_amount,
            total_amount: self.total_amount,
        }
    }

    /// Returns true if the cached fields agree with `totals`.
    pub fn totals_match(&self, totals: &DocumentTotals) -> bool {
        self.subtotal == totals.subtotal
            && self.tax_amount == totals.tax_amount
            && self.total_amount == totals.total_amount
    }
}

/// A header together with its canonical line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Document {
    pub header: DocumentHeader,
    pub items: Vec<LineItem>,
}

impl Document {
    /// Recomputes totals from the items and header adjustments.
    pub fn computed_totals(&self) -> DocumentTotals {
        crate::totals::compute_totals(
            self.items.iter().map(|item| &item.data),
            &self.header.adjustments(),
        )
    }
}

// =============================================================================
// Principal
// =============================================================================

/// The acting user and the tenant every storage operation is scoped to.
///
/// Supplied by the session layer; this crate never authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub tenant_id: String,
    pub user_id: String,
}

impl Principal {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Principal {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
