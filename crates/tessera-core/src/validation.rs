//! # Validation Module
//!
//! Turns the invoice editor's loosely typed payloads into domain types.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Invoice editor (TypeScript)                                  │
//! │  ├── Form state, immediate feedback                                    │
//! │  └── Sends numbers as the user typed them (may be "", "abc", null)     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Loose deserialization: anything non-numeric becomes NaN           │
//! │  ├── NumericPolicy: Lenient → NaN/negative become 0                    │
//! │  │                  Strict  → NaN/negative are ValidationErrors        │
//! │  └── Conversion to Money / Quantity / Rate (the only float → int step) │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── Foreign keys                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tessera_core::validation::{normalize_line_item, InputRules, LineItemInput};
//!
//! let input: LineItemInput = serde_json::from_str(
//!     r#"{ "id": "temp-1", "description": "Hosting", "quantity": "abc", "unit_price": 12.5 }"#,
//! ).unwrap();
//!
//! let item = normalize_line_item(input, &InputRules::default(), 0).unwrap();
//! assert!(item.data.quantity.is_zero()); // coerced under the lenient policy
//! assert_eq!(item.data.unit_price.cents(), 1250);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{
    DocumentHeader, DocumentStatus, ItemId, LineDiscount, LineItem, LineItemData, Quantity, Rate,
};
use crate::{
    MAX_AMOUNT_CENTS, MAX_DESCRIPTION_LEN, MAX_LINE_ITEMS, MAX_QUANTITY_UNITS,
    TRANSIENT_ID_PREFIX,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Policy
// =============================================================================

/// What to do with malformed numeric input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericPolicy {
    /// NaN, infinite, non-numeric and negative values become 0.
    #[default]
    Lenient,
    /// Such values are rejected.
    Strict,
}

impl fmt::Display for NumericPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericPolicy::Lenient => write!(f, "lenient"),
            NumericPolicy::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for NumericPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lenient" | "coerce" => Ok(NumericPolicy::Lenient),
            "strict" | "reject" => Ok(NumericPolicy::Strict),
            _ => Err(ValidationError::NotAllowed {
                field: "numeric_policy".to_string(),
                allowed: vec!["lenient".to_string(), "strict".to_string()],
            }),
        }
    }
}

/// Settings applied while normalizing a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRules {
    pub numeric_policy: NumericPolicy,
    /// Used when the header omits a currency.
    pub default_currency: String,
}

impl Default for InputRules {
    fn default() -> Self {
        InputRules {
            numeric_policy: NumericPolicy::Lenient,
            default_currency: "EUR".to_string(),
        }
    }
}

// =============================================================================
// Raw Input Payloads
// =============================================================================

/// A line item as submitted by the editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItemInput {
    /// Missing ids are treated as new rows.
    #[serde(default)]
    #[ts(type = "number | string | null")]
    pub id: Option<ItemId>,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "loose::number")]
    pub quantity: f64,
    /// Major units (e.g. 12.5 = 12.50).
    #[serde(default, deserialize_with = "loose::number")]
    pub unit_price: f64,
    #[serde(default, deserialize_with = "loose::optional_number")]
    pub discount_percentage: Option<f64>,
    #[serde(default, deserialize_with = "loose::optional_number")]
    pub discount_amount: Option<f64>,
    /// Percent.
    #[serde(default, deserialize_with = "loose::optional_number")]
    pub tax_rate: Option<f64>,
    #[serde(default)]
    pub position: Option<i64>,
}

/// A document header as submitted by the editor. Computed totals are not
/// accepted from callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentHeaderInput {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Percent.
    #[serde(default, deserialize_with = "loose::number")]
    pub tax_rate: f64,
    #[serde(default, deserialize_with = "loose::number")]
    pub discount_amount: f64,
    #[serde(default, deserialize_with = "loose::number")]
    pub shipping_cost: f64,
}

/// Lenient number deserializers: anything that is not a number or a numeric
/// string reads as NaN and is left to the [`NumericPolicy`].
mod loose {
    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum LooseNumber {
        Number(f64),
        Text(String),
        Other(IgnoredAny),
    }

    impl LooseNumber {
        fn into_f64(self) -> Option<f64> {
            match self {
                LooseNumber::Number(n) => Some(n),
                LooseNumber::Text(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        None
                    } else {
                        Some(text.parse().unwrap_or(f64::NAN))
                    }
                }
                LooseNumber::Other(_) => Some(f64::NAN),
            }
        }
    }

    pub fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<LooseNumber>::deserialize(deserializer)?;
        Ok(value.and_then(LooseNumber::into_f64).unwrap_or(f64::NAN))
    }

    pub fn optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<LooseNumber>::deserialize(deserializer)?;
        Ok(value.and_then(LooseNumber::into_f64))
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Applies the numeric policy to a raw value.
///
/// ## Rules
/// - NaN / infinite → `NotFinite` (strict) or 0 (lenient)
/// - Negative → `Negative` (strict) or 0 (lenient)
pub fn non_negative_number(field: &str, value: f64, policy: NumericPolicy) -> ValidationResult<f64> {
    if !value.is_finite() {
        return match policy {
            NumericPolicy::Lenient => Ok(0.0),
            NumericPolicy::Strict => Err(ValidationError::NotFinite {
                field: field.to_string(),
            }),
        };
    }

    if value < 0.0 {
        return match policy {
            NumericPolicy::Lenient => Ok(0.0),
            NumericPolicy::Strict => Err(ValidationError::Negative {
                field: field.to_string(),
            }),
        };
    }

    Ok(value)
}

fn amount_out_of_range(field: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: MAX_AMOUNT_CENTS / 100,
    }
}

/// Converts a major-unit amount into [`Money`].
///
/// Amounts above [`MAX_AMOUNT_CENTS`] are rejected under either policy.
///
/// ## Example
/// ```rust
/// use tessera_core::validation::{money_from_input, NumericPolicy};
///
/// assert_eq!(money_from_input("price", 18.9, NumericPolicy::Lenient).unwrap().cents(), 1890);
/// assert_eq!(money_from_input("price", f64::NAN, NumericPolicy::Lenient).unwrap().cents(), 0);
/// assert!(money_from_input("price", -1.0, NumericPolicy::Strict).is_err());
/// ```
pub fn money_from_input(field: &str, value: f64, policy: NumericPolicy) -> ValidationResult<Money> {
    let cents = (non_negative_number(field, value, policy)? * 100.0).round();
    if cents > MAX_AMOUNT_CENTS as f64 {
        return Err(amount_out_of_range(field));
    }
    Ok(Money::from_cents(cents as i64))
}

/// Converts a unit count into [`Quantity`] (thousandths), at most
/// [`MAX_QUANTITY_UNITS`].
pub fn quantity_from_input(
    field: &str,
    value: f64,
    policy: NumericPolicy,
) -> ValidationResult<Quantity> {
    let value = non_negative_number(field, value, policy)?;
    if value > MAX_QUANTITY_UNITS as f64 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_QUANTITY_UNITS,
        });
    }
    Ok(Quantity::from_milli(
        (value * Quantity::MILLI_PER_UNIT as f64).round() as i64,
    ))
}

/// Converts a percentage into [`Rate`].
///
/// ## Rules
/// - Numeric policy as above
/// - Must not exceed 100% under either policy
pub fn rate_from_input(field: &str, value: f64, policy: NumericPolicy) -> ValidationResult<Rate> {
    let value = non_negative_number(field, value, policy)?;
    let rate = Rate::from_percentage(value);
    validate_rate(field, rate)?;
    Ok(rate)
}

/// Validates that a rate is at most 100%.
pub fn validate_rate(field: &str, rate: Rate) -> ValidationResult<()> {
    if rate.bps() > Rate::MAX_BPS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 100,
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates and normalizes an ISO 4217 currency code.
///
/// ## Example
/// ```rust
/// use tessera_core::validation::validate_currency;
///
/// assert_eq!(validate_currency(" eur ").unwrap(), "EUR");
/// assert!(validate_currency("EURO").is_err());
/// assert!(validate_currency("").is_err());
/// ```
pub fn validate_currency(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "currency".to_string(),
        });
    }

    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: "must be a 3-letter ISO 4217 code".to_string(),
        });
    }

    Ok(code.to_ascii_uppercase())
}

/// Validates a line item description and returns it trimmed.
///
/// Empty descriptions are allowed; drafts are often saved mid-edit.
pub fn validate_description(description: &str) -> ValidationResult<String> {
    let description = description.trim();

    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: MAX_DESCRIPTION_LEN,
        });
    }

    Ok(description.to_string())
}

/// Validates the number of lines in one submission.
pub fn validate_item_count(count: usize) -> ValidationResult<()> {
    if count > MAX_LINE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "line items".to_string(),
            min: 0,
            max: MAX_LINE_ITEMS as i64,
        });
    }
    Ok(())
}

/// Validates a submitted item identity.
///
/// Transient tokens must carry [`TRANSIENT_ID_PREFIX`]; durable ids must be
/// positive.
pub fn validate_item_id(id: &ItemId) -> ValidationResult<()> {
    match id {
        ItemId::Transient(token) => {
            let has_suffix = token.len() > TRANSIENT_ID_PREFIX.len();
            if !(has_suffix && token.starts_with(TRANSIENT_ID_PREFIX)) {
                return Err(ValidationError::InvalidFormat {
                    field: "item id".to_string(),
                    reason: format!(
                        "'{}' is neither a durable id nor a '{}' token",
                        token, TRANSIENT_ID_PREFIX
                    ),
                });
            }
            Ok(())
        }
        ItemId::Durable(id) if *id <= 0 => Err(ValidationError::OutOfRange {
            field: "item id".to_string(),
            min: 1,
            max: i64::MAX,
        }),
        ItemId::Durable(_) => Ok(()),
    }
}

/// Rejects a submission that names the same durable id twice.
///
/// Storage holds one row per id, so a repeated id would be counted twice in
/// the totals but written once.
pub fn validate_unique_ids(items: &[LineItem]) -> ValidationResult<()> {
    let mut seen = HashSet::new();
    for id in items.iter().filter_map(|item| item.id.durable()) {
        if !seen.insert(id) {
            return Err(ValidationError::InvalidFormat {
                field: "item id".to_string(),
                reason: format!("durable id {} submitted more than once", id),
            });
        }
    }
    Ok(())
}

/// Rejects a submission whose gross line sum exceeds [`MAX_AMOUNT_CENTS`].
pub fn validate_subtotal(items: &[LineItem]) -> ValidationResult<()> {
    let subtotal: i128 = items
        .iter()
        .map(|item| i128::from(item.data.gross().cents()))
        .sum();
    if subtotal > i128::from(MAX_AMOUNT_CENTS) {
        return Err(amount_out_of_range("subtotal"));
    }
    Ok(())
}

// =============================================================================
// Normalizers
// =============================================================================

/// Normalizes one submitted line.
///
/// ## Discount Resolution
/// ```text
/// discount_amount > 0         → LineDiscount::Amount      (absolute wins)
/// else discount_percentage > 0 → LineDiscount::Percentage
/// else                         → LineDiscount::None
/// ```
///
/// `fallback_position` is used when the editor did not send a position.
pub fn normalize_line_item(
    input: LineItemInput,
    rules: &InputRules,
    fallback_position: i64,
) -> ValidationResult<LineItem> {
    let policy = rules.numeric_policy;

    let quantity = quantity_from_input("quantity", input.quantity, policy)?;
    let unit_price = money_from_input("unit_price", input.unit_price, policy)?;

    let discount_amount = input
        .discount_amount
        .map(|value| money_from_input("discount_amount", value, policy))
        .transpose()?
        .unwrap_or_default();
    let discount_rate = input
        .discount_percentage
        .map(|value| rate_from_input("discount_percentage", value, policy))
        .transpose()?
        .unwrap_or_default();

    let discount = if discount_amount.is_positive() {
        LineDiscount::Amount(discount_amount)
    } else if !discount_rate.is_zero() {
        LineDiscount::Percentage(discount_rate)
    } else {
        LineDiscount::None
    };

    let tax_rate = input
        .tax_rate
        .map(|value| rate_from_input("tax_rate", value, policy))
        .transpose()?;

    let id = match input.id {
        Some(id) => {
            validate_item_id(&id)?;
            id
        }
        None => ItemId::new_transient(),
    };

    Ok(LineItem {
        id,
        data: LineItemData {
            description: validate_description(&input.description)?,
            quantity,
            unit_price,
            discount,
            tax_rate,
            position: input.position.unwrap_or(fallback_position),
        },
    })
}

/// Normalizes a full submission, numbering missing positions by order.
///
/// Besides the per-line rules, a durable id may appear at most once and the
/// gross line sum must stay within [`MAX_AMOUNT_CENTS`].
pub fn normalize_items(
    inputs: Vec<LineItemInput>,
    rules: &InputRules,
) -> ValidationResult<Vec<LineItem>> {
    validate_item_count(inputs.len())?;

    let items = inputs
        .into_iter()
        .enumerate()
        .map(|(index, input)| normalize_line_item(input, rules, index as i64))
        .collect::<ValidationResult<Vec<_>>>()?;

    validate_unique_ids(&items)?;
    validate_subtotal(&items)?;
    Ok(items)
}

/// Normalizes a submitted header.
///
/// ## Rules
/// - Submitted status, when present, must be `Draft`; moving a document out
///   of draft is a lifecycle transition, not a save
/// - Currency falls back to `rules.default_currency`
/// - `due_date` must not precede `issue_date`
/// - Computed totals start at zero; the persister fills them in
pub fn normalize_header(
    input: DocumentHeaderInput,
    rules: &InputRules,
) -> ValidationResult<DocumentHeader> {
    let policy = rules.numeric_policy;

    if let Some(status) = input.status {
        if status != DocumentStatus::Draft {
            return Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: vec![DocumentStatus::Draft.to_string()],
            });
        }
    }

    if let (Some(issued), Some(due)) = (input.issue_date, input.due_date) {
        if due < issued {
            return Err(ValidationError::InvalidFormat {
                field: "due_date".to_string(),
                reason: "must not precede issue_date".to_string(),
            });
        }
    }

    let currency = match input.currency.as_deref() {
        Some(code) if !code.trim().is_empty() => validate_currency(code)?,
        _ => validate_currency(&rules.default_currency)?,
    };

    let mut header = DocumentHeader::draft(currency);
    header.id = input.id;
    header.issue_date = input.issue_date;
    header.due_date = input.due_date;
    header.notes = input
        .notes
        .map(|notes| notes.trim().to_string())
        .filter(|notes| !notes.is_empty());
    header.tax_rate = rate_from_input("tax_rate", input.tax_rate, policy)?;
    header.discount_amount = money_from_input("discount_amount", input.discount_amount, policy)?;
    header.shipping_cost = money_from_input("shipping_cost", input.shipping_cost, policy)?;

    Ok(header)
}

// =============================================================================
// Unit Tests
// =============================================================================
