//! # Money
//!
//! Amounts are stored as a signed count of cents. Nothing in the totals
//! pipeline touches floating point: quantities are thousandths of a unit,
//! rates are basis points, and every product of the two is rounded once,
//! half away from zero.
//!
//! ```text
//! unit_price × quantity ─► gross ─► − line discount ─► line net
//!                                                         │
//! Σ line net ─► subtotal ─► − general discount ─► effective subtotal
//!                                                         │
//!                         total = effective + tax(effective) + shipping
//! ```
//!
//! ```rust
//! use tessera_core::money::Money;
//!
//! let line = Money::from_cents(4000) + Money::from_cents(1690);
//! assert_eq!(line.to_string(), "56.90");
//! ```
//!
//! Editor floats become cents in [`crate::validation`], and only there.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

use crate::types::{Quantity, Rate};

/// Narrows an intermediate product, clamping at the `i64` bounds.
fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

/// Integer division, rounding half away from zero.
pub(crate) fn div_round(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

/// An amount in cents.
///
/// Signed because an effective subtotal can drop below zero when the
/// discounts exceed the line sum. Arithmetic saturates at the `i64` bounds;
/// validation keeps real documents far below them.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// The share of this amount a rate represents.
    ///
    /// Computed in i128 so a large invoice times 10000 bps cannot overflow.
    ///
    /// ```rust
    /// use tessera_core::money::Money;
    /// use tessera_core::types::Rate;
    ///
    /// // 10.00 at 8.25% is 0.825, which rounds up
    /// assert_eq!(Money::from_cents(1000).percentage(Rate::from_bps(825)).cents(), 83);
    /// ```
    pub fn percentage(&self, rate: Rate) -> Money {
        let cents = div_round(i128::from(self.0) * i128::from(rate.bps()), 10_000);
        Money(saturate(cents))
    }

    /// Tax owed on this amount at `rate`.
    #[inline]
    pub fn calculate_tax(&self, rate: Rate) -> Money {
        self.percentage(rate)
    }

    /// Unit price times a fractional quantity.
    ///
    /// ```rust
    /// use tessera_core::money::Money;
    /// use tessera_core::types::Quantity;
    ///
    /// // 1.5 hours at 80.00
    /// let line = Money::from_cents(8000).multiply_quantity(Quantity::from_milli(1500));
    /// assert_eq!(line.cents(), 12000);
    /// ```
    pub fn multiply_quantity(&self, qty: Quantity) -> Money {
        let cents = div_round(
            i128::from(self.0) * i128::from(qty.milli()),
            i128::from(Quantity::MILLI_PER_UNIT),
        );
        Money(saturate(cents))
    }

    /// Clamps negative amounts to zero.
    #[inline]
    pub const fn non_negative(&self) -> Money {
        if self.0 > 0 {
            Money(self.0)
        } else {
            Money(0)
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
