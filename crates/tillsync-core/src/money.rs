//! # Money Module
//!
//! Provides the `Money` type for the optimistic sale totals, and `Amount`
//! for the prices and quantities a payload carries.
//!
//! ## Integer Cents Inside, Decimals On The Wire
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                  │
//! │                                                                         │
//! │  The sale API speaks decimal major units ({"price": 12.5}).            │
//! │  Payload values stay an `Amount` and are replayed exactly as entered.  │
//! │  Totals are rounded to cents ONCE and summed on i64:                   │
//! │                                                                         │
//! │    JSON 0.125 ──► Amount(0.125) ──────────────────────► JSON 0.125     │
//! │                        └──line total──► Money(13) ──math──► Money(..)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tillsync_core::money::Money;
//!
//! let subtotal = Money::from_cents(1099) + Money::from_cents(201);
//! assert_eq!(subtotal.to_string(), "13.00");
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// Signed so that refunds and discounts can be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from a decimal amount in major units.
    ///
    /// Only used at the wire boundary; the value is rounded to the nearest
    /// cent (half away from zero).
    ///
    /// ```rust
    /// use tillsync_core::money::Money;
    ///
    /// assert_eq!(Money::from_major(12.5).cents(), 1250);
    /// assert_eq!(Money::from_major(0.1 + 0.2).cents(), 30);
    /// ```
    pub fn from_major(amount: f64) -> Self {
        Money((amount * 100.0).round() as i64)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the value as a decimal in major units (for the wire).
    pub fn to_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major_part(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented display; the frontend does localized formatting.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major_part().abs(), self.minor_part())
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Serde (decimal major units)
// =============================================================================

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_major())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        if !amount.is_finite() {
            return Err(serde::de::Error::custom("amount must be a finite number"));
        }
        Ok(Money::from_major(amount))
    }
}

// =============================================================================
// Amount (lossless wire decimal)
// =============================================================================

/// A price, tax or quantity exactly as the terminal submitted it.
///
/// Serializes back to the same JSON number it was parsed from, so a queued
/// payload is replayed unchanged. Fractional quantities (weighed goods) and
/// sub-cent prices are both allowed.
///
/// ```rust
/// use tillsync_core::money::Amount;
///
/// let price: Amount = serde_json::from_str("0.125").unwrap();
/// assert_eq!(serde_json::to_string(&price).unwrap(), "0.125");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Number);

impl Amount {
    /// Returns `None` for NaN and infinities, which JSON cannot carry.
    pub fn from_f64(value: f64) -> Option<Self> {
        Number::from_f64(value).map(Amount)
    }

    pub fn as_f64(&self) -> f64 {
        self.0.as_f64().unwrap_or_default()
    }

    pub fn is_negative(&self) -> bool {
        self.as_f64() < 0.0
    }

    pub fn is_positive(&self) -> bool {
        self.as_f64() > 0.0
    }

    /// Rounds to the nearest cent.
    pub fn to_money(&self) -> Money {
        Money::from_major(self.as_f64())
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount(Number::from(0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<i32> for Amount {
    fn from(value: i32) -> Self {
        Amount(Number::from(value))
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount(Number::from(value))
    }
}

impl From<Money> for Amount {
    fn from(money: Money) -> Self {
        if money.minor_part() == 0 {
            return Amount(Number::from(money.cents() / 100));
        }
        // Any i64 / 100 is finite
        Amount::from_f64(money.to_major()).unwrap_or_else(|| Amount(Number::from(money.major_part())))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
