//! Fixed-point money type backed by rust_decimal.
//!
//! Arithmetic keeps full decimal precision; values are rounded half-up to two
//! places only when persisted or displayed. Storage uses integer hundredths.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal as RustDecimal, RoundingStrategy};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of decimal places kept at the storage/display boundary.
pub const MONEY_SCALE: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("invalid amount: {0}")]
    Parse(String),
    #[error("amount {0} is out of the storable range")]
    OutOfRange(String),
}

/// A monetary amount.
///
/// Serializes as a two-place decimal string; deserializes from either a string or a JSON number.
/// JSON numbers are read from their literal text, never through `f64`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct Money(RustDecimal);

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_display_string())
    }
}

impl Money {
    pub fn new(value: RustDecimal) -> Self {
        Money(value)
    }

    pub fn zero() -> Self {
        Money(RustDecimal::ZERO)
    }

    pub fn hundred() -> Self {
        Money(RustDecimal::ONE_HUNDRED)
    }

    /// Whole units, e.g. `Money::from_units(100_000)` is 100000.
    pub fn from_units(units: i64) -> Self {
        Money(RustDecimal::from(units))
    }

    /// Exact conversion from an external float (exchange rates only).
    pub fn from_f64(value: f64) -> Result<Self, MoneyError> {
        RustDecimal::try_from(value)
            .map(Money)
            .map_err(|_| MoneyError::Parse(value.to_string()))
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn add(self, other: Money) -> Money {
        Money(self.0 + other.0)
    }

    pub fn subtract(self, other: Money) -> Money {
        Money(self.0 - other.0)
    }

    /// Round half-up (midpoint away from zero) to two decimal places.
    pub fn round2(self) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Convert to integer hundredths for persistence.
    pub fn to_storage(self) -> Result<i64, MoneyError> {
        let rounded = self.round2().0;
        rounded
            .checked_mul(RustDecimal::ONE_HUNDRED)
            .and_then(|scaled| scaled.to_i64())
            .ok_or_else(|| MoneyError::OutOfRange(rounded.to_string()))
    }

    /// Inverse of [`Money::to_storage`]; always yields a value with scale 2.
    pub fn from_storage(minor_units: i64) -> Money {
        Money(RustDecimal::new(minor_units, MONEY_SCALE))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Canonical two-place rendering used in descriptions and responses.
    pub fn to_display_string(&self) -> String {
        let rounded = self.round2().0;
        format!("{:.2}", rounded)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RustDecimal::from_str(s.trim())
            .map(Money)
            .map_err(|_| MoneyError::Parse(s.to_string()))
    }
}

impl From<RustDecimal> for Money {
    fn from(value: RustDecimal) -> Self {
        Money(value)
    }
}

impl From<Money> for RustDecimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Money {
    type Output = Money;

    fn mul(self, rhs: Money) -> Money {
        Money(self.0 * rhs.0)
    }
}

impl std::ops::Div for Money {
    type Output = Money;

    fn div(self, rhs: Money) -> Money {
        Money(self.0 / rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    #[test]
    fn test_round2_half_up() {
        assert_eq!(m("1.005").round2(), m("1.01"));
        assert_eq!(m("1.004").round2(), m("1.00"));
        assert_eq!(m("2.345").round2().to_display_string(), "2.35");
        assert_eq!(m("-2.345").round2().to_display_string(), "-2.35");
    }

    #[test]
    fn test_repeated_small_sums_do_not_drift() {
        let mut total = Money::zero();
        for _ in 0..1000 {
            total = total.add(m("0.1"));
        }
        assert_eq!(total, m("100"));
    }

    #[test]
    fn test_storage_boundary() {
        for s in ["0", "1.005", "100000", "123.456", "0.01", "99999999.99"] {
            let x = m(s);
            let stored = x.to_storage().unwrap();
            assert_eq!(Money::from_storage(stored), x.round2(), "boundary failed for {}", s);
        }
        assert_eq!(m("100000").to_storage().unwrap(), 10_000_000);
        assert_eq!(Money::from_storage(12345).to_display_string(), "123.45");
    }

    #[test]
    fn test_storage_out_of_range() {
        let huge = Money::new(RustDecimal::MAX);
        assert!(matches!(huge.to_storage(), Err(MoneyError::OutOfRange(_))));
    }

    #[test]
    fn test_subtract_and_sign() {
        let a = m("10.50");
        let b = m("12");
        assert!(a.subtract(b).is_negative());
        assert!(b.subtract(a).is_positive());
        assert!(a.subtract(a).is_zero());
    }

    #[test]
    fn test_json_accepts_string_and_number() {
        let from_str: Money = serde_json::from_str("\"100000.50\"").unwrap();
        let from_num: Money = serde_json::from_str("100000").unwrap();
        assert_eq!(from_str, m("100000.50"));
        assert_eq!(from_num, m("100000"));
    }

    #[test]
    fn test_json_number_keeps_every_digit() {
        let exact: Money = serde_json::from_str("12345678901234567.89").unwrap();
        assert_eq!(exact, m("12345678901234567.89"));
        let small: Money = serde_json::from_str("0.1").unwrap();
        assert_eq!(small + small + small, m("0.3"));
    }

    #[test]
    fn test_json_renders_two_places() {
        assert_eq!(serde_json::to_string(&m("100123")).unwrap(), "\"100123.00\"");
        assert_eq!(serde_json::to_string(&m("0.125")).unwrap(), "\"0.13\"");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(Money::from_str("12abc"), Err(MoneyError::Parse(_))));
    }

    #[test]
    fn test_from_f64_rate() {
        let rate = Money::from_f64(15500.0).unwrap();
        assert_eq!(rate, m("15500"));
    }
}
