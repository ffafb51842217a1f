//! Minor-unit money amounts.
//!
//! Every amount in the data model is an integer count of minor currency
//! units (`unit_amount_cents`, `subtotal_amount`, …) rather than a
//! floating-point value, so summation and tax math stay exact. A
//! currency tag travels alongside the amount; the engine never adds two
//! [`Money`] values of different currencies.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money {
    pub cents: i64,
    pub currency: Currency,
}

/// ISO-4217-ish currency code. Stored as a fixed 3-byte array rather than
/// a heap `String` since it is copied constantly through rating and
/// invoicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Currency([u8; 3]);

#[derive(Debug, Error)]
pub enum CurrencyError {
    #[error("currency code must be exactly 3 ASCII letters, got {0:?}")]
    InvalidFormat(String),
}

impl Currency {
    pub fn parse(code: &str) -> Result<Self, CurrencyError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_alphabetic()) {
            return Err(CurrencyError::InvalidFormat(code.to_string()));
        }
        let mut upper = [0u8; 3];
        for (i, b) in bytes.iter().enumerate() {
            upper[i] = b.to_ascii_uppercase();
        }
        Ok(Self(upper))
    }

    pub fn usd() -> Self {
        Self::parse("USD").expect("USD is a valid currency code")
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).expect("currency codes are always ASCII")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum MoneyError {
    #[error("currency mismatch: {0} vs {1}")]
    CurrencyMismatch(Currency, Currency),
    #[error("amount overflow adding {0} and {1} cents")]
    Overflow(i64, i64),
}

impl Money {
    pub fn new(cents: i64, currency: Currency) -> Self {
        Self { cents, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self { cents: 0, currency }
    }

    pub fn checked_add(self, other: Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(self.currency, other.currency));
        }
        let cents = self
            .cents
            .checked_add(other.cents)
            .ok_or(MoneyError::Overflow(self.cents, other.cents))?;
        Ok(Money::new(cents, self.currency))
    }

    /// Clamp into `[min, max]` if those bounds are present, as used by
    /// `per_unit` pricing's minimum/maximum amount fields.
    pub fn clamp(self, min: Option<i64>, max: Option<i64>) -> Money {
        let mut cents = self.cents;
        if let Some(min) = min {
            cents = cents.max(min);
        }
        if let Some(max) = max {
            cents = cents.min(max);
        }
        Money::new(cents, self.currency)
    }
}

impl Add for Money {
    type Output = Money;

    /// Panics on currency mismatch; callers who need to handle mismatched
    /// currencies gracefully should use [`Money::checked_add`].
    fn add(self, rhs: Money) -> Money {
        self.checked_add(rhs).expect("currency mismatch in Money addition")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_currency_case() {
        let c = Currency::parse("usd").unwrap();
        assert_eq!(c.as_str(), "USD");
    }

    #[test]
    fn rejects_malformed_currency() {
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("US1").is_err());
    }

    #[test]
    fn add_requires_matching_currency() {
        let usd = Currency::usd();
        let eur = Currency::parse("EUR").unwrap();
        let a = Money::new(100, usd);
        let b = Money::new(50, eur);
        assert!(a.checked_add(b).is_err());
        assert_eq!(a.checked_add(Money::new(50, usd)).unwrap().cents, 150);
    }

    #[test]
    fn clamp_applies_bounds() {
        let usd = Currency::usd();
        assert_eq!(Money::new(10, usd).clamp(Some(100), None).cents, 100);
        assert_eq!(Money::new(1000, usd).clamp(None, Some(500)).cents, 500);
        assert_eq!(Money::new(200, usd).clamp(Some(100), Some(500)).cents, 200);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // clamp's result always falls within [min, max] whenever both
            // bounds are given, regardless of the starting amount.
            #[test]
            fn clamp_result_is_within_bounds(
                cents in i64::MIN / 2..i64::MAX / 2,
                min in 0i64..1_000_000,
                max in 1_000_000i64..2_000_000,
            ) {
                let clamped = Money::new(cents, Currency::usd()).clamp(Some(min), Some(max)).cents;
                prop_assert!(clamped >= min && clamped <= max);
            }

            // checked_add is commutative and exact for same-currency
            // amounts: no rounding, no silent overflow within this range.
            #[test]
            fn checked_add_is_commutative(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
                let usd = Currency::usd();
                let ab = Money::new(a, usd).checked_add(Money::new(b, usd)).unwrap();
                let ba = Money::new(b, usd).checked_add(Money::new(a, usd)).unwrap();
                prop_assert_eq!(ab.cents, ba.cents);
                prop_assert_eq!(ab.cents, a + b);
            }
        }
    }
}
