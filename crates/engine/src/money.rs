use std::{fmt, str::FromStr};

use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::{Currency, EngineError, ResultEngine};

/// Money amount in a given currency, represented as **integer minor units**.
///
/// Domain code computes with exact [`Decimal`] values; this type is the
/// boundary to storage, where amounts are kept as `i64` minor units to avoid
/// any floating-point drift.
///
/// # Examples
///
/// ```rust
/// use engine::{Currency, Money};
/// use rust_decimal::Decimal;
///
/// let amount = Money::from_minor(12_34, Currency::Eur);
/// assert_eq!(amount.to_decimal(), Decimal::new(1234, 2));
/// assert_eq!(amount.to_string(), "12.34 EUR");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    minor: i64,
    currency: Currency,
}

impl Money {
    /// Creates a new amount from integer minor units.
    #[must_use]
    pub const fn from_minor(minor: i64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    /// Converts a decimal amount, rejecting values with more fraction digits
    /// than the currency supports.
    pub fn from_decimal(amount: Decimal, currency: Currency) -> ResultEngine<Self> {
        let minor = to_minor_units(amount, currency.minor_units())?;
        Ok(Self { minor, currency })
    }

    /// Returns the raw value in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.minor
    }

    #[must_use]
    pub const fn currency(self) -> Currency {
        self.currency
    }

    /// Returns the exact decimal value, carrying the currency scale.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        from_minor_units(self.minor, self.currency.minor_units())
    }

    /// Checked addition (returns `None` on overflow or currency mismatch).
    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        if self.currency != rhs.currency {
            return None;
        }
        self.minor
            .checked_add(rhs.minor)
            .map(|minor| Money::from_minor(minor, self.currency))
    }

    /// Checked subtraction (returns `None` on overflow or currency mismatch).
    #[must_use]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        if self.currency != rhs.currency {
            return None;
        }
        self.minor
            .checked_sub(rhs.minor)
            .map(|minor| Money::from_minor(minor, self.currency))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.currency.code())
    }
}

/// Converts `amount` into integer minor units at `scale`.
///
/// Fails if the amount has more fraction digits than `scale` or does not fit
/// into an `i64`.
pub(crate) fn to_minor_units(amount: Decimal, scale: u32) -> ResultEngine<i64> {
    if amount.normalize().scale() > scale {
        return Err(EngineError::InvalidAmount(format!(
            "{amount} has more than {scale} decimals"
        )));
    }
    let factor = 10_i64
        .checked_pow(scale)
        .map(Decimal::from)
        .ok_or_else(|| EngineError::InvalidAmount(format!("scale {scale} is too large")))?;
    amount
        .checked_mul(factor)
        .and_then(|units| units.to_i64())
        .ok_or_else(|| EngineError::InvalidAmount("amount too large".to_string()))
}

/// Builds the exact decimal value of `minor` units at `scale`.
pub(crate) fn from_minor_units(minor: i64, scale: u32) -> Decimal {
    Decimal::new(minor, scale)
}

/// Parses user input into a decimal amount for `currency`.
///
/// Accepts `.` or `,` as decimal separator and an optional leading `+`/`-`.
///
/// Validation rules:
/// - at most `currency.minor_units()` fractional digits (rejects `12.345` for EUR)
/// - rejects empty/invalid strings
pub fn parse_amount(raw: &str, currency: Currency) -> ResultEngine<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidAmount("empty amount".to_string()));
    }
    let normalized = trimmed.replace(',', ".");
    let digits = normalized.trim_start_matches(['+', '-']);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(EngineError::InvalidAmount("invalid amount".to_string()));
    }
    let amount = Decimal::from_str(normalized.trim_start_matches('+'))
        .map_err(|_| EngineError::InvalidAmount("invalid amount".to_string()))?;
    if amount.normalize().scale() > currency.minor_units() {
        return Err(EngineError::InvalidAmount("too many decimals".to_string()));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn display_uses_currency_scale() {
        assert_eq!(Money::from_minor(0, Currency::Eur).to_string(), "0.00 EUR");
        assert_eq!(Money::from_minor(1, Currency::Eur).to_string(), "0.01 EUR");
        assert_eq!(
            Money::from_minor(-1050, Currency::Usd).to_string(),
            "-10.50 USD"
        );
        assert_eq!(Money::from_minor(1200, Currency::Jpy).to_string(), "1200 JPY");
    }

    #[test]
    fn decimal_roundtrip_keeps_exact_value() {
        let money = Money::from_decimal(dec!(45.5), Currency::Eur).unwrap();
        assert_eq!(money.minor(), 4550);
        assert_eq!(money.to_decimal(), dec!(45.50));
    }

    #[test]
    fn excess_decimals_are_rejected() {
        assert!(Money::from_decimal(dec!(1.005), Currency::Eur).is_err());
        assert!(Money::from_decimal(dec!(1.5), Currency::Jpy).is_err());
        // trailing zeros are not significant
        assert!(Money::from_decimal(dec!(1.500), Currency::Eur).is_ok());
    }

    #[test]
    fn oversized_scale_is_an_error() {
        assert!(matches!(
            to_minor_units(dec!(1), 19),
            Err(EngineError::InvalidAmount(_))
        ));
        assert_eq!(to_minor_units(dec!(1), 18).unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn checked_ops_refuse_mixed_currencies() {
        let eur = Money::from_minor(100, Currency::Eur);
        let usd = Money::from_minor(100, Currency::Usd);
        assert!(eur.checked_add(usd).is_none());
        assert_eq!(
            eur.checked_sub(Money::from_minor(30, Currency::Eur)),
            Some(Money::from_minor(70, Currency::Eur))
        );
    }

    #[test]
    fn parse_accepts_dot_or_comma() {
        assert_eq!(parse_amount("10", Currency::Eur).unwrap(), dec!(10));
        assert_eq!(parse_amount("10,50", Currency::Eur).unwrap(), dec!(10.50));
        assert_eq!(parse_amount("+1.00", Currency::Eur).unwrap(), dec!(1));
        assert_eq!(parse_amount("-0.01", Currency::Eur).unwrap(), dec!(-0.01));
        assert_eq!(parse_amount("  2.30 ", Currency::Eur).unwrap(), dec!(2.3));
    }

    #[test]
    fn parse_rejects_garbage_and_precision() {
        assert!(parse_amount("", Currency::Eur).is_err());
        assert!(parse_amount("abc", Currency::Eur).is_err());
        assert!(parse_amount("1e3", Currency::Eur).is_err());
        assert!(parse_amount("12.345", Currency::Eur).is_err());
        assert!(parse_amount("12.345", Currency::Kwd).is_ok());
    }
}
