use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine};

/// ISO currency code used by a group and its expenses.
///
/// ## Minor units
///
/// The engine stores monetary values as an `i64` number of **minor units**.
/// `minor_units()` returns how many decimal digits are used when converting
/// between:
/// - major units (human input/output, e.g. `10.50 EUR`)
/// - minor units (stored integers, e.g. `1050`)
///
/// Currencies whose minor units differ from 2 (`JPY`, `KWD`) are only usable
/// once enabled through [`CurrencySupport`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Eur,
    Usd,
    Gbp,
    Chf,
    Jpy,
    Kwd,
}

impl Currency {
    /// Canonical currency code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Gbp => "GBP",
            Currency::Chf => "CHF",
            Currency::Jpy => "JPY",
            Currency::Kwd => "KWD",
        }
    }

    /// Number of fraction digits used when formatting/parsing amounts.
    ///
    /// Example: EUR uses 2 fraction digits (cents), JPY uses none.
    #[must_use]
    pub const fn minor_units(self) -> u32 {
        match self {
            Currency::Eur | Currency::Usd | Currency::Gbp | Currency::Chf => 2,
            Currency::Jpy => 0,
            Currency::Kwd => 3,
        }
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<&str> for Currency {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "EUR" => Ok(Currency::Eur),
            "USD" => Ok(Currency::Usd),
            "GBP" => Ok(Currency::Gbp),
            "CHF" => Ok(Currency::Chf),
            "JPY" => Ok(Currency::Jpy),
            "KWD" => Ok(Currency::Kwd),
            other => Err(EngineError::UnsupportedCurrency(format!(
                "unknown currency: {other}"
            ))),
        }
    }
}

/// Set of currencies the engine accepts.
///
/// Two-decimal currencies are always accepted; any other precision must be
/// enabled explicitly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CurrencySupport {
    enabled: BTreeSet<Currency>,
}

impl CurrencySupport {
    /// Enables a currency whose minor units differ from 2.
    #[must_use]
    pub fn enable(mut self, currency: Currency) -> Self {
        self.enabled.insert(currency);
        self
    }

    /// Returns the minor-unit scale of `currency`, or fails fast if it has not
    /// been configured.
    pub fn precision(&self, currency: Currency) -> ResultEngine<u32> {
        let scale = currency.minor_units();
        if scale == 2 || self.enabled.contains(&currency) {
            return Ok(scale);
        }
        Err(EngineError::UnsupportedCurrency(format!(
            "{} uses {scale} minor units and is not enabled",
            currency.code()
        )))
    }
}

impl<'a> FromIterator<&'a str> for CurrencySupport {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        iter.into_iter()
            .filter_map(|code| Currency::try_from(code).ok())
            .fold(Self::default(), Self::enable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Currency::try_from(" usd ").unwrap(), Currency::Usd);
        assert_eq!(Currency::try_from("eur").unwrap(), Currency::Eur);
    }

    #[test]
    fn unknown_code_is_unsupported() {
        assert!(matches!(
            Currency::try_from("XYZ"),
            Err(EngineError::UnsupportedCurrency(_))
        ));
    }

    #[test]
    fn non_decimal_currency_requires_opt_in() {
        let support = CurrencySupport::default();
        assert_eq!(support.precision(Currency::Eur).unwrap(), 2);
        assert!(matches!(
            support.precision(Currency::Jpy),
            Err(EngineError::UnsupportedCurrency(_))
        ));

        let support = support.enable(Currency::Jpy);
        assert_eq!(support.precision(Currency::Jpy).unwrap(), 0);
        assert!(support.precision(Currency::Kwd).is_err());
    }

    #[test]
    fn collect_from_codes_skips_unknown() {
        let support: CurrencySupport = ["JPY", "nope"].into_iter().collect();
        assert_eq!(support.precision(Currency::Jpy).unwrap(), 0);
    }
}
