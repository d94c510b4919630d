//! Currency codes and the conversion records returned to clients.

use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO 4217-style currency code, always stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code. The code is normalized to uppercase.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }

    pub fn pln() -> Self {
        Self::new("PLN")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Currency {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for Currency {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A derived conversion rate between two fiat currencies.
///
/// `rate` is how many units of `to` one unit of `from` buys, rounded with
/// the cross-rate policy. Produced per request and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Currency being converted from.
    pub from: Currency,
    /// Currency being converted to.
    pub to: Currency,
    /// Rounded cross-rate.
    pub rate: f64,
}

impl CurrencyPair {
    /// Create a new currency pair record.
    pub fn new(from: Currency, to: Currency, rate: f64) -> Self {
        Self { from, to, rate }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} @ {}", self.from, self.to, self.rate)
    }
}

/// Result of converting an amount of one crypto token into another.
///
/// `from` and `to` echo the codes as the caller supplied them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoPair {
    pub from: String,
    pub to: String,
    pub amount: f64,
}

impl CryptoPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }
}
