//! Crypto token conversion over a fixed USD-denominated table.

use std::collections::HashMap;

use knm_common::{CryptoPair, RoundingPolicy};
use tracing::debug;

use crate::error::{FxError, FxResult};

/// USD rate and display precision of one token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenQuote {
    /// Value of one token in USD.
    pub usd_rate: f64,
    /// Rounding applied to amounts expressed in this token.
    pub rounding: RoundingPolicy,
}

impl TokenQuote {
    pub const fn new(decimals: u32, usd_rate: f64) -> Self {
        Self {
            usd_rate,
            rounding: RoundingPolicy::new(decimals),
        }
    }
}

const DEFAULT_TOKENS: [(&str, TokenQuote); 5] = [
    ("BEER", TokenQuote::new(18, 0.00002461)),
    ("FLOKI", TokenQuote::new(18, 0.0001428)),
    ("GATE", TokenQuote::new(18, 6.87)),
    ("USDT", TokenQuote::new(6, 0.999)),
    ("WBTC", TokenQuote::new(8, 57037.22)),
];

/// Converts amounts between crypto tokens through their USD rates.
#[derive(Debug, Clone)]
pub struct CryptoConverter {
    tokens: HashMap<String, TokenQuote>,
}

impl CryptoConverter {
    /// Create a converter with the built-in token table.
    pub fn new() -> Self {
        Self::with_tokens(DEFAULT_TOKENS)
    }

    /// Create a converter over a custom token table.
    pub fn with_tokens<S: AsRef<str>>(tokens: impl IntoIterator<Item = (S, TokenQuote)>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|(code, quote)| (code.as_ref().to_uppercase(), quote))
                .collect(),
        }
    }

    /// Look up a token case-insensitively.
    pub fn quote(&self, code: &str) -> Option<&TokenQuote> {
        self.tokens.get(&code.to_uppercase())
    }

    /// Convert `amount` of `from` into `to`, rounded to the precision of `to`.
    ///
    /// The returned pair echoes `from` and `to` as given.
    pub fn convert(&self, from: &str, to: &str, amount: f64) -> FxResult<CryptoPair> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(FxError::InvalidAmount(amount));
        }

        let from_quote = self.quote(from).ok_or_else(|| FxError::UnknownToken {
            code: from.to_string(),
        })?;
        let to_quote = self.quote(to).ok_or_else(|| FxError::UnknownToken {
            code: to.to_string(),
        })?;

        let usd_value = from_quote.usd_rate * amount;
        let converted = to_quote.rounding.apply(usd_value / to_quote.usd_rate);

        debug!(from, to, amount, converted, "Converted crypto amount");

        Ok(CryptoPair::new(from, to, converted))
    }
}

impl Default for CryptoConverter {
    fn default() -> Self {
        Self::new()
    }
}
