//! FX engine error types.

use knm_common::Currency;
use thiserror::Error;

/// Failures while fetching the latest rate table from upstream.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The configured base URL cannot be turned into a request URL.
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    /// The request did not complete before the client timeout.
    #[error("Upstream request timed out")]
    Timeout,

    /// Connection, TLS or body transfer failure.
    #[error("Upstream transport error: {0}")]
    Transport(String),

    /// Upstream answered with something other than 200 OK.
    #[error("Upstream returned status {0}")]
    Status(u16),

    /// The response body is not a valid rate table.
    #[error("Failed to decode upstream response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Errors that can occur in the FX engine.
#[derive(Debug, Clone, Error)]
pub enum FxError {
    /// Refreshing the rate table failed.
    #[error("Failed to get latest rates: {0}")]
    Fetch(#[from] FetchError),

    /// The same currency was requested more than once.
    #[error("Duplicate currencies")]
    DuplicateCurrency,

    /// Fewer than two currencies were requested.
    #[error("At least two currencies are required")]
    InsufficientCurrencies,

    /// Currency is not present in the current rate table.
    #[error("Unknown currency: {code}")]
    UnknownCurrency { code: Currency },

    /// Conversion amount must be a positive finite number.
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    /// Token is not present in the crypto conversion table.
    #[error("Unknown token: {code}")]
    UnknownToken { code: String },
}

impl FxError {
    /// Get error code for logs and API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::Fetch(_) => "FETCH_FAILED",
            FxError::DuplicateCurrency => "DUPLICATE_CURRENCY",
            FxError::InsufficientCurrencies => "INSUFFICIENT_CURRENCIES",
            FxError::UnknownCurrency { .. } => "UNKNOWN_CURRENCY",
            FxError::InvalidAmount(_) => "INVALID_AMOUNT",
            FxError::UnknownToken { .. } => "UNKNOWN_TOKEN",
        }
    }

    /// Whether the caller's input caused the error, as opposed to upstream.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, FxError::Fetch(_))
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(FxError::DuplicateCurrency.error_code(), "DUPLICATE_CURRENCY");
        assert_eq!(
            FxError::from(FetchError::Status(503)).error_code(),
            "FETCH_FAILED"
        );
        assert_eq!(
            FxError::UnknownCurrency { code: Currency::new("jpy") }.to_string(),
            "Unknown currency: JPY"
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(FxError::InsufficientCurrencies.is_client_error());
        assert!(!FxError::Fetch(FetchError::Timeout).is_client_error());
    }
}
