//! Rate source trait and the upstream rate table model.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Body of an upstream `latest` response.
///
/// All rates are expressed against `base`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestRates {
    /// Unix seconds at which upstream published the table.
    #[serde(default)]
    pub timestamp: i64,
    /// Base currency code.
    pub base: String,
    /// Currency code to rate against base.
    pub rates: HashMap<String, f64>,
}

impl LatestRates {
    /// Build a table from `(code, rate)` entries.
    pub fn new<'a>(base: &str, rates: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self {
            timestamp: 0,
            base: base.to_string(),
            rates: rates
                .into_iter()
                .map(|(code, rate)| (code.to_string(), rate))
                .collect(),
        }
    }
}

/// Trait for upstream rate feeds.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Fetch the latest base-currency rate table.
    async fn fetch_latest(&self) -> Result<LatestRates, FetchError>;
}

/// Mock rate source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    name: String,
    response: parking_lot::Mutex<Result<LatestRates, FetchError>>,
    calls: std::sync::atomic::AtomicUsize,
    delay: Option<std::time::Duration>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    /// Create a mock that serves the given rates against USD.
    pub fn new<'a>(rates: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self {
            name: "mock".to_string(),
            response: parking_lot::Mutex::new(Ok(LatestRates::new("USD", rates))),
            calls: std::sync::atomic::AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep for `delay` inside every fetch.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Serve a new table on the next fetches.
    pub fn set_rates<'a>(&self, rates: impl IntoIterator<Item = (&'a str, f64)>) {
        *self.response.lock() = Ok(LatestRates::new("USD", rates));
    }

    /// Fail the next fetches with `err`.
    pub fn fail_with(&self, err: FetchError) {
        *self.response.lock() = Err(err);
    }

    /// Number of fetches performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_latest(&self) -> Result<LatestRates, FetchError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.lock().clone()
    }
}
