//! Rate store: the latest upstream rate table with a staleness-driven refresh.
//!
//! The table is held as an immutable [`RateSnapshot`] behind an `Arc`. A
//! refresh builds a complete new snapshot off-lock and swaps the pointer, so
//! readers never wait on the network and never see a half-written table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use knm_common::{from_unix_seconds, has_elapsed, now, Currency, Timestamp, DEFAULT_REFRESH_INTERVAL};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::{FetchError, FxResult};
use crate::provider::{LatestRates, RateSource};

/// One complete rate table as fetched from upstream.
#[derive(Debug, Clone)]
pub struct RateSnapshot {
    /// Implicit base of every rate in the table.
    pub base: Currency,
    rates: HashMap<Currency, f64>,
    /// Local time of the successful fetch that produced this table.
    pub fetched_at: Timestamp,
    /// Publication time reported by upstream, if it sent one.
    pub published_at: Option<Timestamp>,
}

impl RateSnapshot {
    /// Build a snapshot from an upstream response.
    ///
    /// Non-positive or non-finite rates are dropped, since every rate is later
    /// used as a divisor. Fails if no usable rate is left.
    pub fn from_latest(latest: LatestRates, fetched_at: Timestamp) -> Result<Self, FetchError> {
        let mut rates = HashMap::with_capacity(latest.rates.len());
        for (code, rate) in latest.rates {
            if !rate.is_finite() || rate <= 0.0 {
                warn!(currency = %code, rate, "Skipping invalid upstream rate");
                continue;
            }
            rates.insert(Currency::new(code), rate);
        }

        if rates.is_empty() {
            return Err(FetchError::Decode("empty rate table".to_string()));
        }

        let published_at = match latest.timestamp {
            0 => None,
            ts => from_unix_seconds(ts),
        };

        Ok(Self {
            base: Currency::new(latest.base),
            rates,
            fetched_at,
            published_at,
        })
    }

    /// Rate of `code` against the base, if present.
    pub fn rate_of(&self, code: &Currency) -> Option<f64> {
        self.rates.get(code).copied()
    }

    /// Number of currencies in the table.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Configuration for the rate store.
#[derive(Debug, Clone)]
pub struct RateStoreConfig {
    /// Maximum age of the table before the next read triggers a refresh.
    pub refresh_interval: Duration,
}

impl Default for RateStoreConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Thread-safe holder of the current rate table.
pub struct RateStore {
    source: Arc<dyn RateSource>,
    snapshot: RwLock<Arc<RateSnapshot>>,
    /// Serializes fetches and holds the outcome of the last completed one.
    refresh_gate: tokio::sync::Mutex<Option<Result<(), FetchError>>>,
    /// Number of completed fetch attempts, successful or not.
    attempts: AtomicU64,
    config: RateStoreConfig,
}

impl RateStore {
    /// Create a store and perform the initial fetch.
    ///
    /// Fails if the initial fetch fails; there is no empty-table state.
    #[instrument(skip(source, config), fields(source = source.name()))]
    pub async fn connect(source: Arc<dyn RateSource>, config: RateStoreConfig) -> FxResult<Self> {
        let latest = source.fetch_latest().await?;
        let snapshot = RateSnapshot::from_latest(latest, now())?;

        info!(
            base = %snapshot.base,
            currencies = snapshot.len(),
            refresh_interval_secs = config.refresh_interval.as_secs(),
            "Rate store initialized"
        );

        Ok(Self::with_snapshot(source, config, snapshot))
    }

    /// Create a store around an already fetched table.
    pub fn with_snapshot(
        source: Arc<dyn RateSource>,
        config: RateStoreConfig,
        snapshot: RateSnapshot,
    ) -> Self {
        Self {
            source,
            snapshot: RwLock::new(Arc::new(snapshot)),
            refresh_gate: tokio::sync::Mutex::new(None),
            attempts: AtomicU64::new(0),
            config,
        }
    }

    /// Fetch a new table from upstream and swap it in.
    ///
    /// On failure the current table is left untouched.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let mut last = self.refresh_gate.lock().await;
        self.attempt(&mut last).await
    }

    /// Refresh only if the table is stale. Returns whether this call fetched.
    ///
    /// Callers arriving while another fetch is in flight wait for it and take
    /// its outcome, error included, instead of fetching again. A burst of
    /// stale readers therefore costs one upstream call and at most one
    /// upstream timeout.
    pub async fn refresh_if_stale(&self) -> Result<bool, FetchError> {
        if !self.is_stale() {
            return Ok(false);
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let mut last = self.refresh_gate.lock().await;

        if self.attempts.load(Ordering::Acquire) != seen {
            debug!("Sharing outcome of a concurrent refresh");
            return match &*last {
                Some(Err(e)) => Err(e.clone()),
                _ => Ok(false),
            };
        }

        if !self.is_stale() {
            return Ok(false);
        }

        self.attempt(&mut last).await?;
        Ok(true)
    }

    /// Whether more than the refresh interval has passed since the last
    /// successful fetch.
    pub fn is_stale(&self) -> bool {
        has_elapsed(self.snapshot.read().fetched_at, self.config.refresh_interval)
    }

    /// Rate of `code` against the base in the current table.
    pub fn rate_of(&self, code: &Currency) -> Option<f64> {
        self.snapshot.read().rate_of(code)
    }

    /// The current table. Holding it pins that table even across refreshes.
    pub fn snapshot(&self) -> Arc<RateSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Run one fetch under the gate and publish its outcome to waiters.
    ///
    /// If this future is dropped mid-fetch nothing is recorded, so the next
    /// waiter fetches on its own.
    async fn attempt(&self, last: &mut Option<Result<(), FetchError>>) -> Result<(), FetchError> {
        let result = self.fetch_and_swap().await;
        *last = Some(result.clone());
        self.attempts.fetch_add(1, Ordering::Release);
        result
    }

    #[instrument(skip(self), fields(source = self.source.name()))]
    async fn fetch_and_swap(&self) -> Result<(), FetchError> {
        let latest = match self.source.fetch_latest().await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(error = %e, "Rate refresh failed, keeping previous table");
                return Err(e);
            }
        };

        let mut next = RateSnapshot::from_latest(latest, now()).map_err(|e| {
            warn!(error = %e, "Rejected upstream rate table, keeping previous table");
            e
        })?;

        let mut current = self.snapshot.write();
        // fetched_at never moves backwards, even if the wall clock does.
        if next.fetched_at < current.fetched_at {
            next.fetched_at = current.fetched_at;
        }
        info!(
            base = %next.base,
            currencies = next.len(),
            published_at = ?next.published_at,
            "Rate table refreshed"
        );
        *current = Arc::new(next);

        Ok(())
    }
}
