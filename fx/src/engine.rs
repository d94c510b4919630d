//! Cross-rate calculator.

use std::collections::HashSet;
use std::sync::Arc;

use knm_common::{Currency, CurrencyPair, RoundingPolicy};
use tracing::{debug, instrument};

use crate::cache::{RateSnapshot, RateStore};
use crate::error::{FxError, FxResult};

/// Derives every ordered pairwise rate for a set of currencies.
///
/// All pairs are computed through the store's common base, so
/// `rate(A→B) * rate(B→A)` is exactly 1 before rounding.
pub struct CrossRateCalculator {
    store: Arc<RateStore>,
    rounding: RoundingPolicy,
}

impl CrossRateCalculator {
    /// Create a calculator that rounds with [`RoundingPolicy::CROSS_RATE`].
    pub fn new(store: Arc<RateStore>) -> Self {
        Self::with_rounding(store, RoundingPolicy::CROSS_RATE)
    }

    /// Create a calculator with a custom rounding policy.
    pub fn with_rounding(store: Arc<RateStore>, rounding: RoundingPolicy) -> Self {
        Self { store, rounding }
    }

    /// The underlying rate store.
    pub fn store(&self) -> &Arc<RateStore> {
        &self.store
    }

    /// Compute rates for every ordered pair of `currencies`, in input order.
    ///
    /// Codes are matched case-insensitively. The whole call fails on the
    /// first invalid input; there are no partial results. A stale table is
    /// refreshed before any code is looked up.
    #[instrument(skip(self, currencies), fields(count = currencies.len()))]
    pub async fn compute<S: AsRef<str>>(&self, currencies: &[S]) -> FxResult<Vec<CurrencyPair>> {
        let codes: Vec<Currency> = currencies.iter().map(|c| Currency::new(c)).collect();

        let distinct: HashSet<&Currency> = codes.iter().collect();
        if distinct.len() != codes.len() {
            return Err(FxError::DuplicateCurrency);
        }

        if codes.len() < 2 {
            return Err(FxError::InsufficientCurrencies);
        }

        if self.store.refresh_if_stale().await? {
            debug!("Refreshed stale rates before computing");
        }

        // One snapshot for the whole call, so a concurrent refresh cannot mix tables.
        let snapshot = self.store.snapshot();
        let rates = lookup_all(&snapshot, &codes)?;

        let pairs = pairwise(&codes, &rates, self.rounding);
        debug!(pairs = pairs.len(), "Computed cross-rates");

        Ok(pairs)
    }
}

/// Resolve every code against the table before any arithmetic happens.
fn lookup_all(snapshot: &RateSnapshot, codes: &[Currency]) -> FxResult<Vec<f64>> {
    codes
        .iter()
        .map(|code| {
            snapshot
                .rate_of(code)
                .ok_or_else(|| FxError::UnknownCurrency { code: code.clone() })
        })
        .collect()
}

fn pairwise(codes: &[Currency], rates: &[f64], rounding: RoundingPolicy) -> Vec<CurrencyPair> {
    let mut pairs = Vec::with_capacity(codes.len() * codes.len().saturating_sub(1));
    for (i, from) in codes.iter().enumerate() {
        for (j, to) in codes.iter().enumerate() {
            if i == j {
                continue;
            }
            let rate = rounding.apply(rates[j] / rates[i]);
            pairs.push(CurrencyPair::new(from.clone(), to.clone(), rate));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RateStoreConfig;
    use crate::error::FetchError;
    use crate::provider::{LatestRates, MockRateSource};
    use chrono::Duration as ChronoDuration;
    use knm_common::now;
    use proptest::prelude::*;
    use tokio_test::{assert_err, assert_ok};

    const SYNTHETIC: [(&str, f64); 4] = [("USD", 1.00), ("EUR", 0.8), ("PLN", 3.5), ("GBP", 0.75)];

    fn calculator_with(
        rates: &[(&'static str, f64)],
        source: Arc<MockRateSource>,
        fetched_hours_ago: i64,
    ) -> CrossRateCalculator {
        let latest = LatestRates::new("USD", rates.iter().copied());
        let fetched_at = now() - ChronoDuration::hours(fetched_hours_ago);
        let snapshot = RateSnapshot::from_latest(latest, fetched_at).unwrap();
        let store = RateStore::with_snapshot(source, RateStoreConfig::default(), snapshot);
        CrossRateCalculator::new(Arc::new(store))
    }

    fn fresh_calculator(rates: &[(&'static str, f64)]) -> (CrossRateCalculator, Arc<MockRateSource>) {
        let source = Arc::new(MockRateSource::new(rates.iter().copied()));
        (calculator_with(rates, source.clone(), 0), source)
    }

    fn pair(from: &str, to: &str, rate: f64) -> CurrencyPair {
        CurrencyPair::new(Currency::new(from), Currency::new(to), rate)
    }

    #[tokio::test]
    async fn test_compute_fetched_rates() {
        let source = Arc::new(MockRateSource::new([("EUR", 0.858611), ("USD", 1.00)]));
        let store = RateStore::connect(source.clone(), RateStoreConfig::default())
            .await
            .unwrap();
        let calculator = CrossRateCalculator::new(Arc::new(store));

        let pairs = calculator.compute(&["USD", "EUR"]).await.unwrap();

        assert_eq!(pairs, vec![pair("USD", "EUR", 0.86), pair("EUR", "USD", 1.16)]);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_compute_synthetic_rates() {
        let (calculator, source) = fresh_calculator(&SYNTHETIC);

        let pairs = calculator.compute(&["USD", "EUR"]).await.unwrap();
        assert_eq!(pairs, vec![pair("USD", "EUR", 0.8), pair("EUR", "USD", 1.25)]);

        let pairs = calculator.compute(&["PLN", "GBP"]).await.unwrap();
        assert_eq!(pairs, vec![pair("PLN", "GBP", 0.21), pair("GBP", "PLN", 4.67)]);

        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_compute_keeps_input_order() {
        let (calculator, _) = fresh_calculator(&SYNTHETIC);

        let pairs = calculator.compute(&["pln", "Usd", "gbp"]).await.unwrap();
        let directions: Vec<(&str, &str)> = pairs
            .iter()
            .map(|p| (p.from.code(), p.to.code()))
            .collect();

        assert_eq!(
            directions,
            vec![
                ("PLN", "USD"),
                ("PLN", "GBP"),
                ("USD", "PLN"),
                ("USD", "GBP"),
                ("GBP", "PLN"),
                ("GBP", "USD"),
            ]
        );
    }

    #[tokio::test]
    async fn test_compute_duplicate_after_normalization() {
        let (calculator, _) = fresh_calculator(&SYNTHETIC);

        let result = calculator.compute(&["USD", "EUR", "usd"]).await;
        assert!(matches!(result, Err(FxError::DuplicateCurrency)));
    }

    #[tokio::test]
    async fn test_compute_insufficient_currencies() {
        let (calculator, _) = fresh_calculator(&SYNTHETIC);

        assert!(matches!(
            calculator.compute(&["USD"]).await,
            Err(FxError::InsufficientCurrencies)
        ));
        assert!(matches!(
            calculator.compute::<&str>(&[]).await,
            Err(FxError::InsufficientCurrencies)
        ));
    }

    #[tokio::test]
    async fn test_compute_unknown_currency() {
        let (calculator, _) = fresh_calculator(&SYNTHETIC);

        let result = calculator.compute(&["USD", "JPY"]).await;
        match assert_err!(result) {
            FxError::UnknownCurrency { code } => assert_eq!(code.code(), "JPY"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_compute_is_idempotent() {
        let (calculator, source) = fresh_calculator(&SYNTHETIC);

        let first = assert_ok!(calculator.compute(&["USD", "EUR", "PLN", "GBP"]).await);
        let second = assert_ok!(calculator.compute(&["USD", "EUR", "PLN", "GBP"]).await);

        assert_eq!(first, second);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_store_refreshes_once_before_validating() {
        // JPY only exists in the refreshed table.
        let source = Arc::new(MockRateSource::new([("USD", 1.0), ("JPY", 150.0)]));
        let calculator = calculator_with(&SYNTHETIC, source.clone(), 2);

        let pairs = calculator.compute(&["USD", "JPY"]).await.unwrap();
        assert_eq!(pairs, vec![pair("USD", "JPY", 150.0), pair("JPY", "USD", 0.01)]);
        assert_eq!(source.calls(), 1);

        calculator.compute(&["USD", "JPY"]).await.unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_fails_call_and_keeps_stale_table() {
        let source = Arc::new(MockRateSource::new([("USD", 1.0)]));
        source.fail_with(FetchError::Status(500));
        let calculator = calculator_with(&SYNTHETIC, source.clone(), 2);

        let result = calculator.compute(&["USD", "EUR"]).await;
        assert!(matches!(result, Err(FxError::Fetch(FetchError::Status(500)))));
        assert_eq!(source.calls(), 1);
        assert_eq!(calculator.store().rate_of(&Currency::eur()), Some(0.8));

        // Next call tries again and succeeds once upstream recovers.
        source.set_rates(SYNTHETIC);
        let pairs = calculator.compute(&["USD", "EUR"]).await.unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_input_errors_do_not_trigger_refresh() {
        let source = Arc::new(MockRateSource::new(SYNTHETIC));
        let calculator = calculator_with(&SYNTHETIC, source.clone(), 2);

        assert!(calculator.compute(&["USD", "USD"]).await.is_err());
        assert!(calculator.compute(&["USD"]).await.is_err());
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn test_custom_rounding() {
        let codes = [Currency::pln(), Currency::gbp()];
        let pairs = pairwise(&codes, &[3.5, 0.75], RoundingPolicy::new(4));

        assert_eq!(pairs[0].rate, 0.2143);
        assert_eq!(pairs[1].rate, 4.6667);
    }

    proptest! {
        #[test]
        fn pairwise_yields_every_ordered_pair(
            rates in proptest::collection::vec(0.001f64..10_000.0, 2..8)
        ) {
            let codes: Vec<Currency> = (0..rates.len())
                .map(|i| Currency::new(format!("C{i:02}")))
                .collect();
            let pairs = pairwise(&codes, &rates, RoundingPolicy::CROSS_RATE);
            let n = codes.len();

            prop_assert_eq!(pairs.len(), n * (n - 1));
            prop_assert!(pairs.iter().all(|p| p.from != p.to));

            let distinct: HashSet<(&Currency, &Currency)> =
                pairs.iter().map(|p| (&p.from, &p.to)).collect();
            prop_assert_eq!(distinct.len(), pairs.len());
        }

        #[test]
        fn unrounded_cross_rates_are_reciprocal(a in 0.1f64..100.0, b in 0.1f64..100.0) {
            let codes = [Currency::new("AAA"), Currency::new("BBB")];
            let pairs = pairwise(&codes, &[a, b], RoundingPolicy::new(15));

            prop_assert!((pairs[0].rate * pairs[1].rate - 1.0).abs() < 1e-9);
        }
    }
}
