//! knm FX Engine
//!
//! Caches a base-currency rate table fetched from an upstream feed and derives
//! pairwise cross-rates from it.
//!
//! # Features
//!
//! - Immutable rate snapshots swapped atomically on refresh
//! - Staleness-triggered refresh with concurrent refreshes collapsed into one
//! - Pairwise cross-rates for any set of requested currencies
//! - Static crypto token conversion table
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use knm_fx::{CrossRateCalculator, OxrClient, OxrConfig, RateStore, RateStoreConfig};
//!
//! let source = Arc::new(OxrClient::new(OxrConfig::new("my-app-id"))?);
//! let store = Arc::new(RateStore::connect(source, RateStoreConfig::default()).await?);
//! let calculator = CrossRateCalculator::new(store);
//!
//! let pairs = calculator.compute(&["usd", "eur", "pln"]).await?;
//! assert_eq!(pairs.len(), 6);
//! ```

pub mod cache;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod oxr;
pub mod provider;

pub use cache::{RateSnapshot, RateStore, RateStoreConfig};
pub use conversion::{CryptoConverter, TokenQuote};
pub use engine::CrossRateCalculator;
pub use error::{FetchError, FxError, FxResult};
pub use oxr::{OxrClient, OxrConfig};
pub use provider::{LatestRates, RateSource};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateSource;
