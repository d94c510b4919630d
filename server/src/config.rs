//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use knm_common::DEFAULT_REFRESH_INTERVAL;
use knm_fx::oxr::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use knm_fx::{OxrConfig, RateStoreConfig};
use tracing::warn;

/// Upstream rate feed configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// API root of the rate feed.
    pub base_url: String,
    /// Application id for the rate feed.
    pub app_id: String,
    /// Timeout for one upstream request.
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_id: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Main server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address, `host:port` or `:port`.
    pub listen_addr: String,
    /// Upstream rate feed.
    pub upstream: UpstreamConfig,
    /// Maximum age of the cached rate table.
    pub refresh_interval: Duration,
    /// How long in-flight requests get to finish on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            upstream: UpstreamConfig::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, after reading `.env`
    /// if one is present.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(url) = lookup("OPENEXCHANGERATES_BASE_URL") {
            config.upstream.base_url = url;
        }

        if let Some(app_id) = lookup("OPENEXCHANGERATES_APP_ID") {
            config.upstream.app_id = app_id;
        }

        if let Some(timeout) = secs_var(&lookup, "OPENEXCHANGERATES_TIMEOUT_SECS") {
            config.upstream.timeout = timeout;
        }

        if let Some(interval) = secs_var(&lookup, "RATES_REFRESH_INTERVAL_SECS") {
            config.refresh_interval = interval;
        }

        if let Some(timeout) = secs_var(&lookup, "SHUTDOWN_TIMEOUT_SECS") {
            config.shutdown_timeout = timeout;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.upstream.app_id.trim().is_empty() {
            return Err("OPENEXCHANGERATES_APP_ID must be set".to_string());
        }

        if self.upstream.base_url.is_empty() {
            return Err("Upstream base URL cannot be empty".to_string());
        }

        if self.upstream.timeout.is_zero() {
            return Err("Upstream timeout cannot be 0".to_string());
        }

        if self.refresh_interval.is_zero() {
            return Err("Refresh interval cannot be 0".to_string());
        }

        self.socket_addr()?;

        Ok(())
    }

    /// Parse the listen address. `:8080` binds all interfaces.
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        let addr = if self.listen_addr.starts_with(':') {
            format!("0.0.0.0{}", self.listen_addr)
        } else {
            self.listen_addr.clone()
        };
        addr.parse()
            .map_err(|e| format!("Invalid listen address {}: {}", self.listen_addr, e))
    }

    /// Upstream client configuration.
    pub fn oxr_config(&self) -> OxrConfig {
        OxrConfig {
            base_url: self.upstream.base_url.clone(),
            app_id: self.upstream.app_id.clone(),
            timeout: self.upstream.timeout,
        }
    }

    /// Rate store configuration.
    pub fn store_config(&self) -> RateStoreConfig {
        RateStoreConfig {
            refresh_interval: self.refresh_interval,
        }
    }
}

fn secs_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Duration> {
    let raw = lookup(name)?;
    match raw.parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(e) => {
            warn!(variable = name, value = %raw, error = %e, "Ignoring unparsable duration");
            None
        }
    }
}
