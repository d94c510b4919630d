//! knm Server Binary
//!
//! Serves currency cross-rates and crypto conversions over HTTP.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use knm_fx::{CrossRateCalculator, CryptoConverter, OxrClient, RateStore};
use knm_server::{serve, ApiServer, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting knm server");

    let config = ServerConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }
    let addr = config.socket_addr().map_err(anyhow::Error::msg)?;

    let source = Arc::new(OxrClient::new(config.oxr_config())?);
    info!(host = source.host(), "Fetching initial rates");

    // The first fetch is a hard dependency: without a table there is nothing to serve.
    let store = RateStore::connect(source, config.store_config())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get latest rates: {}", e))?;

    let api = Arc::new(ApiServer::new(
        Arc::new(CrossRateCalculator::new(Arc::new(store))),
        Arc::new(CryptoConverter::new()),
    ));

    let listener = TcpListener::bind(addr).await?;
    serve(listener, api, shutdown_signal(), config.shutdown_timeout).await?;

    info!("knm server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
