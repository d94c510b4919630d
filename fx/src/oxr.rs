//! Open Exchange Rates client.
//!
//! Fetches `{base_url}/latest.json?app_id={app_id}` and decodes the
//! `{timestamp, base, rates}` document.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use tracing::{debug, instrument, warn};

use crate::error::FetchError;
use crate::provider::{LatestRates, RateSource};

/// Default upstream endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openexchangerates.org/api";

/// Default timeout for one upstream request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the upstream client.
#[derive(Debug, Clone)]
pub struct OxrConfig {
    /// API root, without the `latest.json` segment.
    pub base_url: String,
    /// Application id sent as the `app_id` query parameter.
    pub app_id: String,
    /// Deadline for a whole request, connect to body.
    pub timeout: Duration,
}

impl OxrConfig {
    /// Create a config for the public endpoint with the given app id.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_id: app_id.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// HTTP rate source backed by the Open Exchange Rates API.
pub struct OxrClient {
    http: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl OxrClient {
    /// Create a client with its own connection pool.
    pub fn new(config: OxrConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Self::with_http_client(config, http)
    }

    /// Create a client on top of an existing `reqwest::Client`.
    ///
    /// The given client's own timeout settings apply; `config.timeout` is
    /// still enforced per request.
    pub fn with_http_client(config: OxrConfig, http: reqwest::Client) -> Result<Self, FetchError> {
        Ok(Self {
            endpoint: latest_url(&config.base_url, &config.app_id)?,
            http,
            timeout: config.timeout,
        })
    }

    /// Host the client talks to, for logging without leaking the app id.
    pub fn host(&self) -> &str {
        self.endpoint.host_str().unwrap_or_default()
    }
}

#[async_trait]
impl RateSource for OxrClient {
    fn name(&self) -> &str {
        "openexchangerates"
    }

    #[instrument(skip(self), fields(host = %self.host()))]
    async fn fetch_latest(&self) -> Result<LatestRates, FetchError> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "Upstream rejected rate request");
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let latest: LatestRates =
            serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        debug!(
            base = %latest.base,
            currencies = latest.rates.len(),
            timestamp = latest.timestamp,
            "Fetched latest rates"
        );

        Ok(latest)
    }
}

/// Build `{base_url}/latest.json?app_id={app_id}`.
fn latest_url(base_url: &str, app_id: &str) -> Result<Url, FetchError> {
    let mut url =
        Url::parse(base_url).map_err(|e| FetchError::InvalidUrl(format!("{base_url}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(format!(
            "{base_url}: unsupported scheme {}",
            url.scheme()
        )));
    }

    url.path_segments_mut()
        .map_err(|_| FetchError::InvalidUrl(base_url.to_string()))?
        .pop_if_empty()
        .push("latest.json");
    url.query_pairs_mut().append_pair("app_id", app_id);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one canned HTTP response on a local port and hand back the raw
    /// request that was received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/api", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_head(&mut socket).await;

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });

        (base_url, handle)
    }

    async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn client_for(base_url: String, timeout: Duration) -> OxrClient {
        let config = OxrConfig {
            base_url,
            app_id: "test_app_id".to_string(),
            timeout,
        };
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        OxrClient::with_http_client(config, http).unwrap()
    }

    #[test]
    fn test_latest_url() {
        let url = latest_url("https://openexchangerates.org/api", "abc").unwrap();
        assert_eq!(
            url.as_str(),
            "https://openexchangerates.org/api/latest.json?app_id=abc"
        );

        let url = latest_url("https://openexchangerates.org/api/", "abc").unwrap();
        assert_eq!(
            url.as_str(),
            "https://openexchangerates.org/api/latest.json?app_id=abc"
        );
    }

    #[test]
    fn test_latest_url_invalid() {
        assert!(matches!(
            latest_url("not a url", "abc"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            latest_url("ftp://example.com/api", "abc"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_latest() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"timestamp":1700000000,"base":"USD","rates":{"EUR":0.858611,"USD":1.00}}"#,
        )
        .await;
        let client = client_for(base_url, Duration::from_secs(5));

        let latest = client.fetch_latest().await.unwrap();
        assert_eq!(latest.base, "USD");
        assert_eq!(latest.rates.get("EUR"), Some(&0.858611));

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /api/latest.json?app_id=test_app_id http/1.1"));
        assert!(request.contains("accept: application/json"));
    }

    #[tokio::test]
    async fn test_fetch_latest_non_200() {
        let (base_url, server) = serve_once("401 Unauthorized", r#"{"error":true}"#).await;
        let client = client_for(base_url, Duration::from_secs(5));

        let result = client.fetch_latest().await;
        assert!(matches!(result, Err(FetchError::Status(401))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_latest_malformed_body() {
        let (base_url, server) = serve_once("200 OK", r#"{"base":"USD","rates":"#).await;
        let client = client_for(base_url, Duration::from_secs(5));

        let result = client.fetch_latest().await;
        assert!(matches!(result, Err(FetchError::Decode(_))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_latest_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/api", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_head(&mut socket).await;
            // Hold the connection open without answering.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = client_for(base_url, Duration::from_millis(100));
        let result = client.fetch_latest().await;

        assert!(matches!(result, Err(FetchError::Timeout)));
        server.abort();
    }

    #[tokio::test]
    async fn test_fetch_latest_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/api", listener.local_addr().unwrap());
        drop(listener);

        let client = client_for(base_url, Duration::from_secs(5));
        let result = client.fetch_latest().await;

        assert!(matches!(result, Err(FetchError::Transport(_))));
    }
}
