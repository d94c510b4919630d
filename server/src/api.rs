//! HTTP routes.
//!
//! - `GET /rates?currencies=USD,EUR,...` returns every ordered cross-rate.
//! - `GET /exchange?from=WBTC&to=USDT&amount=1.5` converts a crypto amount.
//!
//! Every rejected request gets `400` with the JSON body `""`.

use std::collections::HashMap;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode, Uri};
use knm_fx::{CrossRateCalculator, CryptoConverter, FxError};
use serde::Serialize;
use tracing::{debug, warn};

/// Response body type used by every route.
pub type Body = Full<Bytes>;

/// Routes requests to the rate calculator and the crypto converter.
pub struct ApiServer {
    calculator: Arc<CrossRateCalculator>,
    converter: Arc<CryptoConverter>,
}

impl ApiServer {
    pub fn new(calculator: Arc<CrossRateCalculator>, converter: Arc<CryptoConverter>) -> Self {
        Self {
            calculator,
            converter,
        }
    }

    /// Produce the response for one request.
    pub async fn handle(&self, method: &Method, uri: &Uri) -> Response<Body> {
        let route = match uri.path() {
            "/rates" => Route::Rates,
            "/exchange" => Route::Exchange,
            _ => return empty(StatusCode::NOT_FOUND),
        };

        if *method != Method::GET {
            let mut response = empty(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET"));
            return response;
        }

        let query = parse_query(uri);
        match route {
            Route::Rates => self.get_rates(&query).await,
            Route::Exchange => self.get_exchange(&query),
        }
    }

    async fn get_rates(&self, query: &HashMap<String, String>) -> Response<Body> {
        let currencies: Vec<&str> = query
            .get("currencies")
            .map(|raw| raw.split(',').collect())
            .unwrap_or_default();

        if currencies.len() < 2 || currencies.iter().any(|c| c.is_empty()) {
            debug!(currencies = ?currencies, "Rejected rates query");
            return bad_request();
        }

        match self.calculator.compute(currencies.as_slice()).await {
            Ok(pairs) => json(StatusCode::OK, &pairs),
            Err(e) => reject(e),
        }
    }

    fn get_exchange(&self, query: &HashMap<String, String>) -> Response<Body> {
        let param = |name: &str| query.get(name).map(String::as_str).filter(|v| !v.is_empty());

        let (Some(from), Some(to), Some(amount)) = (param("from"), param("to"), param("amount"))
        else {
            return bad_request();
        };

        let amount = match amount.parse::<f64>() {
            Ok(amount) if amount > 0.0 => amount,
            _ => {
                debug!(amount, "Rejected exchange amount");
                return bad_request();
            }
        };

        match self.converter.convert(from, to, amount) {
            Ok(pair) => json(StatusCode::OK, &pair),
            Err(e) => reject(e),
        }
    }
}

enum Route {
    Rates,
    Exchange,
}

/// First value of each query parameter, percent-decoded.
fn parse_query(uri: &Uri) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query) = uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
    }
    params
}

fn reject(err: FxError) -> Response<Body> {
    if err.is_client_error() {
        debug!(code = err.error_code(), error = %err, "Request rejected");
    } else {
        warn!(code = err.error_code(), error = %err, "Request failed upstream");
    }
    bad_request()
}

fn bad_request() -> Response<Body> {
    json(StatusCode::BAD_REQUEST, &"")
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            warn!(error = %e, "Failed to encode response");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn empty(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
