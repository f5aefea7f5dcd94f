use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::errors::{redact_query, CoreError};
use crate::models::settings::{RetryPolicy, Settings};

/// Header names the API key is sent under (pro and demo plans).
pub const API_KEY_HEADERS: &[&str] = &["x-cg-pro-api-key", "x-cg-demo-api-key"];

const CLIENT_USER_AGENT: &str = concat!("crypto-history/", env!("CARGO_PKG_VERSION"));

/// Non-success status that some upstreams use as a rate-limit signal.
const IM_A_TEAPOT: u16 = 418;

/// Single retrying GET returning parsed JSON.
///
/// This is the only place the engine performs outbound network I/O.
/// - 429/418: exponential backoff with jitter, then retry.
/// - 5xx or an unparseable body: short linear backoff, then retry.
/// - Transport failure or timeout: linear backoff with jitter, then retry.
/// - Any other non-success status: returned immediately.
///
/// At most `max_concurrent_requests` requests are in flight per fetcher,
/// and request starts are spaced at least `min_request_spacing` apart.
/// Backoff sleeps happen outside the gate.
pub struct HttpFetcher {
    client: Client,
    headers: HeaderMap,
    retry: RetryPolicy,
    in_flight: Semaphore,
    min_spacing: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self, CoreError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| CoreError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            headers: default_headers(settings.api_key.as_deref())?,
            retry: settings.retry.clone(),
            in_flight: Semaphore::new(settings.max_concurrent_requests.max(1)),
            min_spacing: settings.min_request_spacing,
            last_request: Mutex::new(None),
        })
    }

    /// GET `url` with `params` as the query string.
    ///
    /// Returns the last encountered error once `max_attempts` are used up.
    pub async fn request(&self, url: &str, params: &[(&str, String)]) -> Result<Value, CoreError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            let err = match self.attempt(url, params, attempt).await {
                Ok(json) => return Ok(json),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt + 1 < attempts {
                let delay = self.backoff(&err, attempt);
                warn!(url, attempt, error = %err, ?delay, "request failed, retrying");
                sleep(delay).await;
            } else {
                warn!(url, attempt, error = %err, "request failed, giving up");
            }
            last_error = Some(err);
        }

        Err(last_error.unwrap_or_else(|| CoreError::Network("no attempt was made".into())))
    }

    /// One GET under the concurrency gate, classified into a `CoreError`.
    async fn attempt(
        &self,
        url: &str,
        params: &[(&str, String)],
        attempt: u32,
    ) -> Result<Value, CoreError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| CoreError::Network("request gate closed".into()))?;
        self.wait_turn().await;
        debug!(url, "GET");

        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == IM_A_TEAPOT {
            return Err(CoreError::RateLimited {
                status: status.as_u16(),
                attempts: attempt + 1,
            });
        }
        if status.is_server_error() {
            return Err(CoreError::Upstream {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("server error").to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Http {
                status: status.as_u16(),
                message: summarize_body(&body),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice::<Value>(&body)?)
    }

    /// Delay before the next attempt, chosen by failure kind.
    fn backoff(&self, err: &CoreError, attempt: u32) -> Duration {
        if err.is_rate_limit() {
            self.retry.rate_limit_delay(attempt)
        } else if matches!(err, CoreError::Network(_)) {
            self.retry.transport_delay(attempt)
        } else {
            self.retry.server_error_delay(attempt)
        }
    }

    /// Block until `min_spacing` has passed since the previous request.
    async fn wait_turn(&self) {
        if self.min_spacing.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_spacing {
                sleep(self.min_spacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn default_headers(api_key: Option<&str>) -> Result<HeaderMap, CoreError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
        let mut value = HeaderValue::from_str(key)
            .map_err(|_| CoreError::Config("API key contains invalid header characters".into()))?;
        value.set_sensitive(true);
        for name in API_KEY_HEADERS {
            headers.insert(HeaderName::from_static(name), value.clone());
        }
    }

    Ok(headers)
}

/// First line of an error body, truncated, with any URL query removed.
fn summarize_body(body: &str) -> String {
    let line = body.lines().next().unwrap_or("").trim();
    let short: String = line.chars().take(200).collect();
    if short.is_empty() {
        "request rejected".to_string()
    } else {
        redact_query(&short)
    }
}
