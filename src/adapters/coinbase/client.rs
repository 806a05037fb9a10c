//! Coinbase HTTP Client - Rate-limited Brokerage REST Client
//!
//! Wraps reqwest with request signing, a concurrency cap, a client-side
//! rate limiter, and retries for reads. POSTs are sent exactly once:
//! an ambiguous answer surfaces as `TransportFailure` instead of a
//! second, possibly duplicate, state change.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Proxy, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::auth::CoinbaseAuth;
use crate::config::{ApiConfig, ProxyConfig};
use crate::error::{EngineError, Result};

/// Configuration for the brokerage HTTP client.
#[derive(Debug, Clone)]
pub struct CoinbaseClientConfig {
  /// Base URL, without the `/api/v3/brokerage` prefix.
  pub base_url: String,
  /// Per-request timeout.
  pub timeout: Duration,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Maximum retries for reads.
  pub max_retries: u32,
  /// Base delay between read retries (exponential backoff).
  pub retry_base_delay: Duration,
  /// Client-side request rate cap.
  pub requests_per_second: u32,
  /// Route everything through this proxy (http, https, socks5h).
  pub proxy_url: Option<String>,
}

impl Default for CoinbaseClientConfig {
  fn default() -> Self {
    Self::from_sections(&ApiConfig::default(), &ProxyConfig::default())
  }
}

impl CoinbaseClientConfig {
  pub fn from_sections(api: &ApiConfig, proxy: &ProxyConfig) -> Self {
    Self {
      base_url: api.base_url.trim_end_matches('/').to_string(),
      timeout: Duration::from_millis(api.timeout_ms),
      max_concurrent: api.max_concurrent,
      max_retries: api.max_retries,
      retry_base_delay: Duration::from_millis(api.retry_base_delay_ms),
      requests_per_second: api.requests_per_second,
      proxy_url: if proxy.enabled { proxy.url.clone() } else { None },
    }
  }
}

/// Signed, rate-limited HTTP client for the brokerage API.
pub struct CoinbaseClient {
  http: Client,
  auth: Arc<CoinbaseAuth>,
  config: CoinbaseClientConfig,
  /// `host[:port]` of `base_url`, bound into CDP tokens.
  host: String,
  semaphore: Semaphore,
  limiter: DefaultDirectRateLimiter,
}

impl CoinbaseClient {
  /// Create a new client.
  pub fn new(auth: Arc<CoinbaseAuth>, config: CoinbaseClientConfig) -> anyhow::Result<Self> {
    let mut builder = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(config.max_concurrent);

    if let Some(url) = &config.proxy_url {
      builder = builder.proxy(Proxy::all(url).context("Invalid proxy URL")?);
      debug!("Proxy enabled for brokerage traffic");
    }

    let http = builder.build().context("Failed to build HTTP client")?;

    let base = Url::parse(&config.base_url).context("Invalid API base URL")?;
    let host = match (base.host_str(), base.port()) {
      (Some(host), Some(port)) => format!("{host}:{port}"),
      (Some(host), None) => host.to_string(),
      (None, _) => anyhow::bail!("API base URL has no host: {}", config.base_url),
    };
    debug!(host = %host, scheme = auth.scheme(), "Brokerage client configured");

    let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
    let limiter = RateLimiter::direct(Quota::per_second(rps));

    Ok(Self {
      http,
      auth,
      host,
      semaphore: Semaphore::new(config.max_concurrent.max(1)),
      limiter,
      config,
    })
  }

  /// Signed GET, retried on 429, 5xx, and transport errors.
  ///
  /// `query` pairs are URL-encoded by reqwest and never signed.
  pub async fn get<T: DeserializeOwned>(
    &self,
    operation: &'static str,
    path: &str,
    query: &[(&str, String)],
  ) -> Result<T> {
    let _permit = self.permit(operation).await?;
    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = self
          .config
          .retry_base_delay
          .saturating_mul(2u32.saturating_pow(attempt - 1));
        debug!(operation, attempt, delay_ms = delay.as_millis(), "Retrying read");
        sleep(delay).await;
      }

      match self.send(operation, Method::GET, path, query, String::new()).await {
        Ok((status, body)) if status.is_success() => return decode(operation, &body),
        Ok((status, _)) if is_transient(status) => {
          warn!(operation, status = %status, attempt, "Transient HTTP status");
          last_error = Some(EngineError::transport(operation, format!("HTTP {status}")));
        }
        Ok((status, body)) => return Err(classify(operation, path, status, &body)),
        Err(e) => {
          warn!(operation, error = %e, attempt, "Read failed");
          last_error = Some(e);
        }
      }
    }

    Err(last_error.unwrap_or_else(|| EngineError::transport(operation, "max retries exceeded")))
  }

  /// Signed POST, sent once.
  ///
  /// 5xx and undecodable 2xx bodies are unknown outcomes.
  pub async fn post<B, T>(&self, operation: &'static str, path: &str, payload: &B) -> Result<T>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let body = serde_json::to_string(payload)
      .map_err(|e| EngineError::InvalidInput(format!("{operation}: unserializable payload: {e}")))?;

    let _permit = self.permit(operation).await?;
    let (status, text) = self.send(operation, Method::POST, path, &[], body).await?;

    if status.is_success() {
      decode(operation, &text)
    } else if status.is_server_error() {
      Err(EngineError::transport(operation, format!("HTTP {status}: {text}")))
    } else {
      Err(classify(operation, path, status, &text))
    }
  }

  async fn permit(&self, operation: &'static str) -> Result<SemaphorePermit<'_>> {
    self
      .semaphore
      .acquire()
      .await
      .map_err(|e| EngineError::transport(operation, e))
  }

  /// One signed round trip. Returns status and raw body.
  async fn send(
    &self,
    operation: &'static str,
    method: Method,
    path: &str,
    query: &[(&str, String)],
    body: String,
  ) -> Result<(StatusCode, String)> {
    self.limiter.until_ready().await;

    let url = format!("{}{}", self.config.base_url, path);
    let mut request = self.http.request(method.clone(), url);
    if !query.is_empty() {
      request = request.query(query);
    }
    for (name, value) in self.auth.auth_headers(method.as_str(), &self.host, path, &body) {
      request = request.header(name, value);
    }
    if !body.is_empty() {
      request = request.header(CONTENT_TYPE, "application/json").body(body);
    }

    let response = request
      .send()
      .await
      .map_err(|e| EngineError::transport(operation, e))?;
    let status = response.status();
    let text = response
      .text()
      .await
      .map_err(|e| EngineError::transport(operation, e))?;

    debug!(operation, method = %method, path, status = %status, "Brokerage response");
    Ok((status, text))
  }
}

fn is_transient(status: StatusCode) -> bool {
  status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn decode<T: DeserializeOwned>(operation: &'static str, body: &str) -> Result<T> {
  serde_json::from_str(body)
    .map_err(|e| EngineError::transport(operation, format!("malformed response: {e}")))
}

/// Map a definitive non-success status.
fn classify(operation: &'static str, path: &str, status: StatusCode, body: &str) -> EngineError {
  if status == StatusCode::NOT_FOUND {
    EngineError::NotFound {
      what: operation,
      name: path.to_string(),
    }
  } else {
    EngineError::Rejected {
      operation,
      reason: format!("HTTP {status}: {body}"),
    }
  }
}
