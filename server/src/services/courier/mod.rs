// server/src/services/courier/mod.rs

//! Courier providers. Reads (quotes, tracking) fall back to a canned,
//! `simulated` response when the provider has no API key, its circuit is open,
//! or the call fails. Shipment booking only simulates without an API key: a
//! configured provider is called once and its failure is returned.

pub mod courier_guy;
pub mod fastway;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use reqwest::Client;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::health_cache::HealthCache;
use super::retry::{retry_async_if, RetryPolicy};
use crate::models::{CourierKind, ProviderHealth, Quote, QuoteRequest, Shipment, ShipmentRequest, TrackingInfo};

pub use courier_guy::CourierGuyClient;
pub use fastway::FastwayClient;

#[derive(Debug, Error)]
pub enum CourierError {
  #[error("{0} is not configured")]
  NotConfigured(CourierKind),

  #[error("HTTP request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("Failed to parse courier response: {0}")]
  Parse(String),

  #[error("Courier API error (status {status}): {message}")]
  Api { status: u16, message: String },

  #[error("Unknown courier provider: {0}")]
  UnknownProvider(String),

  #[error("{0} is temporarily unavailable")]
  Unavailable(CourierKind),
}

impl CourierError {
  pub fn is_transient(&self) -> bool {
    match self {
      CourierError::Request(_) => true,
      CourierError::Api { status, .. } => *status >= 500 || *status == 429,
      _ => false,
    }
  }
}

#[async_trait]
pub trait CourierProvider: Send + Sync {
  fn kind(&self) -> CourierKind;

  fn is_configured(&self) -> bool;

  async fn quote(&self, request: &QuoteRequest) -> Result<Quote, CourierError>;

  async fn create_shipment(&self, request: &ShipmentRequest) -> Result<Shipment, CourierError>;

  async fn track(&self, tracking_number: &str) -> Result<TrackingInfo, CourierError>;

  async fn health_check(&self) -> ProviderHealth;
}

/// HTTP plumbing shared by the provider clients.
pub(crate) struct CourierHttp {
  pub kind: CourierKind,
  pub client: Client,
  pub api_key: Option<String>,
  pub base_url: String,
  pub health: Arc<HealthCache>,
  pub retry: RetryPolicy,
}

impl CourierHttp {
  pub fn new(
    kind: CourierKind,
    api_key: Option<String>,
    base_url: String,
    health: Arc<HealthCache>,
  ) -> Result<Self, CourierError> {
    let client = Client::builder().timeout(Duration::from_secs(20)).build()?;
    Ok(Self {
      kind,
      client,
      api_key,
      base_url: base_url.trim_end_matches('/').to_string(),
      health,
      retry: RetryPolicy::exponential(2, Duration::from_millis(300), Duration::from_secs(2)),
    })
  }

  pub fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  pub fn key(&self) -> Result<&str, CourierError> {
    self.api_key.as_deref().ok_or(CourierError::NotConfigured(self.kind))
  }

  /// Sends `request` and decodes a JSON body, mapping non-2xx answers to `Api`.
  pub async fn send_json<T: serde::de::DeserializeOwned>(
    &self,
    request: reqwest::RequestBuilder,
  ) -> Result<T, CourierError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
      let message = response.text().await.unwrap_or_default();
      return Err(CourierError::Api {
        status: status.as_u16(),
        message,
      });
    }
    response.json().await.map_err(|e| CourierError::Parse(e.to_string()))
  }

  /// Runs `call` with retries unless the provider is unconfigured or its
  /// circuit is open; any failure yields `fallback()`.
  pub async fn call_or_fallback<T, F, Fut>(&self, operation: &str, call: F, fallback: impl FnOnce() -> T) -> T
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CourierError>>,
  {
    let service = self.kind.as_str();
    if self.api_key.is_none() {
      debug!(provider = service, operation, "No API key; using fallback response.");
      return fallback();
    }
    if self.health.is_open(service) {
      warn!(provider = service, operation, "Circuit open; using fallback response.");
      return fallback();
    }
    match retry_async_if(&self.retry, operation, CourierError::is_transient, call).await {
      Ok(value) => {
        self.health.record_success(service);
        value
      }
      Err(e) => {
        self.health.record_failure(service);
        warn!(provider = service, operation, error = %e, "Courier call failed; using fallback response.");
        fallback()
      }
    }
  }

  /// Single attempt for calls that must not be repeated, such as booking a
  /// shipment. Only an unconfigured provider gets `fallback()`.
  pub async fn call_once<T, Fut>(&self, operation: &str, call: Fut, fallback: impl FnOnce() -> T) -> Result<T, CourierError>
  where
    Fut: Future<Output = Result<T, CourierError>>,
  {
    let service = self.kind.as_str();
    if self.api_key.is_none() {
      debug!(provider = service, operation, "No API key; using fallback response.");
      return Ok(fallback());
    }
    if self.health.is_open(service) {
      warn!(provider = service, operation, "Circuit open; refusing call.");
      return Err(CourierError::Unavailable(self.kind));
    }
    match call.await {
      Ok(value) => {
        self.health.record_success(service);
        Ok(value)
      }
      Err(e) => {
        self.health.record_failure(service);
        warn!(provider = service, operation, error = %e, "Courier call failed.");
        Err(e)
      }
    }
  }

  pub async fn check_health<Fut>(&self, ping: Fut) -> ProviderHealth
  where
    Fut: Future<Output = Result<(), CourierError>>,
  {
    let service = self.kind.as_str();
    let configured = self.api_key.is_some();
    let healthy = if !configured {
      false
    } else if let Some(cached) = self.health.cached(service) {
      cached
    } else {
      match ping.await {
        Ok(()) => {
          self.health.record_success(service);
          true
        }
        Err(e) => {
          debug!(provider = service, error = %e, "Health check failed.");
          self.health.record_failure(service);
          false
        }
      }
    };
    ProviderHealth {
      provider: self.kind,
      healthy,
      configured,
      circuit_open: self.health.is_open(service),
      checked_at: Utc::now(),
    }
  }
}

/// Short random suffix for simulated tracking numbers.
pub(crate) fn simulated_suffix() -> String {
  uuid::Uuid::new_v4().simple().to_string()[..10].to_uppercase()
}

/// The configured providers, looked up by kind.
#[derive(Clone, Default)]
pub struct CourierDirectory {
  providers: BTreeMap<CourierKind, Arc<dyn CourierProvider>>,
}

impl CourierDirectory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_provider(mut self, provider: Arc<dyn CourierProvider>) -> Self {
    self.providers.insert(provider.kind(), provider);
    self
  }

  pub fn get(&self, kind: CourierKind) -> Result<Arc<dyn CourierProvider>, CourierError> {
    self
      .providers
      .get(&kind)
      .cloned()
      .ok_or_else(|| CourierError::UnknownProvider(kind.to_string()))
  }

  pub fn resolve(&self, name: &str) -> Result<Arc<dyn CourierProvider>, CourierError> {
    let kind: CourierKind = name.parse().map_err(CourierError::UnknownProvider)?;
    self.get(kind)
  }

  /// Quotes from every provider; a provider that errors is left out.
  pub async fn quotes(&self, request: &QuoteRequest) -> Vec<Quote> {
    let calls = self.providers.values().map(|p| p.quote(request));
    join_all(calls)
      .await
      .into_iter()
      .filter_map(|result| match result {
        Ok(quote) => Some(quote),
        Err(e) => {
          warn!(error = %e, "Provider quote failed.");
          None
        }
      })
      .collect()
  }

  pub async fn health(&self) -> Vec<ProviderHealth> {
    join_all(self.providers.values().map(|p| p.health_check())).await
  }
}
