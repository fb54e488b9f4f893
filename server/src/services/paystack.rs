// server/src/services/paystack.rs

//! Paystack REST client: transactions, split subaccounts and refunds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::retry::{retry_async_if, RetryPolicy};

pub const CURRENCY: &str = "ZAR";

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("Payment gateway is not configured")]
  NotConfigured,

  #[error("HTTP request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("Failed to parse gateway response: {0}")]
  Parse(String),

  #[error("Gateway API error (status {status}): {message}")]
  Api { status: u16, message: String },

  /// The gateway answered but refused the operation.
  #[error("Gateway rejected request: {0}")]
  Rejected(String),
}

impl GatewayError {
  /// Network failures and 5xx/429 answers may succeed on a later attempt.
  pub fn is_transient(&self) -> bool {
    match self {
      GatewayError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
      GatewayError::Api { status, .. } => *status >= 500 || *status == 429,
      _ => false,
    }
  }

  /// The gateway refused a refund because the transaction was already reversed.
  pub fn is_already_refunded(&self) -> bool {
    match self {
      GatewayError::Rejected(message) => {
        let message = message.to_ascii_lowercase();
        message.contains("fully reversed") || message.contains("already refunded")
      }
      _ => false,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitializeTransaction {
  pub email: String,
  pub amount_cents: i64,
  pub reference: String,
  pub callback_url: String,
  /// Seller subaccount that settles the remainder of the amount.
  pub subaccount: Option<String>,
  /// Flat amount kept by the main account when `subaccount` is set.
  pub transaction_charge_cents: Option<i64>,
  pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct InitializedTransaction {
  pub authorization_url: String,
  pub access_code: String,
  pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedTransaction {
  pub gateway_id: i64,
  pub reference: String,
  pub status: String,
  pub amount_cents: i64,
  pub currency: String,
  pub channel: Option<String>,
  pub paid_at: Option<DateTime<Utc>>,
  pub customer_email: Option<String>,
}

impl VerifiedTransaction {
  pub fn is_successful(&self) -> bool {
    self.status == "success"
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubaccountRequest {
  pub business_name: String,
  pub settlement_bank: String,
  pub account_number: String,
  pub percentage_charge: f64,
  pub primary_contact_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Subaccount {
  pub subaccount_code: String,
  pub business_name: String,
  #[serde(default)]
  pub settlement_bank: Option<String>,
  #[serde(default)]
  pub percentage_charge: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundReceipt {
  pub reference: String,
  pub status: String,
  pub amount_cents: Option<i64>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn initialize_transaction(&self, request: &InitializeTransaction)
    -> Result<InitializedTransaction, GatewayError>;

  async fn verify_transaction(&self, reference: &str) -> Result<VerifiedTransaction, GatewayError>;

  async fn create_subaccount(&self, request: &SubaccountRequest) -> Result<Subaccount, GatewayError>;

  async fn update_subaccount(&self, code: &str, request: &SubaccountRequest) -> Result<Subaccount, GatewayError>;

  /// Refunds `amount_cents` of the transaction, or all of it when `None`.
  async fn refund(&self, reference: &str, amount_cents: Option<i64>) -> Result<RefundReceipt, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
  status: bool,
  message: String,
  data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RawCustomer {
  email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
  id: i64,
  reference: String,
  status: String,
  amount: i64,
  currency: String,
  channel: Option<String>,
  paid_at: Option<DateTime<Utc>>,
  customer: Option<RawCustomer>,
}

impl From<RawTransaction> for VerifiedTransaction {
  fn from(raw: RawTransaction) -> Self {
    Self {
      gateway_id: raw.id,
      reference: raw.reference,
      status: raw.status,
      amount_cents: raw.amount,
      currency: raw.currency,
      channel: raw.channel,
      paid_at: raw.paid_at,
      customer_email: raw.customer.and_then(|c| c.email),
    }
  }
}

#[derive(Debug, Deserialize)]
struct RawRefund {
  status: String,
  amount: Option<i64>,
}

fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T, GatewayError> {
  let envelope: Envelope<T> = serde_json::from_str(body).map_err(|e| GatewayError::Parse(e.to_string()))?;
  if !envelope.status {
    return Err(GatewayError::Rejected(envelope.message));
  }
  envelope
    .data
    .ok_or_else(|| GatewayError::Parse(format!("response without data: {}", envelope.message)))
}

pub struct PaystackClient {
  client: Client,
  secret_key: Option<String>,
  base_url: String,
  read_retry: RetryPolicy,
}

impl PaystackClient {
  pub fn new(secret_key: Option<String>, base_url: impl Into<String>) -> Result<Self, GatewayError> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self {
      client,
      secret_key,
      base_url: base_url.into().trim_end_matches('/').to_string(),
      read_retry: RetryPolicy::default(),
    })
  }

  pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
    self.read_retry = policy;
    self
  }

  pub fn is_configured(&self) -> bool {
    self.secret_key.is_some()
  }

  fn key(&self) -> Result<&str, GatewayError> {
    self.secret_key.as_deref().ok_or(GatewayError::NotConfigured)
  }

  async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
    let response = request.bearer_auth(self.key()?).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if status.is_server_error() || status.as_u16() == 429 {
      return Err(GatewayError::Api {
        status: status.as_u16(),
        message: body,
      });
    }
    // 4xx bodies still carry the gateway's explanation in the envelope.
    parse_envelope(&body)
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
  #[instrument(name = "paystack::initialize", skip(self, request), fields(reference = %request.reference, amount = request.amount_cents))]
  async fn initialize_transaction(
    &self,
    request: &InitializeTransaction,
  ) -> Result<InitializedTransaction, GatewayError> {
    self.key()?;
    let mut body = json!({
      "email": request.email,
      "amount": request.amount_cents,
      "currency": CURRENCY,
      "reference": request.reference,
      "callback_url": request.callback_url,
      "metadata": request.metadata,
    });
    if let Some(subaccount) = &request.subaccount {
      body["subaccount"] = json!(subaccount);
      body["bearer"] = json!("account");
      if let Some(charge) = request.transaction_charge_cents {
        body["transaction_charge"] = json!(charge);
      }
    }
    let initialized: InitializedTransaction = self
      .execute(self.client.post(self.url("/transaction/initialize")).json(&body))
      .await?;
    info!("Transaction initialized.");
    Ok(initialized)
  }

  #[instrument(name = "paystack::verify", skip(self))]
  async fn verify_transaction(&self, reference: &str) -> Result<VerifiedTransaction, GatewayError> {
    self.key()?;
    let url = self.url(&format!("/transaction/verify/{}", reference));
    let raw: RawTransaction = retry_async_if(
      &self.read_retry,
      "paystack.verify",
      GatewayError::is_transient,
      || self.execute(self.client.get(&url)),
    )
    .await?;
    let verified = VerifiedTransaction::from(raw);
    info!(status = %verified.status, amount = verified.amount_cents, "Transaction verified.");
    Ok(verified)
  }

  #[instrument(name = "paystack::create_subaccount", skip(self, request), fields(business = %request.business_name))]
  async fn create_subaccount(&self, request: &SubaccountRequest) -> Result<Subaccount, GatewayError> {
    self.key()?;
    let subaccount: Subaccount = self
      .execute(self.client.post(self.url("/subaccount")).json(request))
      .await?;
    info!(subaccount_code = %subaccount.subaccount_code, "Subaccount created.");
    Ok(subaccount)
  }

  #[instrument(name = "paystack::update_subaccount", skip(self, request))]
  async fn update_subaccount(&self, code: &str, request: &SubaccountRequest) -> Result<Subaccount, GatewayError> {
    self.key()?;
    let url = self.url(&format!("/subaccount/{}", code));
    let subaccount: Subaccount = self.execute(self.client.put(&url).json(request)).await?;
    info!("Subaccount updated.");
    Ok(subaccount)
  }

  #[instrument(name = "paystack::refund", skip(self))]
  async fn refund(&self, reference: &str, amount_cents: Option<i64>) -> Result<RefundReceipt, GatewayError> {
    self.key()?;
    let mut body = json!({ "transaction": reference });
    if let Some(amount) = amount_cents {
      body["amount"] = json!(amount);
    }
    let raw: RawRefund = self.execute(self.client.post(self.url("/refund")).json(&body)).await?;
    if raw.status == "failed" {
      warn!("Gateway reported refund failure.");
      return Err(GatewayError::Rejected(format!("Refund for {} failed", reference)));
    }
    info!(status = %raw.status, "Refund requested.");
    Ok(RefundReceipt {
      reference: reference.to_string(),
      status: raw.status,
      amount_cents: raw.amount,
    })
  }
}
