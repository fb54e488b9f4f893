// server/src/services/email.rs

//! Transactional email through Brevo. Without an API key messages are only logged.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::models::{Book, Order};

#[derive(Debug, Error)]
pub enum EmailError {
  #[error("HTTP request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("Email provider error (status {status}): {message}")]
  Api { status: u16, message: String },

  #[error("Invalid recipient: {0}")]
  InvalidRecipient(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
  pub to: String,
  pub to_name: Option<String>,
  pub subject: String,
  pub html: String,
  pub text: Option<String>,
}

impl EmailMessage {
  pub fn validate(&self) -> Result<(), EmailError> {
    let to = self.to.trim();
    let valid = to
      .split_once('@')
      .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'));
    if !valid {
      return Err(EmailError::InvalidRecipient(self.to.clone()));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailReceipt {
  pub message_id: Option<String>,
  /// No provider was configured; the message was logged instead of sent.
  pub simulated: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
  async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, EmailError>;
}

pub struct BrevoMailer {
  client: Client,
  api_key: Option<String>,
  base_url: String,
  sender: String,
}

impl BrevoMailer {
  pub fn new(api_key: Option<String>, base_url: String, sender: String) -> Result<Self, EmailError> {
    let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
    Ok(Self {
      client,
      api_key,
      base_url,
      sender,
    })
  }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrevoResponse {
  message_id: Option<String>,
}

#[async_trait]
impl EmailSender for BrevoMailer {
  #[instrument(name = "email::send", skip(self, message), fields(subject = %message.subject))]
  async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, EmailError> {
    message.validate()?;

    let Some(api_key) = self.api_key.as_deref() else {
      info!(to = %message.to, "Email provider not configured; message logged only.");
      return Ok(EmailReceipt {
        message_id: None,
        simulated: true,
      });
    };

    let body = json!({
      "sender": { "email": self.sender, "name": "ReBooked Solutions" },
      "to": [{ "email": message.to, "name": message.to_name }],
      "subject": message.subject,
      "htmlContent": message.html,
      "textContent": message.text,
    });
    let url = format!("{}/smtp/email", self.base_url.trim_end_matches('/'));
    let response = self
      .client
      .post(&url)
      .header("api-key", api_key)
      .json(&body)
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status().as_u16();
      let message = response.text().await.unwrap_or_default();
      warn!(status, "Email provider rejected the message.");
      return Err(EmailError::Api { status, message });
    }

    let parsed: BrevoResponse = response.json().await.unwrap_or(BrevoResponse { message_id: None });
    info!(message_id = ?parsed.message_id, "Email sent.");
    Ok(EmailReceipt {
      message_id: parsed.message_id,
      simulated: false,
    })
  }
}

pub fn rands(cents: i64) -> String {
  format!("R{}.{:02}", cents / 100, (cents % 100).abs())
}

pub fn purchase_confirmation(to: &str, order: &Order, book: &Book) -> EmailMessage {
  EmailMessage {
    to: to.to_string(),
    to_name: None,
    subject: format!("Your ReBooked order {} is confirmed", order.payment_reference),
    html: format!(
      "<p>Thank you for buying <strong>{}</strong> by {}.</p>\
       <p>Total paid: {} (book {} + delivery {}).</p>\
       <p>The seller has 48 hours to confirm and hand the book to the courier. \
       If they don't, you will be refunded automatically.</p>",
      book.title,
      book.author,
      rands(order.amount_cents),
      rands(order.book_price_cents),
      rands(order.delivery_fee_cents),
    ),
    text: None,
  }
}

pub fn new_sale(to: &str, order: &Order, book: &Book) -> EmailMessage {
  EmailMessage {
    to: to.to_string(),
    to_name: None,
    subject: format!("You sold \"{}\" on ReBooked", book.title),
    html: format!(
      "<p>Good news: <strong>{}</strong> has been paid for.</p>\
       <p>You will receive {} once the book is delivered.</p>\
       <p>Please commit to the order within 48 hours or it will be cancelled and the buyer refunded.</p>",
      book.title,
      rands(order.seller_amount_cents),
    ),
    text: None,
  }
}

pub fn order_shipped(to: &str, order: &Order, tracking_number: &str) -> EmailMessage {
  EmailMessage {
    to: to.to_string(),
    to_name: None,
    subject: format!("Order {} is on its way", order.payment_reference),
    html: format!(
      "<p>Your book has been handed to the courier.</p><p>Tracking number: <strong>{}</strong></p>",
      tracking_number
    ),
    text: None,
  }
}
