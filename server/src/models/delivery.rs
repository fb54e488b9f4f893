// server/src/models/delivery.rs

//! Courier-facing value types shared by orders, flows and provider clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CourierKind {
  CourierGuy,
  Fastway,
}

impl CourierKind {
  pub const ALL: [CourierKind; 2] = [CourierKind::CourierGuy, CourierKind::Fastway];

  pub fn as_str(self) -> &'static str {
    match self {
      CourierKind::CourierGuy => "courier-guy",
      CourierKind::Fastway => "fastway",
    }
  }

  pub fn display_name(self) -> &'static str {
    match self {
      CourierKind::CourierGuy => "The Courier Guy",
      CourierKind::Fastway => "Fastway",
    }
  }
}

impl std::fmt::Display for CourierKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for CourierKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
      "courier-guy" | "courierguy" | "the-courier-guy" | "tcg" => Ok(CourierKind::CourierGuy),
      "fastway" => Ok(CourierKind::Fastway),
      other => Err(other.to_string()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
  pub contact_name: String,
  pub phone: Option<String>,
  pub street: String,
  pub suburb: Option<String>,
  pub city: String,
  pub province: String,
  pub postal_code: String,
}

impl Address {
  pub fn validate(&self) -> Result<(), String> {
    if self.contact_name.trim().is_empty() {
      return Err("Address contact name is required".to_string());
    }
    if self.street.trim().is_empty() || self.city.trim().is_empty() || self.province.trim().is_empty() {
      return Err("Address street, city and province are required".to_string());
    }
    let code = self.postal_code.trim();
    if code.len() != 4 || !code.chars().all(|c| c.is_ascii_digit()) {
      return Err("Postal code must be 4 digits".to_string());
    }
    Ok(())
  }
}

/// Parcel dimensions in grams and centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
  pub weight_grams: u32,
  pub length_cm: u32,
  pub width_cm: u32,
  pub height_cm: u32,
}

impl Default for Parcel {
  /// A single textbook in a padded envelope.
  fn default() -> Self {
    Self {
      weight_grams: 1_000,
      length_cm: 30,
      width_cm: 22,
      height_cm: 5,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
  pub collection: Address,
  pub delivery: Address,
  #[serde(default)]
  pub parcel: Parcel,
  #[serde(default)]
  pub declared_value_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteOption {
  pub service_code: String,
  pub service_name: String,
  pub price_cents: i64,
  pub estimated_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
  pub provider: CourierKind,
  pub options: Vec<QuoteOption>,
  /// Canned response used when the provider could not be reached.
  pub simulated: bool,
}

impl Quote {
  pub fn cheapest(&self) -> Option<&QuoteOption> {
    self.options.iter().min_by_key(|o| o.price_cents)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentRequest {
  pub order_reference: String,
  #[serde(flatten)]
  pub route: QuoteRequest,
  pub service_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
  pub provider: CourierKind,
  pub tracking_number: String,
  pub service_code: Option<String>,
  pub price_cents: Option<i64>,
  pub label_url: Option<String>,
  pub simulated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
  pub at: Option<DateTime<Utc>>,
  pub status: String,
  pub description: String,
  pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingInfo {
  pub provider: CourierKind,
  pub tracking_number: String,
  pub status: String,
  pub events: Vec<TrackingEvent>,
  pub simulated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
  pub provider: CourierKind,
  pub healthy: bool,
  pub configured: bool,
  pub circuit_open: bool,
  pub checked_at: DateTime<Utc>,
}
