// server/src/services/courier/fastway.rs

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{simulated_suffix, CourierError, CourierHttp, CourierProvider};
use crate::models::{
  CourierKind, ProviderHealth, Quote, QuoteOption, QuoteRequest, Shipment, ShipmentRequest, TrackingEvent,
  TrackingInfo,
};
use crate::services::health_cache::HealthCache;

/// Fastway regional franchise that collects from a province.
pub fn franchise_for_province(province: &str) -> &'static str {
  match province.trim().to_ascii_lowercase().as_str() {
    "western cape" => "CPT",
    "kwazulu-natal" | "kwazulu natal" | "kzn" => "DUR",
    "eastern cape" => "PLZ",
    "free state" => "BFN",
    _ => "JNB",
  }
}

pub struct FastwayClient {
  http: CourierHttp,
}

impl FastwayClient {
  pub fn new(api_key: Option<String>, base_url: String, health: Arc<HealthCache>) -> Result<Self, CourierError> {
    Ok(Self {
      http: CourierHttp::new(CourierKind::Fastway, api_key, base_url, health)?,
    })
  }

  /// Label (service) lookup for a route; each label colour is one service option.
  async fn api_lookup(&self, request: &QuoteRequest) -> Result<Quote, CourierError> {
    let key = self.http.key()?;
    let franchise = franchise_for_province(&request.collection.province);
    let suburb = request
      .delivery
      .suburb
      .as_deref()
      .unwrap_or(&request.delivery.city)
      .to_string();
    let weight_kg = (f64::from(request.parcel.weight_grams) / 1000.0).ceil().max(1.0);
    let path = format!("/psc/lookup/{}/{}/{}/{}", franchise, suburb, request.delivery.postal_code, weight_kg);

    let raw: LookupResponse = self
      .http
      .send_json(self.http.client.get(self.http.url(&path)).query(&[("api_key", key)]))
      .await?;
    let options: Vec<QuoteOption> = raw
      .result
      .services
      .into_iter()
      .map(|s| QuoteOption {
        service_code: s.labelcolour,
        service_name: s.name,
        price_cents: (s.totalprice_normal * 100.0).round() as i64,
        estimated_days: s.days,
      })
      .collect();
    if options.is_empty() {
      return Err(CourierError::Parse("no services for route".to_string()));
    }
    Ok(Quote {
      provider: CourierKind::Fastway,
      options,
      simulated: false,
    })
  }

  async fn api_consignment(&self, request: &ShipmentRequest) -> Result<Shipment, CourierError> {
    let key = self.http.key()?;
    let route = &request.route;
    let body = json!({
      "Reference": request.order_reference,
      "LabelColour": request.service_code,
      "PickupFranchise": franchise_for_province(&route.collection.province),
      "ContactName": route.delivery.contact_name,
      "PhoneNumber": route.delivery.phone,
      "Address1": route.delivery.street,
      "Suburb": route.delivery.suburb.as_deref().unwrap_or(&route.delivery.city),
      "Postcode": route.delivery.postal_code,
      "WeightInKg": f64::from(route.parcel.weight_grams) / 1000.0,
    });
    let raw: ConsignmentResponse = self
      .http
      .send_json(
        self
          .http
          .client
          .post(self.http.url("/consignments"))
          .query(&[("api_key", key)])
          .json(&body),
      )
      .await?;
    let label = raw
      .result
      .labels
      .into_iter()
      .next()
      .ok_or_else(|| CourierError::Parse("consignment without label".to_string()))?;
    Ok(Shipment {
      provider: CourierKind::Fastway,
      tracking_number: label.label_number,
      service_code: request.service_code.clone(),
      price_cents: None,
      label_url: label.label_url,
      simulated: false,
    })
  }

  async fn api_track(&self, tracking_number: &str) -> Result<TrackingInfo, CourierError> {
    let key = self.http.key()?;
    let path = format!("/tracktrace/detail/{}", tracking_number);
    let raw: TrackResponse = self
      .http
      .send_json(self.http.client.get(self.http.url(&path)).query(&[("api_key", key)]))
      .await?;
    let events: Vec<TrackingEvent> = raw
      .result
      .scans
      .into_iter()
      .map(|scan| TrackingEvent {
        at: scan
          .date
          .as_deref()
          .and_then(|d| NaiveDateTime::parse_from_str(d, "%d/%m/%Y %H:%M:%S").ok())
          .map(|naive| Utc.from_utc_datetime(&naive)),
        status: scan.status_description.clone(),
        description: scan.status_description,
        location: scan.name,
      })
      .collect();
    let status = events
      .last()
      .map(|e| e.status.clone())
      .unwrap_or_else(|| "unknown".to_string());
    Ok(TrackingInfo {
      provider: CourierKind::Fastway,
      tracking_number: tracking_number.to_string(),
      status,
      events,
      simulated: false,
    })
  }

  async fn api_ping(&self) -> Result<(), CourierError> {
    let key = self.http.key()?;
    let _: Value = self
      .http
      .send_json(
        self
          .http
          .client
          .get(self.http.url("/psc/listrfs"))
          .query(&[("CountryCode", "24"), ("api_key", key)]),
      )
      .await?;
    Ok(())
  }
}

#[derive(Deserialize)]
struct LookupResponse {
  result: LookupResult,
}

#[derive(Deserialize)]
struct LookupResult {
  #[serde(default)]
  services: Vec<RawService>,
}

#[derive(Deserialize)]
struct RawService {
  labelcolour: String,
  name: String,
  totalprice_normal: f64,
  #[serde(default)]
  days: Option<u32>,
}

#[derive(Deserialize)]
struct ConsignmentResponse {
  result: ConsignmentResult,
}

#[derive(Deserialize)]
struct ConsignmentResult {
  #[serde(default)]
  labels: Vec<RawLabel>,
}

#[derive(Deserialize)]
struct RawLabel {
  label_number: String,
  #[serde(default)]
  label_url: Option<String>,
}

#[derive(Deserialize)]
struct TrackResponse {
  result: TrackResult,
}

#[derive(Deserialize)]
struct TrackResult {
  #[serde(rename = "Scans", default)]
  scans: Vec<RawScan>,
}

#[derive(Deserialize)]
struct RawScan {
  #[serde(rename = "StatusDescription")]
  status_description: String,
  #[serde(rename = "Date")]
  date: Option<String>,
  #[serde(rename = "Name")]
  name: Option<String>,
}

fn fallback_quote() -> Quote {
  Quote {
    provider: CourierKind::Fastway,
    options: vec![QuoteOption {
      service_code: "PARCEL".to_string(),
      service_name: "Fastway Parcel".to_string(),
      price_cents: 8_900,
      estimated_days: Some(3),
    }],
    simulated: true,
  }
}

#[async_trait]
impl CourierProvider for FastwayClient {
  fn kind(&self) -> CourierKind {
    CourierKind::Fastway
  }

  fn is_configured(&self) -> bool {
    self.http.api_key.is_some()
  }

  #[instrument(name = "fastway::quote", skip_all)]
  async fn quote(&self, request: &QuoteRequest) -> Result<Quote, CourierError> {
    Ok(
      self
        .http
        .call_or_fallback("fastway.lookup", || self.api_lookup(request), fallback_quote)
        .await,
    )
  }

  #[instrument(name = "fastway::create_shipment", skip_all, fields(order = %request.order_reference))]
  async fn create_shipment(&self, request: &ShipmentRequest) -> Result<Shipment, CourierError> {
    let shipment = self
      .http
      .call_once(
        "fastway.consignment",
        self.api_consignment(request),
        || Shipment {
          provider: CourierKind::Fastway,
          tracking_number: format!("FW-SIM-{}", simulated_suffix()),
          service_code: request.service_code.clone(),
          price_cents: None,
          label_url: None,
          simulated: true,
        },
      )
      .await?;
    info!(tracking_number = %shipment.tracking_number, simulated = shipment.simulated, "Consignment created.");
    Ok(shipment)
  }

  #[instrument(name = "fastway::track", skip(self))]
  async fn track(&self, tracking_number: &str) -> Result<TrackingInfo, CourierError> {
    Ok(
      self
        .http
        .call_or_fallback(
          "fastway.track",
          || self.api_track(tracking_number),
          || TrackingInfo {
            provider: CourierKind::Fastway,
            tracking_number: tracking_number.to_string(),
            status: "in-transit".to_string(),
            events: vec![TrackingEvent {
              at: Some(Utc::now()),
              status: "picked-up".to_string(),
              description: "Parcel picked up by franchise".to_string(),
              location: None,
            }],
            simulated: true,
          },
        )
        .await,
    )
  }

  async fn health_check(&self) -> ProviderHealth {
    self.http.check_health(self.api_ping()).await
  }
}
