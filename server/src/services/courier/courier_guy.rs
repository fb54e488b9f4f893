// server/src/services/courier/courier_guy.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{simulated_suffix, CourierError, CourierHttp, CourierProvider};
use crate::models::{
  Address, CourierKind, ProviderHealth, Quote, QuoteOption, QuoteRequest, Shipment, ShipmentRequest, TrackingEvent,
  TrackingInfo,
};
use crate::services::health_cache::HealthCache;

pub struct CourierGuyClient {
  http: CourierHttp,
}

impl CourierGuyClient {
  pub fn new(api_key: Option<String>, base_url: String, health: Arc<HealthCache>) -> Result<Self, CourierError> {
    Ok(Self {
      http: CourierHttp::new(CourierKind::CourierGuy, api_key, base_url, health)?,
    })
  }

  fn address_json(address: &Address) -> Value {
    json!({
      "type": "residential",
      "street_address": address.street,
      "local_area": address.suburb,
      "city": address.city,
      "zone": address.province,
      "country": "ZA",
      "code": address.postal_code,
    })
  }

  fn contact_json(address: &Address) -> Value {
    json!({ "name": address.contact_name, "mobile_number": address.phone })
  }

  fn route_json(request: &QuoteRequest) -> Value {
    json!({
      "collection_address": Self::address_json(&request.collection),
      "delivery_address": Self::address_json(&request.delivery),
      "parcels": [{
        "submitted_length_cm": request.parcel.length_cm,
        "submitted_width_cm": request.parcel.width_cm,
        "submitted_height_cm": request.parcel.height_cm,
        "submitted_weight_kg": f64::from(request.parcel.weight_grams) / 1000.0,
      }],
      "declared_value": request.declared_value_cents as f64 / 100.0,
    })
  }

  async fn api_rates(&self, request: &QuoteRequest) -> Result<Quote, CourierError> {
    let key = self.http.key()?;
    let raw: RatesResponse = self
      .http
      .send_json(
        self
          .http
          .client
          .post(self.http.url("/rates"))
          .bearer_auth(key)
          .json(&Self::route_json(request)),
      )
      .await?;
    let options: Vec<QuoteOption> = raw
      .rates
      .into_iter()
      .map(|r| QuoteOption {
        service_code: r.service_level.code,
        service_name: r.service_level.name,
        price_cents: rands_to_cents(r.rate),
        estimated_days: r.service_level.delivery_days,
      })
      .collect();
    if options.is_empty() {
      return Err(CourierError::Parse("no rates returned".to_string()));
    }
    Ok(Quote {
      provider: CourierKind::CourierGuy,
      options,
      simulated: false,
    })
  }

  async fn api_shipment(&self, request: &ShipmentRequest) -> Result<Shipment, CourierError> {
    let key = self.http.key()?;
    let mut body = Self::route_json(&request.route);
    body["collection_contact"] = Self::contact_json(&request.route.collection);
    body["delivery_contact"] = Self::contact_json(&request.route.delivery);
    body["service_level_code"] = json!(request.service_code.as_deref().unwrap_or("ECO"));
    body["customer_reference"] = json!(request.order_reference);

    let raw: ShipmentResponse = self
      .http
      .send_json(self.http.client.post(self.http.url("/shipments")).bearer_auth(key).json(&body))
      .await?;
    Ok(Shipment {
      provider: CourierKind::CourierGuy,
      tracking_number: raw.short_tracking_reference,
      service_code: request.service_code.clone(),
      price_cents: raw.rate.map(rands_to_cents),
      label_url: None,
      simulated: false,
    })
  }

  async fn api_track(&self, tracking_number: &str) -> Result<TrackingInfo, CourierError> {
    let key = self.http.key()?;
    let raw: TrackingResponse = self
      .http
      .send_json(
        self
          .http
          .client
          .get(self.http.url("/tracking/shipments"))
          .query(&[("tracking_reference", tracking_number)])
          .bearer_auth(key),
      )
      .await?;
    let shipment = raw
      .shipments
      .into_iter()
      .next()
      .ok_or_else(|| CourierError::Parse(format!("no shipment for {}", tracking_number)))?;
    Ok(TrackingInfo {
      provider: CourierKind::CourierGuy,
      tracking_number: tracking_number.to_string(),
      status: shipment.status,
      events: shipment
        .tracking_events
        .into_iter()
        .map(|e| TrackingEvent {
          at: e.date,
          status: e.status,
          description: e.message.unwrap_or_default(),
          location: e.location,
        })
        .collect(),
      simulated: false,
    })
  }

  async fn api_ping(&self) -> Result<(), CourierError> {
    let key = self.http.key()?;
    let _: Value = self
      .http
      .send_json(self.http.client.get(self.http.url("/health")).bearer_auth(key))
      .await?;
    Ok(())
  }
}

fn rands_to_cents(rands: f64) -> i64 {
  (rands * 100.0).round() as i64
}

#[derive(Deserialize)]
struct RatesResponse {
  #[serde(default)]
  rates: Vec<RawRate>,
}

#[derive(Deserialize)]
struct RawRate {
  rate: f64,
  service_level: RawServiceLevel,
}

#[derive(Deserialize)]
struct RawServiceLevel {
  code: String,
  name: String,
  #[serde(default)]
  delivery_days: Option<u32>,
}

#[derive(Deserialize)]
struct ShipmentResponse {
  short_tracking_reference: String,
  #[serde(default)]
  rate: Option<f64>,
}

#[derive(Deserialize)]
struct TrackingResponse {
  #[serde(default)]
  shipments: Vec<RawTrackedShipment>,
}

#[derive(Deserialize)]
struct RawTrackedShipment {
  status: String,
  #[serde(default)]
  tracking_events: Vec<RawTrackingEvent>,
}

#[derive(Deserialize)]
struct RawTrackingEvent {
  date: Option<DateTime<Utc>>,
  status: String,
  message: Option<String>,
  location: Option<String>,
}

fn fallback_quote() -> Quote {
  Quote {
    provider: CourierKind::CourierGuy,
    options: vec![
      QuoteOption {
        service_code: "ECO".to_string(),
        service_name: "Economy".to_string(),
        price_cents: 9_500,
        estimated_days: Some(4),
      },
      QuoteOption {
        service_code: "ONX".to_string(),
        service_name: "Overnight Express".to_string(),
        price_cents: 15_500,
        estimated_days: Some(1),
      },
    ],
    simulated: true,
  }
}

#[async_trait]
impl CourierProvider for CourierGuyClient {
  fn kind(&self) -> CourierKind {
    CourierKind::CourierGuy
  }

  fn is_configured(&self) -> bool {
    self.http.api_key.is_some()
  }

  #[instrument(name = "courier_guy::quote", skip_all)]
  async fn quote(&self, request: &QuoteRequest) -> Result<Quote, CourierError> {
    Ok(
      self
        .http
        .call_or_fallback("courier_guy.rates", || self.api_rates(request), fallback_quote)
        .await,
    )
  }

  #[instrument(name = "courier_guy::create_shipment", skip_all, fields(order = %request.order_reference))]
  async fn create_shipment(&self, request: &ShipmentRequest) -> Result<Shipment, CourierError> {
    let shipment = self
      .http
      .call_once(
        "courier_guy.shipments",
        self.api_shipment(request),
        || Shipment {
          provider: CourierKind::CourierGuy,
          tracking_number: format!("TCG-SIM-{}", simulated_suffix()),
          service_code: request.service_code.clone(),
          price_cents: None,
          label_url: None,
          simulated: true,
        },
      )
      .await?;
    info!(tracking_number = %shipment.tracking_number, simulated = shipment.simulated, "Shipment created.");
    Ok(shipment)
  }

  #[instrument(name = "courier_guy::track", skip(self))]
  async fn track(&self, tracking_number: &str) -> Result<TrackingInfo, CourierError> {
    Ok(
      self
        .http
        .call_or_fallback(
          "courier_guy.track",
          || self.api_track(tracking_number),
          || TrackingInfo {
            provider: CourierKind::CourierGuy,
            tracking_number: tracking_number.to_string(),
            status: "in-transit".to_string(),
            events: vec![TrackingEvent {
              at: Some(Utc::now()),
              status: "collected".to_string(),
              description: "Parcel collected from seller".to_string(),
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
