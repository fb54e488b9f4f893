// server/src/web/handlers/courier_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::models::{QuoteRequest, ShipmentRequest};
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

fn validate_route(route: &QuoteRequest) -> Result<(), AppError> {
  route
    .collection
    .validate()
    .map_err(|e| AppError::Validation(format!("Collection address: {}", e)))?;
  route
    .delivery
    .validate()
    .map_err(|e| AppError::Validation(format!("Delivery address: {}", e)))
}

/// Quotes from every courier, cheapest option first.
#[instrument(name = "handler::courier_quotes", skip(app_state, payload))]
pub async fn quotes_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<QuoteRequest>,
) -> Result<HttpResponse, AppError> {
  validate_route(&payload)?;
  let quotes = app_state.couriers.quotes(&payload).await;
  if quotes.is_empty() {
    return Err(AppError::Gateway("No courier could quote this route".to_string()));
  }
  let mut options: Vec<_> = quotes
    .iter()
    .flat_map(|q| q.options.iter().map(move |o| (q.provider, o)))
    .collect();
  options.sort_by_key(|(_, o)| o.price_cents);
  let cheapest = options.first().map(|(provider, o)| json!({ "provider": provider, "option": o }));
  info!(providers = quotes.len(), "Courier quotes collected.");
  Ok(HttpResponse::Ok().json(json!({ "quotes": quotes, "cheapest": cheapest })))
}

#[instrument(name = "handler::create_shipment", skip(app_state, path, payload, _auth_user), fields(provider = %path.as_ref()))]
pub async fn create_shipment_handler(
  app_state: web::Data<AppState>,
  path: web::Path<String>,
  payload: web::Json<ShipmentRequest>,
  _auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let provider = app_state.couriers.resolve(&path)?;
  validate_route(&payload.route)?;
  let shipment = provider.create_shipment(&payload).await?;
  Ok(HttpResponse::Created().json(shipment))
}

#[instrument(name = "handler::track_shipment", skip(app_state, path))]
pub async fn track_handler(
  app_state: web::Data<AppState>,
  path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
  let (provider, tracking_number) = path.into_inner();
  let tracking = app_state.couriers.resolve(&provider)?.track(&tracking_number).await?;
  Ok(HttpResponse::Ok().json(tracking))
}

#[instrument(name = "handler::courier_health", skip(app_state))]
pub async fn courier_health_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let providers = app_state.couriers.health().await;
  Ok(HttpResponse::Ok().json(json!({ "providers": providers })))
}
