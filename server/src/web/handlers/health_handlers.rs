// server/src/web/handlers/health_handlers.rs

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde_json::json;
use tracing::{instrument, warn};

use crate::state::AppState;

/// Database reachability decides the status code; courier health is informational.
#[instrument(name = "handler::health", skip(app_state))]
pub async fn health_handler(app_state: web::Data<AppState>) -> HttpResponse {
  let database_ok = match app_state.store.ping().await {
    Ok(()) => true,
    Err(e) => {
      warn!(error = %e, "Database ping failed.");
      false
    }
  };
  let couriers = app_state.couriers.health().await;
  let body = json!({
    "status": if database_ok { "ok" } else { "degraded" },
    "database": database_ok,
    "paymentGatewayConfigured": app_state.config.paystack_secret_key.is_some(),
    "couriers": couriers,
    "checkedAt": Utc::now(),
  });
  if database_ok {
    HttpResponse::Ok().json(body)
  } else {
    HttpResponse::ServiceUnavailable().json(body)
  }
}
