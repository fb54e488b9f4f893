// server/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Address, CourierKind};
use crate::pipelines::payment_init::{initialize_payment, InitializePaymentRequest};
use crate::pipelines::payment_verify::verify_payment;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentPayload {
  pub book_id: Uuid,
  pub courier: Option<CourierKind>,
  #[serde(default)]
  pub delivery_fee_cents: i64,
  pub delivery_address: Option<Address>,
  /// Overrides the signed-in user's email for the gateway receipt.
  pub email: Option<String>,
}

#[instrument(
  name = "handler::initialize_payment",
  skip(app_state, payload, auth_user),
  fields(user_id = %auth_user.user_id, book_id = %payload.book_id)
)]
pub async fn initialize_payment_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<InitializePaymentPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let payload = payload.into_inner();
  let buyer_email = match payload.email.or(auth_user.email) {
    Some(email) => email,
    None => app_state
      .store
      .get_profile(auth_user.user_id)
      .await?
      .map(|p| p.email)
      .ok_or_else(|| AppError::Validation("An email address is required to pay".to_string()))?,
  };

  let initialized = initialize_payment(
    &app_state,
    InitializePaymentRequest {
      buyer_id: auth_user.user_id,
      buyer_email,
      book_id: payload.book_id,
      courier: payload.courier,
      delivery_fee_cents: payload.delivery_fee_cents,
      delivery_address: payload.delivery_address,
    },
  )
  .await?;

  info!(reference = %initialized.reference, "Payment session created.");
  Ok(HttpResponse::Ok().json(initialized))
}

#[instrument(name = "handler::verify_payment", skip(app_state, path, auth_user), fields(reference = %path.as_ref()))]
pub async fn verify_payment_handler(
  app_state: web::Data<AppState>,
  path: web::Path<String>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let reference = path.into_inner();
  let order = app_state
    .store
    .get_order_by_reference(&reference)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("No order for payment reference {}", reference)))?;
  if order.buyer_id != auth_user.user_id {
    return Err(AppError::Forbidden("This payment belongs to another user".to_string()));
  }

  let order = verify_payment(&app_state, &reference).await?;
  Ok(HttpResponse::Ok().json(json!({
    "reference": reference,
    "status": order.status,
    "order": order,
  })))
}

#[cfg(test)]
mod tests {
  use super::super::test_helpers::{as_user, test_app};
  use crate::models::book::fixtures::book;
  use crate::models::order::fixtures::order;
  use crate::models::OrderStatus;
  use crate::services::paystack::{InitializedTransaction, MockPaymentGateway, VerifiedTransaction};
  use crate::state::test_support::state_with;
  use crate::store::memory::MemoryStore;
  use actix_web::{http::StatusCode, test};
  use chrono::Utc;
  use serde_json::json;
  use std::sync::Arc;
  use uuid::Uuid;

  #[actix_web::test]
  async fn initialize_returns_authorization_url() {
    let store = Arc::new(MemoryStore::new());
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    store.add_profile(seller, "seller@example.co.za", Some("ACCT_seller"));
    store.add_profile(buyer, "buyer@example.co.za", None);
    let b = book(seller, 30_000);
    let book_id = b.id;
    store.add_book(b);

    let mut gateway = MockPaymentGateway::new();
    gateway
      .expect_initialize_transaction()
      .withf(|req| req.email == "buyer@example.co.za")
      .returning(|req| {
        Ok(InitializedTransaction {
          authorization_url: "https://checkout.paystack.com/xyz".to_string(),
          access_code: "xyz".to_string(),
          reference: req.reference.clone(),
        })
      });
    let app = test_app!(state_with(store.clone(), gateway));

    let req = as_user(test::TestRequest::post().uri("/api/v1/payments/initialize"), buyer)
      .set_json(json!({ "bookId": book_id }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["authorizationUrl"], "https://checkout.paystack.com/xyz");
    assert_eq!(body["split"]["platformFeeCents"], 3_000);
    assert_eq!(store.order_count(), 1);
  }

  #[actix_web::test]
  async fn initialize_requires_user_header() {
    let store = Arc::new(MemoryStore::new());
    let app = test_app!(state_with(store, MockPaymentGateway::new()));
    let req = test::TestRequest::post()
      .uri("/api/v1/payments/initialize")
      .set_json(json!({ "bookId": Uuid::new_v4() }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[actix_web::test]
  async fn verify_marks_order_paid() {
    let store = Arc::new(MemoryStore::new());
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();
    let b = book(seller, 20_000);
    let o = order(buyer, seller, b.id, OrderStatus::Pending);
    store.add_book(b);
    store.add_order(o.clone());

    let tx = VerifiedTransaction {
      gateway_id: 1,
      reference: o.payment_reference.clone(),
      status: "success".to_string(),
      amount_cents: o.amount_cents,
      currency: "ZAR".to_string(),
      channel: None,
      paid_at: Some(Utc::now()),
      customer_email: None,
    };
    let mut gateway = MockPaymentGateway::new();
    gateway.expect_verify_transaction().returning(move |_| Ok(tx.clone()));
    let app = test_app!(state_with(store.clone(), gateway));

    let uri = format!("/api/v1/payments/verify/{}", o.payment_reference);
    let req = as_user(test::TestRequest::get().uri(&uri), buyer).to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "paid");

    let stranger = as_user(test::TestRequest::get().uri(&uri), Uuid::new_v4()).to_request();
    assert_eq!(test::call_service(&app, stranger).await.status(), StatusCode::FORBIDDEN);
  }
}
