// server/src/web/handlers/subaccount_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::instrument;

use crate::errors::AppError;
use crate::models::{BankingDetailsInput, BankingSummary};
use crate::pipelines::subaccount::save_seller_subaccount;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[instrument(name = "handler::save_subaccount", skip(app_state, payload, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn save_subaccount_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<BankingDetailsInput>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let summary = save_seller_subaccount(&app_state, auth_user.user_id, payload.into_inner()).await?;
  Ok(HttpResponse::Ok().json(summary))
}

#[instrument(name = "handler::my_subaccount", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn my_subaccount_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let details = app_state
    .store
    .get_banking_details(auth_user.user_id)
    .await?
    .ok_or_else(|| AppError::NotFound("No banking details on file".to_string()))?;
  Ok(HttpResponse::Ok().json(BankingSummary::from(&details)))
}

#[cfg(test)]
mod tests {
  use super::super::test_helpers::{as_user, test_app};
  use crate::services::paystack::{MockPaymentGateway, Subaccount};
  use crate::state::test_support::state_with;
  use crate::store::memory::MemoryStore;
  use actix_web::{http::StatusCode, test};
  use serde_json::json;
  use std::sync::Arc;
  use uuid::Uuid;

  #[actix_web::test]
  async fn saved_details_are_returned_masked() {
    let store = Arc::new(MemoryStore::new());
    let user = Uuid::new_v4();
    store.add_profile(user, "sipho@example.co.za", None);
    let mut gateway = MockPaymentGateway::new();
    gateway.expect_create_subaccount().returning(|req| {
      Ok(Subaccount {
        subaccount_code: "ACCT_sipho".to_string(),
        business_name: req.business_name.clone(),
        settlement_bank: None,
        percentage_charge: Some(req.percentage_charge),
      })
    });
    let app = test_app!(state_with(store, gateway));

    let missing = as_user(test::TestRequest::get().uri("/api/v1/subaccounts/me"), user).to_request();
    assert_eq!(test::call_service(&app, missing).await.status(), StatusCode::NOT_FOUND);

    let save = as_user(test::TestRequest::post().uri("/api/v1/subaccounts"), user)
      .set_json(json!({
        "businessName": "Sipho's Study Shelf",
        "email": "sipho@example.co.za",
        "bankCode": "250655",
        "accountNumber": "62812345678"
      }))
      .to_request();
    assert_eq!(test::call_service(&app, save).await.status(), StatusCode::OK);

    let me = as_user(test::TestRequest::get().uri("/api/v1/subaccounts/me"), user).to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, me).await;
    assert_eq!(body["subaccountCode"], "ACCT_sipho");
    assert_eq!(body["accountNumberMasked"], "*******5678");
  }
}
