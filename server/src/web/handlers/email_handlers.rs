// server/src/web/handlers/email_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::services::email::EmailMessage;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

/// True when `to` is the caller's own address or belongs to the other party
/// of one of the caller's orders.
async fn may_email(app_state: &AppState, user_id: Uuid, to: &str) -> Result<bool> {
  let store = &app_state.store;
  let matches = |email: &str| email.trim().eq_ignore_ascii_case(to.trim());

  if store.get_profile(user_id).await?.is_some_and(|p| matches(&p.email)) {
    return Ok(true);
  }
  for order in store.list_orders_for_user(user_id).await? {
    let other = if order.buyer_id == user_id { order.seller_id } else { order.buyer_id };
    if store.get_profile(other).await?.is_some_and(|p| matches(&p.email)) {
      return Ok(true);
    }
  }
  Ok(false)
}

/// Sends a transactional email composed by the client, to the caller or to
/// someone they have traded with.
#[instrument(name = "handler::send_email", skip(app_state, payload, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn send_email_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<EmailMessage>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let message = payload.into_inner();
  message.validate()?;
  if message.subject.trim().is_empty() || message.html.trim().is_empty() {
    return Err(AppError::Validation("Subject and body are required".to_string()));
  }
  if !may_email(&app_state, auth_user.user_id, &message.to).await? {
    warn!("Email recipient is not linked to the caller.");
    return Err(AppError::Forbidden(
      "You can only email yourself or the other party of one of your orders".to_string(),
    ));
  }
  let receipt = app_state.mailer.send(&message).await?;
  info!(simulated = receipt.simulated, "Email sent on behalf of user.");
  Ok(HttpResponse::Accepted().json(receipt))
}
