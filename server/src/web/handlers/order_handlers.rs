// server/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Address, CancellationActor, NewNotification, NotificationKind, Order, OrderStatus, OrderUpdate};
use crate::pipelines::order_cancel::cancel_order;
use crate::pipelines::order_commit::{commit_order, CommitOrderRequest};
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitPayload {
  pub pickup_address: Option<Address>,
  pub service_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonPayload {
  pub reason: Option<String>,
}

/// Loads an order the caller is buyer or seller of.
async fn order_for_party(app_state: &AppState, order_id: Uuid, user_id: Uuid) -> Result<Order, AppError> {
  let order = app_state
    .store
    .get_order(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
  if !order.is_party(user_id) {
    return Err(AppError::Forbidden("You are not a party to this order".to_string()));
  }
  Ok(order)
}

#[instrument(name = "handler::list_orders", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn list_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let orders = app_state.store.list_orders_for_user(auth_user.user_id).await?;
  let (as_buyer, as_seller): (Vec<Order>, Vec<Order>) =
    orders.into_iter().partition(|o| o.buyer_id == auth_user.user_id);
  Ok(HttpResponse::Ok().json(json!({ "asBuyer": as_buyer, "asSeller": as_seller })))
}

#[instrument(name = "handler::get_order", skip(app_state, path, auth_user), fields(order_id = %path.as_ref()))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = order_for_party(&app_state, path.into_inner(), auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::commit_order", skip(app_state, path, payload, auth_user), fields(order_id = %path.as_ref()))]
pub async fn commit_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  payload: Option<web::Json<CommitPayload>>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let payload = payload.map(web::Json::into_inner).unwrap_or_default();
  let committed = commit_order(
    &app_state,
    CommitOrderRequest {
      order_id: path.into_inner(),
      seller_id: auth_user.user_id,
      pickup_address: payload.pickup_address,
      service_code: payload.service_code,
    },
  )
  .await?;
  Ok(HttpResponse::Ok().json(committed))
}

#[instrument(name = "handler::decline_order", skip(app_state, path, payload, auth_user), fields(order_id = %path.as_ref()))]
pub async fn decline_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  payload: Option<web::Json<ReasonPayload>>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let reason = payload.and_then(|p| p.into_inner().reason);
  let cancelled = cancel_order(
    &app_state,
    path.into_inner(),
    CancellationActor::Seller(auth_user.user_id),
    reason,
  )
  .await?;
  Ok(HttpResponse::Ok().json(cancelled))
}

#[instrument(name = "handler::cancel_order", skip(app_state, path, payload, auth_user), fields(order_id = %path.as_ref()))]
pub async fn cancel_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  payload: Option<web::Json<ReasonPayload>>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let reason = payload.and_then(|p| p.into_inner().reason);
  let cancelled = cancel_order(
    &app_state,
    path.into_inner(),
    CancellationActor::Buyer(auth_user.user_id),
    reason,
  )
  .await?;
  Ok(HttpResponse::Ok().json(cancelled))
}

/// Buyer confirms receipt of a shipped order.
#[instrument(name = "handler::mark_delivered", skip(app_state, path, auth_user), fields(order_id = %path.as_ref()))]
pub async fn mark_delivered_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = order_for_party(&app_state, path.into_inner(), auth_user.user_id).await?;
  if order.buyer_id != auth_user.user_id {
    return Err(AppError::Forbidden("Only the buyer can confirm delivery".to_string()));
  }
  if order.status != OrderStatus::Shipped {
    return Err(AppError::Conflict(format!("Order is {} and cannot be marked delivered", order.status)));
  }
  let delivered = app_state
    .store
    .transition_order(order.id, OrderStatus::Shipped, &OrderUpdate::to(OrderStatus::Delivered))
    .await?
    .ok_or_else(|| AppError::Conflict("Order changed; please refresh".to_string()))?;
  info!(order_id = %delivered.id, "Order delivered.");

  app_state
    .notifications
    .notify(NewNotification::new(
      delivered.seller_id,
      NotificationKind::Success,
      "Book delivered",
      format!(
        "The buyer confirmed delivery of order {}. Your payout is on its way.",
        delivered.payment_reference
      ),
    ))
    .await?;
  Ok(HttpResponse::Ok().json(delivered))
}

#[instrument(name = "handler::order_tracking", skip(app_state, path, auth_user), fields(order_id = %path.as_ref()))]
pub async fn order_tracking_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = order_for_party(&app_state, path.into_inner(), auth_user.user_id).await?;
  let tracking_number = order
    .tracking_number
    .as_deref()
    .ok_or_else(|| AppError::NotFound("This order has no tracking number yet".to_string()))?;
  let courier = order
    .courier_kind()
    .ok_or_else(|| AppError::NotFound("This order has no courier".to_string()))?;
  let tracking = app_state.couriers.get(courier)?.track(tracking_number).await?;
  Ok(HttpResponse::Ok().json(tracking))
}
