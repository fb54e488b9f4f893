// server/src/web/handlers/notification_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsQuery {
  #[serde(default)]
  pub unread_only: bool,
}

#[instrument(name = "handler::list_notifications", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn list_notifications_handler(
  app_state: web::Data<AppState>,
  query: web::Query<NotificationsQuery>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let notifications = app_state
    .store
    .list_notifications(auth_user.user_id, query.unread_only)
    .await?;
  let unread = notifications.iter().filter(|n| !n.read).count();
  Ok(HttpResponse::Ok().json(json!({ "notifications": notifications, "unreadCount": unread })))
}

#[instrument(name = "handler::mark_notification_read", skip(app_state, path, auth_user), fields(notification_id = %path.as_ref()))]
pub async fn mark_read_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let id = path.into_inner();
  if !app_state.store.mark_notification_read(auth_user.user_id, id).await? {
    return Err(AppError::NotFound(format!("Notification {} not found", id)));
  }
  Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
  use super::super::test_helpers::{as_user, test_app};
  use crate::models::{NewNotification, NotificationKind};
  use crate::services::paystack::MockPaymentGateway;
  use crate::state::test_support::state_with;
  use crate::store::memory::MemoryStore;
  use crate::store::MarketplaceStore;
  use actix_web::{http::StatusCode, test};
  use std::sync::Arc;
  use uuid::Uuid;

  #[actix_web::test]
  async fn notifications_can_be_listed_and_marked_read() {
    let store = Arc::new(MemoryStore::new());
    let user = Uuid::new_v4();
    let note = store
      .insert_notification(&NewNotification::new(user, NotificationKind::Info, "Hello", "Welcome to ReBooked"))
      .await
      .unwrap();
    let app = test_app!(state_with(store, MockPaymentGateway::new()));

    let list = as_user(test::TestRequest::get().uri("/api/v1/notifications?unreadOnly=true"), user).to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, list).await;
    assert_eq!(body["unreadCount"], 1);

    let uri = format!("/api/v1/notifications/{}/read", note.id);
    let read = as_user(test::TestRequest::post().uri(&uri), user).to_request();
    assert_eq!(test::call_service(&app, read).await.status(), StatusCode::NO_CONTENT);

    let other = as_user(test::TestRequest::post().uri(&uri), Uuid::new_v4()).to_request();
    assert_eq!(test::call_service(&app, other).await.status(), StatusCode::NOT_FOUND);

    let list = as_user(test::TestRequest::get().uri("/api/v1/notifications?unreadOnly=true"), user).to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, list).await;
    assert_eq!(body["notifications"].as_array().unwrap().len(), 0);
  }
}
