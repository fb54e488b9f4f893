// server/src/models/notification.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, SqlxType)]
#[sqlx(type_name = "notification_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
  Info,
  Success,
  Warning,
  Error,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub id: Uuid,
  pub user_id: Uuid,
  pub kind: NotificationKind,
  pub title: String,
  pub message: String,
  pub read: bool,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
  pub user_id: Uuid,
  pub kind: NotificationKind,
  pub title: String,
  pub message: String,
}

impl NewNotification {
  pub fn new(user_id: Uuid, kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      user_id,
      kind,
      title: title.into(),
      message: message.into(),
    }
  }
}
