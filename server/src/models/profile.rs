// server/src/models/profile.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  pub id: Uuid,
  pub email: String,
  pub full_name: Option<String>,
  pub subaccount_code: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Profile {
  pub fn display_name(&self) -> &str {
    self.full_name.as_deref().unwrap_or(&self.email)
  }
}
