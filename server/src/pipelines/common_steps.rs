// server/src/pipelines/common_steps.rs

//! Pieces shared by several flows.

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result as AppResult};
use crate::models::NewNotification;
use crate::services::email::EmailMessage;
use crate::state::AppState;

/// Error for context fields an earlier step should have filled in.
pub fn missing(field: &str) -> AppError {
  AppError::Internal(format!("'{}' missing from flow context", field))
}

/// Sends each notification, returning how many were stored (duplicates are dropped).
#[instrument(name = "common_step::notify_many", skip_all, fields(count = notes.len()))]
pub async fn notify_many(app_state: &AppState, notes: Vec<NewNotification>) -> AppResult<usize> {
  let mut stored = 0;
  for note in notes {
    if app_state.notifications.notify(note).await?.is_some() {
      stored += 1;
    }
  }
  Ok(stored)
}

/// Emails a user at their profile address. Returns `false` when the user has no profile.
#[instrument(name = "common_step::email_user", skip(app_state, build))]
pub async fn email_user(
  app_state: &AppState,
  user_id: Uuid,
  build: impl FnOnce(&str) -> EmailMessage,
) -> AppResult<bool> {
  let Some(profile) = app_state.store.get_profile(user_id).await? else {
    warn!("No profile found; email skipped.");
    return Ok(false);
  };
  let message = build(&profile.email);
  let receipt = app_state.mailer.send(&message).await?;
  info!(simulated = receipt.simulated, "Email dispatched.");
  Ok(true)
}
