// server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use rebooked_flow::FlowError;

use crate::services::courier::CourierError;
use crate::services::email::EmailError;
use crate::services::paystack::GatewayError;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Permission Denied: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Payment Processing Error: {0}")]
  Payment(String),

  #[error("External Service Error: {0}")]
  Gateway(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Flow Error: {source}")]
  Flow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),

  /// A flow stopped early where the caller needed it to complete.
  #[error("Process halted before completion.")]
  FlowHalted,
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    let err = match err.downcast::<AppError>() {
      Ok(app_err) => return app_err,
      Err(err) => err,
    };
    match err.downcast::<sqlx::Error>() {
      Ok(db_err) => AppError::Sqlx(db_err),
      Err(err) => AppError::Internal(err.to_string()),
    }
  }
}

impl From<GatewayError> for AppError {
  fn from(err: GatewayError) -> Self {
    match err {
      GatewayError::NotConfigured => AppError::Config("Payment gateway secret key is not configured".to_string()),
      GatewayError::Rejected(message) => AppError::Payment(message),
      other => AppError::Gateway(other.to_string()),
    }
  }
}

impl From<CourierError> for AppError {
  fn from(err: CourierError) -> Self {
    match err {
      CourierError::UnknownProvider(name) => AppError::Validation(format!("Unknown courier provider '{name}'")),
      other => AppError::Gateway(other.to_string()),
    }
  }
}

impl From<EmailError> for AppError {
  fn from(err: EmailError) -> Self {
    match err {
      EmailError::InvalidRecipient(to) => AppError::Validation(format!("Invalid email recipient '{to}'")),
      other => AppError::Gateway(other.to_string()),
    }
  }
}

/// Picks the message shown to end users by looking for telltale words in the
/// error text. Order matters: the first matching class wins.
pub fn user_message_for(error_text: &str) -> &'static str {
  let text = error_text.to_lowercase();
  let has_any = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

  if has_any(&["network", "fetch", "timeout", "timed out", "connection"]) {
    "Network problem. Please check your connection and try again."
  } else if has_any(&["permission", "unauthorized", "forbidden", "not allowed", "authentication"]) {
    "You don't have permission to perform this action."
  } else if has_any(&["duplicate", "already"]) {
    "This action has already been completed."
  } else if has_any(&["not found", "does not exist"]) {
    "The requested item could not be found."
  } else if has_any(&["payment", "card", "transaction"]) {
    "Payment could not be processed. Please try again or use a different payment method."
  } else {
    "Something went wrong. Please try again."
  }
}

impl AppError {
  /// Error text safe to return to clients. Database and internal details stay in the logs.
  fn public_message(&self) -> String {
    match self {
      AppError::Sqlx(sqlx::Error::RowNotFound) => "Resource not found".to_string(),
      AppError::Sqlx(_) => "Database operation failed".to_string(),
      AppError::Internal(_) => "An internal error occurred".to_string(),
      AppError::Config(_) => "Configuration issue".to_string(),
      AppError::Flow { .. } => "Workflow processing error".to_string(),
      other => other.to_string(),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) | AppError::Sqlx(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
      AppError::Conflict(_) | AppError::FlowHalted => StatusCode::CONFLICT,
      AppError::Payment(_) => StatusCode::PAYMENT_REQUIRED,
      AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Flow { .. } | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, "Responding with error");
    }
    let text = self.to_string();
    HttpResponse::build(status).json(json!({
      "error": self.public_message(),
      "userMessage": user_message_for(&text),
    }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;
  use actix_web::body::to_bytes;

  #[test]
  fn classifies_error_text_by_keyword() {
    assert_eq!(
      user_message_for("Network request failed"),
      "Network problem. Please check your connection and try again."
    );
    assert_eq!(
      user_message_for("permission denied for table orders"),
      "You don't have permission to perform this action."
    );
    assert_eq!(
      user_message_for("You have already purchased this book"),
      "This action has already been completed."
    );
    assert_eq!(user_message_for("Book not found"), "The requested item could not be found.");
    assert_eq!(
      user_message_for("Card declined"),
      "Payment could not be processed. Please try again or use a different payment method."
    );
    assert_eq!(user_message_for("boom"), "Something went wrong. Please try again.");
  }

  #[test]
  fn duplicate_wins_over_payment() {
    assert_eq!(
      user_message_for("Payment already verified"),
      "This action has already been completed."
    );
  }

  #[test]
  fn anyhow_wrapping_app_error_is_recovered() {
    let err = AppError::from(anyhow::Error::new(AppError::NotFound("order".into())));
    assert!(matches!(err, AppError::NotFound(_)));
  }

  #[test]
  fn gateway_rejection_becomes_payment_error() {
    let err = AppError::from(GatewayError::Rejected("Transaction not found".into()));
    assert!(matches!(err, AppError::Payment(_)));
    assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
  }

  #[actix_web::test]
  async fn error_body_hides_database_details() {
    let err = AppError::Sqlx(sqlx::Error::PoolTimedOut);
    let response = err.error_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_bytes(response.into_body()).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["error"], "Database operation failed");
    assert!(value["userMessage"].is_string());
  }
}
