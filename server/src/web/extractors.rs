// server/src/web/extractors.rs

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_EMAIL_HEADER: &str = "X-User-Email";

/// The caller, as asserted by the platform's auth gateway in request headers.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
  pub email: Option<String>,
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let user_id = req
      .headers()
      .get(USER_ID_HEADER)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| Uuid::parse_str(v.trim()).ok());

    let Some(user_id) = user_id else {
      warn!("Missing or invalid {} header.", USER_ID_HEADER);
      return ready(Err(AppError::Auth("You must be signed in to do this".to_string())));
    };

    let email = req
      .headers()
      .get(USER_EMAIL_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(|v| v.trim().to_string())
      .filter(|v| !v.is_empty());

    ready(Ok(AuthenticatedUser { user_id, email }))
  }
}
