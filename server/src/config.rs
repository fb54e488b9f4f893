// server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

pub const DEFAULT_PAYSTACK_BASE_URL: &str = "https://api.paystack.co";
pub const DEFAULT_COURIER_GUY_BASE_URL: &str = "https://api.shiplogic.com/v2";
pub const DEFAULT_FASTWAY_BASE_URL: &str = "https://sa.api.fastway.org/latest";
pub const DEFAULT_BREVO_BASE_URL: &str = "https://api.brevo.com/v3";

#[derive(Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub app_base_url: String,

  pub paystack_secret_key: Option<String>,
  pub paystack_base_url: String,

  pub courier_guy_api_key: Option<String>,
  pub courier_guy_base_url: String,
  pub fastway_api_key: Option<String>,
  pub fastway_base_url: String,

  pub brevo_api_key: Option<String>,
  pub brevo_base_url: String,
  pub email_sender: String,

  pub commit_sweep_interval: Duration,
  pub run_migrations: bool,
}

// Secrets stay out of logs.
impl std::fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AppConfig")
      .field("server_host", &self.server_host)
      .field("server_port", &self.server_port)
      .field("app_base_url", &self.app_base_url)
      .field("paystack_configured", &self.paystack_secret_key.is_some())
      .field("courier_guy_configured", &self.courier_guy_api_key.is_some())
      .field("fastway_configured", &self.fastway_api_key.is_some())
      .field("brevo_configured", &self.brevo_api_key.is_some())
      .field("email_sender", &self.email_sender)
      .field("commit_sweep_interval", &self.commit_sweep_interval)
      .field("run_migrations", &self.run_migrations)
      .finish()
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();
    Self::from_env_only()
  }

  /// Reads the process environment without loading `.env`.
  pub fn from_env_only() -> Result<Self> {
    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = get_env("SERVER_PORT")
      .unwrap_or_else(|_| "8080".to_string())
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
    let database_url = get_env("DATABASE_URL")?;
    let app_base_url = get_env("APP_BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port));

    let paystack_secret_key = optional_key("PAYSTACK_SECRET_KEY", Some("sk_"));
    let paystack_base_url = get_env("PAYSTACK_BASE_URL").unwrap_or_else(|_| DEFAULT_PAYSTACK_BASE_URL.to_string());

    let courier_guy_api_key = optional_key("COURIER_GUY_API_KEY", None);
    let courier_guy_base_url =
      get_env("COURIER_GUY_BASE_URL").unwrap_or_else(|_| DEFAULT_COURIER_GUY_BASE_URL.to_string());
    let fastway_api_key = optional_key("FASTWAY_API_KEY", None);
    let fastway_base_url = get_env("FASTWAY_BASE_URL").unwrap_or_else(|_| DEFAULT_FASTWAY_BASE_URL.to_string());

    let brevo_api_key = optional_key("BREVO_API_KEY", Some("xkeysib-"));
    let brevo_base_url = get_env("BREVO_BASE_URL").unwrap_or_else(|_| DEFAULT_BREVO_BASE_URL.to_string());
    let email_sender = get_env("EMAIL_SENDER").unwrap_or_else(|_| "noreply@rebookedsolutions.co.za".to_string());

    let commit_sweep_interval = get_env("COMMIT_SWEEP_INTERVAL_SECS")
      .unwrap_or_else(|_| "300".to_string())
      .parse::<u64>()
      .map(Duration::from_secs)
      .map_err(|e| AppError::Config(format!("Invalid COMMIT_SWEEP_INTERVAL_SECS: {}", e)))?;
    if commit_sweep_interval.is_zero() {
      return Err(AppError::Config("COMMIT_SWEEP_INTERVAL_SECS must be greater than zero".to_string()));
    }

    let run_migrations = get_env("RUN_MIGRATIONS")
      .unwrap_or_else(|_| "false".to_string())
      .parse::<bool>()
      .map_err(|e| AppError::Config(format!("Invalid RUN_MIGRATIONS value: {}", e)))?;

    let config = Self {
      server_host,
      server_port,
      database_url,
      app_base_url,
      paystack_secret_key,
      paystack_base_url,
      courier_guy_api_key,
      courier_guy_base_url,
      fastway_api_key,
      fastway_base_url,
      brevo_api_key,
      brevo_base_url,
      email_sender,
      commit_sweep_interval,
      run_migrations,
    };
    tracing::info!(config = ?config, "Application configuration loaded successfully.");
    Ok(config)
  }

  /// Where the gateway sends the buyer after checkout.
  pub fn payment_callback_url(&self) -> String {
    format!("{}/payment/callback", self.app_base_url.trim_end_matches('/'))
  }
}

/// Reads an API key, treating blank values and values without the expected
/// prefix as absent.
fn optional_key(var_name: &str, required_prefix: Option<&str>) -> Option<String> {
  let value = env::var(var_name).ok()?.trim().to_string();
  if value.is_empty() {
    return None;
  }
  match required_prefix {
    Some(prefix) if !value.starts_with(prefix) => {
      tracing::warn!(variable = var_name, expected_prefix = prefix, "Ignoring API key with unexpected prefix.");
      None
    }
    _ => Some(value),
  }
}
