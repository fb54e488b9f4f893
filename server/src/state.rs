// server/src/state.rs

use sqlx::PgPool;
use std::sync::Arc;

use rebooked_flow::FlowRegistry;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::pipelines;
use crate::services::courier::{CourierDirectory, CourierGuyClient, FastwayClient};
use crate::services::email::{BrevoMailer, EmailSender};
use crate::services::health_cache::HealthCache;
use crate::services::notifications::{NotificationService, DEDUP_WINDOW};
use crate::services::paystack::{PaymentGateway, PaystackClient};
use crate::services::purchase_guard::PurchaseGuard;
use crate::store::{MarketplaceStore, PgStore};

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn MarketplaceStore>,
  pub gateway: Arc<dyn PaymentGateway>,
  pub couriers: CourierDirectory,
  pub mailer: Arc<dyn EmailSender>,
  pub notifications: Arc<NotificationService>,
  pub purchase_guard: Arc<PurchaseGuard>,
  pub flows: Arc<FlowRegistry<AppError>>,
  pub config: Arc<AppConfig>,
}

impl AppState {
  /// Wires the shared services together and registers every flow.
  pub fn new(
    config: Arc<AppConfig>,
    store: Arc<dyn MarketplaceStore>,
    gateway: Arc<dyn PaymentGateway>,
    couriers: CourierDirectory,
    mailer: Arc<dyn EmailSender>,
  ) -> Self {
    let flows = Arc::new(FlowRegistry::<AppError>::new());
    pipelines::register_all_flows(&flows);
    Self {
      notifications: Arc::new(NotificationService::new(store.clone(), DEDUP_WINDOW)),
      purchase_guard: Arc::new(PurchaseGuard::default()),
      store,
      gateway,
      couriers,
      mailer,
      flows,
      config,
    }
  }

  /// Production wiring: Postgres store, Paystack, both couriers and Brevo.
  pub fn from_config(config: Arc<AppConfig>, pool: PgPool) -> Result<Self> {
    let gateway = PaystackClient::new(config.paystack_secret_key.clone(), config.paystack_base_url.clone())?;
    if !gateway.is_configured() {
      tracing::warn!("PAYSTACK_SECRET_KEY not set; payment endpoints will fail until it is configured.");
    }

    let courier_health = Arc::new(HealthCache::default());
    let couriers = CourierDirectory::new()
      .with_provider(Arc::new(CourierGuyClient::new(
        config.courier_guy_api_key.clone(),
        config.courier_guy_base_url.clone(),
        courier_health.clone(),
      )?))
      .with_provider(Arc::new(FastwayClient::new(
        config.fastway_api_key.clone(),
        config.fastway_base_url.clone(),
        courier_health,
      )?));

    let mailer = BrevoMailer::new(
      config.brevo_api_key.clone(),
      config.brevo_base_url.clone(),
      config.email_sender.clone(),
    )?;

    Ok(Self::new(
      config,
      Arc::new(PgStore::new(pool)),
      Arc::new(gateway),
      couriers,
      Arc::new(mailer),
    ))
  }
}

#[cfg(test)]
pub(crate) mod test_support {
  use super::*;
  use crate::services::email::{EmailReceipt, MockEmailSender};
  use crate::services::paystack::MockPaymentGateway;
  use crate::store::memory::MemoryStore;
  use once_cell::sync::Lazy;
  use std::time::Duration;

  static TRACING_INIT: Lazy<()> = Lazy::new(|| {
    tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::new("rebooked=debug,rebooked_flow=debug"))
      .with_test_writer()
      .try_init()
      .ok();
  });

  pub fn test_config() -> AppConfig {
    AppConfig {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      database_url: "postgres://localhost/rebooked_test".to_string(),
      app_base_url: "https://rebooked.test".to_string(),
      paystack_secret_key: Some("sk_test_123".to_string()),
      paystack_base_url: "http://127.0.0.1:9".to_string(),
      courier_guy_api_key: None,
      courier_guy_base_url: "http://127.0.0.1:9".to_string(),
      fastway_api_key: None,
      fastway_base_url: "http://127.0.0.1:9".to_string(),
      brevo_api_key: None,
      brevo_base_url: "http://127.0.0.1:9".to_string(),
      email_sender: "noreply@rebooked.test".to_string(),
      commit_sweep_interval: Duration::from_secs(300),
      run_migrations: false,
    }
  }

  /// Unconfigured couriers, so every courier call returns its simulated response.
  pub fn simulated_couriers() -> CourierDirectory {
    let health = Arc::new(HealthCache::default());
    let base = "http://127.0.0.1:9".to_string();
    CourierDirectory::new()
      .with_provider(Arc::new(
        CourierGuyClient::new(None, base.clone(), health.clone()).expect("client"),
      ))
      .with_provider(Arc::new(FastwayClient::new(None, base, health).expect("client")))
  }

  pub fn accepting_mailer() -> MockEmailSender {
    let mut mailer = MockEmailSender::new();
    mailer.expect_send().returning(|_| {
      Ok(EmailReceipt {
        message_id: Some("msg-1".to_string()),
        simulated: false,
      })
    });
    mailer
  }

  pub fn state_with(store: Arc<MemoryStore>, gateway: MockPaymentGateway) -> AppState {
    Lazy::force(&TRACING_INIT);
    AppState::new(
      Arc::new(test_config()),
      store,
      Arc::new(gateway),
      simulated_couriers(),
      Arc::new(accepting_mailer()),
    )
  }
}
