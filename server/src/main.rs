// server/src/main.rs

use actix_web::{web as actix_data, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use rebooked::config::AppConfig;
use rebooked::jobs::spawn_commit_deadline_sweeper;
use rebooked::state::AppState;
use rebooked::web;

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE);
  // LOG_FORMAT=json for log shippers; human-readable otherwise.
  if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
    builder.json().init();
  } else {
    builder.init();
  }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
  tracing::error!(error = %err, "{}", context);
  io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
  init_tracing();
  tracing::info!("Starting ReBooked server...");

  let app_config = Arc::new(AppConfig::from_env().map_err(|e| startup_error("Failed to load configuration", e))?);
  tracing::info!(config = ?app_config, "Configuration loaded.");

  let db_pool = PgPoolOptions::new()
    .max_connections(10)
    .connect(&app_config.database_url)
    .await
    .map_err(|e| startup_error("Failed to connect to the database", e))?;
  tracing::info!("Connected to the database.");

  if app_config.run_migrations {
    sqlx::migrate!("./migrations")
      .run(&db_pool)
      .await
      .map_err(|e| startup_error("Failed to run migrations", e))?;
    tracing::info!("Migrations applied.");
  }

  let app_state = AppState::from_config(app_config.clone(), db_pool)
    .map_err(|e| startup_error("Failed to build application state", e))?;

  let sweeper = spawn_commit_deadline_sweeper(app_state.clone(), app_config.commit_sweep_interval);

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Binding server to {}...", server_address);

  let result = HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await;

  sweeper.abort();
  tracing::info!("Server stopped.");
  result
}
