// tests/common/mod.rs
#![allow(dead_code)]

use once_cell::sync::Lazy;
use rebooked_flow::{FlowContext, FlowError, Handler, StepControl};
use tracing::Level;

/// Stand-in for a checkout-style operation: records what ran and in which order.
#[derive(Clone, Debug, Default)]
pub struct OrderCtx {
  pub order_id: u32,
  pub amount_cents: i64,
  pub steps_executed: Vec<String>,
  pub halt_at: Option<String>,
  pub courier: Option<String>,
  pub tracking_number: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ShipmentCtx {
  pub order_id: u32,
  pub provider: String,
  pub tracking_number: Option<String>,
  pub halt: bool,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("flow engine error: {0}")]
  Flow(String),

  #[error("handler failed: {0}")]
  Handler(String),
}

impl From<FlowError> for TestError {
  fn from(err: FlowError) -> Self {
    TestError::Flow(format!("{err:?}"))
  }
}

pub fn recording_handler(step_name: &'static str) -> Handler<OrderCtx, TestError> {
  Box::new(move |ctx: FlowContext<OrderCtx>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.steps_executed.push(step_name.to_string());
      if guard.halt_at.as_deref() == Some(step_name) {
        return Ok(StepControl::Halt);
      }
      Ok(StepControl::Continue)
    })
  })
}

pub fn failing_handler(step_name: &'static str, message: &'static str) -> Handler<OrderCtx, TestError> {
  Box::new(move |ctx: FlowContext<OrderCtx>| {
    Box::pin(async move {
      ctx.write().steps_executed.push(step_name.to_string());
      Err(TestError::Handler(message.to_string()))
    })
  })
}

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
