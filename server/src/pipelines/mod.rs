// server/src/pipelines/mod.rs

//! The marketplace's multi-step operations, each a flow registered by context type.

use rebooked_flow::FlowRegistry;

use crate::errors::AppError;

pub mod common_steps;
pub mod contexts;

pub mod order_cancel;
pub mod order_commit;
pub mod payment_init;
pub mod payment_verify;
pub mod subaccount;

/// Registers every flow. Called once while building `AppState`.
pub fn register_all_flows(registry: &FlowRegistry<AppError>) {
  payment_init::register_initialize_payment_flow(registry);
  payment_verify::register_verify_payment_flow(registry);
  order_commit::register_commit_order_flow(registry);
  order_cancel::register_cancel_order_flow(registry);
  subaccount::register_subaccount_flow(registry);
  tracing::info!(flows = ?registry.flow_names(), "All flows registered.");
}
