// src/branch/arm.rs

use crate::core::context::FlowContext;
use crate::core::control::{FlowOutcome, StepControl};
use crate::error::FlowError;
use crate::flow::Flow;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

pub(crate) type Condition<TData> = Arc<dyn Fn(&TData) -> bool + Send + Sync + 'static>;
pub(crate) type Extractor<TData, SData> =
  Arc<dyn Fn(&FlowContext<TData>) -> anyhow::Result<FlowContext<SData>> + Send + Sync + 'static>;

/// One arm of a branch step with its sub-context type erased.
#[async_trait]
pub(crate) trait AnyBranchArm<TData, Err>: Send + Sync
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn label(&self) -> &str;

  fn matches(&self, data: &TData) -> bool;

  async fn run(&self, ctx: FlowContext<TData>) -> Result<StepControl, Err>;
}

pub(crate) struct BranchArm<TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) step_name: String,
  pub(crate) label: String,
  pub(crate) condition: Condition<TData>,
  pub(crate) extract: Extractor<TData, SData>,
  pub(crate) sub_flow: Arc<Flow<SData, Err>>,
}

#[async_trait]
impl<TData, SData, Err> AnyBranchArm<TData, Err> for BranchArm<TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn label(&self) -> &str {
    &self.label
  }

  fn matches(&self, data: &TData) -> bool {
    (self.condition)(data)
  }

  #[instrument(
    name = "branch_arm",
    skip_all,
    fields(step_name = %self.step_name, arm = %self.label, sub_flow = %self.sub_flow.name())
  )]
  async fn run(&self, ctx: FlowContext<TData>) -> Result<StepControl, Err> {
    let sub_ctx = (self.extract)(&ctx).map_err(|source| {
      Err::from(FlowError::BranchExtraction {
        step_name: self.step_name.clone(),
        source,
      })
    })?;

    match self.sub_flow.run(sub_ctx).await? {
      FlowOutcome::Completed => Ok(StepControl::Continue),
      FlowOutcome::Halted => {
        debug!("Sub-flow halted, halting parent flow.");
        Ok(StepControl::Halt)
      }
    }
  }
}
