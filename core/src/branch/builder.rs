// src/branch/builder.rs

use crate::branch::arm::{AnyBranchArm, BranchArm};
use crate::core::context::FlowContext;
use crate::core::control::StepControl;
use crate::core::handler::Handler;
use crate::error::FlowError;
use crate::flow::definition::{Flow, Phase};
use std::sync::Arc;
use tracing::{debug, info};

impl<TData, Err> Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Turns `step_name` into a branch step. Arms are tried in the order they were added.
  pub fn branch(&mut self, step_name: &str) -> BranchBuilder<'_, TData, Err> {
    self.ensure_step_exists(step_name);
    BranchBuilder {
      flow: self,
      step_name: step_name.to_string(),
      arms: Vec::new(),
      otherwise: StepControl::Continue,
    }
  }
}

/// Collects the arms of a branch step; `finish()` installs it as the step's `on` handler.
pub struct BranchBuilder<'flow, TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  flow: &'flow mut Flow<TData, Err>,
  step_name: String,
  arms: Vec<Arc<dyn AnyBranchArm<TData, Err>>>,
  otherwise: StepControl,
}

impl<'flow, TData, Err> BranchBuilder<'flow, TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Adds an arm: when `condition` holds, `extract` builds the sub-context and `sub_flow` runs on it.
  pub fn when<SData>(
    mut self,
    label: impl Into<String>,
    condition: impl Fn(&TData) -> bool + Send + Sync + 'static,
    sub_flow: Arc<Flow<SData, Err>>,
    extract: impl Fn(&FlowContext<TData>) -> anyhow::Result<FlowContext<SData>> + Send + Sync + 'static,
  ) -> Self
  where
    SData: 'static + Send + Sync,
  {
    self.arms.push(Arc::new(BranchArm {
      step_name: self.step_name.clone(),
      label: label.into(),
      condition: Arc::new(condition),
      extract: Arc::new(extract),
      sub_flow,
    }));
    self
  }

  /// What the step returns when no arm matches. Defaults to `Continue`.
  pub fn otherwise(mut self, control: StepControl) -> Self {
    self.otherwise = control;
    self
  }

  pub fn finish(self) {
    let arms = Arc::new(self.arms);
    let otherwise = self.otherwise;
    let step_name = self.step_name.clone();
    let arm_count = arms.len();

    let handler: Handler<TData, Err> = Box::new(move |ctx: FlowContext<TData>| {
      let arms = Arc::clone(&arms);
      let step_name = step_name.clone();
      Box::pin(async move {
        let chosen = {
          let guard = ctx.read();
          arms.iter().find(|arm| arm.matches(&*guard)).cloned()
        };
        match chosen {
          Some(arm) => {
            debug!(step_name = %step_name, arm = arm.label(), "Branch arm selected.");
            arm.run(ctx).await
          }
          None => {
            debug!(step_name = %step_name, ?otherwise, "No branch arm matched.");
            Ok(otherwise)
          }
        }
      })
    });

    self.flow.push_handler(Phase::On, &self.step_name, handler);
    info!(step_name = %self.step_name, arms = arm_count, "Branch step installed.");
  }
}
