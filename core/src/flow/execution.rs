// src/flow/execution.rs

//! `Flow::run()`: executes steps and their handlers in order.

use crate::core::context::FlowContext;
use crate::core::control::{FlowOutcome, StepControl};
use crate::core::step::StepDef;
use crate::error::FlowError;
use crate::flow::definition::{Flow, Phase};
use tracing::{debug, error, info, info_span, warn, Instrument};

const PHASES: [Phase; 3] = [Phase::Before, Phase::On, Phase::After];

impl<TData, Err> Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Executes the flow against `ctx`.
  ///
  /// Returns `Completed` when every step ran or was skipped and `Halted` when a handler
  /// asked to stop. A failing required step aborts the run with its error; a failing
  /// optional step is logged and the run moves on.
  pub async fn run(&self, ctx: FlowContext<TData>) -> Result<FlowOutcome, Err> {
    let span = info_span!(
      "flow_run",
      flow = %self.name,
      context_type = %std::any::type_name::<TData>(),
      num_steps = self.steps.len(),
    );
    self.run_steps(ctx).instrument(span).await
  }

  async fn run_steps(&self, ctx: FlowContext<TData>) -> Result<FlowOutcome, Err> {
    debug!("Flow execution starting.");

    for (step_idx, step) in self.steps.iter().enumerate() {
      let step_span = info_span!(
        "flow_step",
        step_name = %step.name,
        step_index = step_idx,
        optional = step.optional
      );

      match self.run_step(step, ctx.clone()).instrument(step_span).await {
        Ok(StepControl::Continue) => {}
        Ok(StepControl::Halt) => {
          info!(step_name = %step.name, "Flow halted by a handler.");
          return Ok(FlowOutcome::Halted);
        }
        Err(e) if step.optional => {
          warn!(step_name = %step.name, error = %e, "Optional step failed, continuing.");
        }
        Err(e) => {
          error!(step_name = %step.name, error = %e, "Step failed, aborting flow.");
          return Err(e);
        }
      }
    }

    debug!("Flow execution completed.");
    Ok(FlowOutcome::Completed)
  }

  async fn run_step(&self, step: &StepDef<TData>, ctx: FlowContext<TData>) -> Result<StepControl, Err> {
    if let Some(skip_if) = &step.skip_if {
      let skip_now = {
        let guard = ctx.read();
        skip_if(&*guard)
      };
      if skip_now {
        info!("Step skipped by its skip condition.");
        return Ok(StepControl::Continue);
      }
    }

    let has_handlers = PHASES.iter().any(|phase| !self.handlers(*phase, &step.name).is_empty());
    if !has_handlers {
      if step.optional {
        debug!("Optional step has no handlers, skipping.");
        return Ok(StepControl::Continue);
      }
      return Err(Err::from(FlowError::HandlerMissing {
        step_name: step.name.clone(),
      }));
    }

    for phase in PHASES {
      for (handler_idx, handler) in self.handlers(phase, &step.name).iter().enumerate() {
        if handler(ctx.clone()).await? == StepControl::Halt {
          debug!(phase = phase.label(), handler_index = handler_idx, "Handler returned Halt.");
          return Ok(StepControl::Halt);
        }
      }
    }
    Ok(StepControl::Continue)
  }
}
