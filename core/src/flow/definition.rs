// src/flow/definition.rs

use crate::core::handler::Handler;
use crate::core::step::StepDef;
use crate::error::FlowError;
use std::collections::HashMap;

/// Which handler list of a step a handler belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
  Before,
  On,
  After,
}

impl Phase {
  pub(crate) fn label(&self) -> &'static str {
    match self {
      Phase::Before => "before",
      Phase::On => "on",
      Phase::After => "after",
    }
  }
}

/// An ordered list of named steps over the context data `TData`.
///
/// Handlers return `Result<_, Err>`; `Err` must absorb `FlowError` so engine-level
/// failures (missing handlers, branch extraction) surface through the same type.
pub struct Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) name: String,
  pub(crate) steps: Vec<StepDef<TData>>,
  pub(crate) before: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) on: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) after: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub fn new(name: impl Into<String>, steps: Vec<StepDef<TData>>) -> Self {
    let flow = Self {
      name: name.into(),
      steps: Vec::with_capacity(steps.len()),
      before: HashMap::new(),
      on: HashMap::new(),
      after: HashMap::new(),
    };
    steps.into_iter().fold(flow, |mut flow, step| {
      if flow.steps.iter().any(|s| s.name == step.name) {
        panic!("flow '{}' declares step '{}' twice", flow.name, step.name);
      }
      flow.steps.push(step);
      flow
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  /// Registering a handler for an undeclared step is a wiring bug, so it panics at setup time.
  pub(crate) fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!(
        "{}",
        FlowError::StepNotFound {
          flow: self.name.clone(),
          step_name: step_name.to_string(),
        }
      );
    }
  }

  pub(crate) fn handlers(&self, phase: Phase, step_name: &str) -> &[Handler<TData, Err>] {
    let map = match phase {
      Phase::Before => &self.before,
      Phase::On => &self.on,
      Phase::After => &self.after,
    };
    map.get(step_name).map(Vec::as_slice).unwrap_or(&[])
  }

  pub(crate) fn push_handler(&mut self, phase: Phase, step_name: &str, handler: Handler<TData, Err>) {
    self.ensure_step_exists(step_name);
    let map = match phase {
      Phase::Before => &mut self.before,
      Phase::On => &mut self.on,
      Phase::After => &mut self.after,
    };
    map.entry(step_name.to_string()).or_default().push(handler);
  }
}
