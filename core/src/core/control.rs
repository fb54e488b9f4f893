// src/core/control.rs

//! Signals returned by handlers and the outcome of a whole flow run.

/// Returned by every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
  /// Keep going with the remaining handlers and steps.
  Continue,
  /// Stop immediately; no further handler of this or any later step runs.
  Halt,
}

/// Outcome of a flow run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
  /// Every step ran (or was skipped).
  Completed,
  /// A handler returned `StepControl::Halt`.
  Halted,
}

impl FlowOutcome {
  pub fn is_completed(&self) -> bool {
    matches!(self, FlowOutcome::Completed)
  }
}
