// src/core/handler.rs

use crate::core::context::FlowContext;
use crate::core::control::StepControl;
use std::future::Future;
use std::pin::Pin;

/// Boxed step handler.
///
/// A handler receives a clone of the flow's `FlowContext<TData>`, locks it as needed
/// (dropping guards before awaiting) and resolves to `Result<StepControl, Err>`.
pub type Handler<TData, Err> = Box<
  dyn Fn(FlowContext<TData>) -> Pin<Box<dyn Future<Output = Result<StepControl, Err>> + Send>>
    + Send
    + Sync,
>;
