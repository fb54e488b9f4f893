// src/lib.rs

//! rebooked-flow: the async step-flow engine behind the ReBooked marketplace service.
//!
//! A flow is an ordered list of named steps operating on one shared context:
//!  - Each step carries `before`/`on`/`after` handlers.
//!  - Handlers may halt the flow early (`StepControl::Halt`).
//!  - Steps can be optional or skipped by a condition on the context.
//!  - A step can branch into a sub-flow chosen by a condition (e.g. per courier).
//!  - `FlowRegistry` runs whichever flow was registered for a context type.

pub mod branch;
pub mod core;
pub mod error;
pub mod flow;
pub mod registry;

pub use crate::branch::BranchBuilder;
pub use crate::core::context::FlowContext;
pub use crate::core::control::{FlowOutcome, StepControl};
pub use crate::core::handler::Handler;
pub use crate::core::step::{SkipCondition, StepDef};
pub use crate::error::{FlowError, FlowResult};
pub use crate::flow::Flow;
pub use crate::registry::FlowRegistry;

/*
    Typical use:
    1. Define a context struct `MyCtx` holding the inputs and the outputs of the operation.
    2. Build a `Flow<MyCtx, MyErr>` from step definitions and register handlers with
       `.on()`, `.before()`, `.after()`; `MyErr` must be `From<FlowError>`.
    3. Optionally turn a step into a branch with `.branch("step")`.
    4. Register the flow in a `FlowRegistry<MyErr>` and call
       `registry.run(FlowContext::new(my_ctx)).await`.
*/
