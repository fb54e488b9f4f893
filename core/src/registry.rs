// src/registry.rs

//! `FlowRegistry<E>`: flows keyed by the type of data they run on.

use crate::core::context::FlowContext;
use crate::core::control::FlowOutcome;
use crate::error::FlowError;
use crate::flow::Flow;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, instrument};

#[async_trait]
trait ErasedFlow<AppErr>: Send + Sync
where
  AppErr: std::error::Error + Send + Sync + 'static,
{
  fn name(&self) -> &str;

  /// `ctx` must hold a `FlowContext<TData>` for the wrapped flow's `TData`.
  async fn run_erased(&self, ctx: Box<dyn Any + Send>) -> Result<FlowOutcome, AppErr>;
}

struct RegisteredFlow<TData, FlowErr, AppErr>
where
  TData: 'static + Send + Sync,
  FlowErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
  AppErr: std::error::Error + From<FlowErr> + From<FlowError> + Send + Sync + 'static,
{
  flow: Flow<TData, FlowErr>,
  _app_err: PhantomData<fn() -> AppErr>,
}

#[async_trait]
impl<TData, FlowErr, AppErr> ErasedFlow<AppErr> for RegisteredFlow<TData, FlowErr, AppErr>
where
  TData: 'static + Send + Sync,
  FlowErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
  AppErr: std::error::Error + From<FlowErr> + From<FlowError> + Send + Sync + 'static,
{
  fn name(&self) -> &str {
    self.flow.name()
  }

  async fn run_erased(&self, ctx: Box<dyn Any + Send>) -> Result<FlowOutcome, AppErr> {
    let typed_ctx = match ctx.downcast::<FlowContext<TData>>() {
      Ok(boxed) => *boxed,
      Err(_) => {
        let expected_type = std::any::type_name::<FlowContext<TData>>().to_string();
        error!(%expected_type, "Context type mismatch at registry dispatch.");
        return Err(<AppErr as From<FlowError>>::from(FlowError::TypeMismatch { expected_type }));
      }
    };
    self
      .flow
      .run(typed_ctx)
      .await
      .map_err(|e| <AppErr as From<FlowErr>>::from(e))
  }
}

/// Registry of flows, one per context data type.
///
/// `AppErr` is what `run` returns: it must absorb both engine errors and every
/// registered flow's own error type.
pub struct FlowRegistry<AppErr = FlowError>
where
  AppErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  flows: RwLock<HashMap<TypeId, Arc<dyn ErasedFlow<AppErr>>>>,
}

impl<AppErr> FlowRegistry<AppErr>
where
  AppErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      flows: RwLock::new(HashMap::new()),
    }
  }

  /// Registers `flow` for its context type, replacing any earlier flow for that type.
  pub fn register<TData, FlowErr>(&self, flow: Flow<TData, FlowErr>)
  where
    TData: 'static + Send + Sync,
    FlowErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
    AppErr: From<FlowErr>,
  {
    debug!(flow = %flow.name(), context_type = %std::any::type_name::<TData>(), "Registering flow.");
    let entry = RegisteredFlow::<TData, FlowErr, AppErr> {
      flow,
      _app_err: PhantomData,
    };
    self.flows.write().insert(TypeId::of::<TData>(), Arc::new(entry));
  }

  pub fn is_registered<TData: 'static>(&self) -> bool {
    self.flows.read().contains_key(&TypeId::of::<TData>())
  }

  /// Names of all registered flows, sorted.
  pub fn flow_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.flows.read().values().map(|f| f.name().to_string()).collect();
    names.sort();
    names
  }

  /// Runs the flow registered for `TData`.
  #[instrument(name = "FlowRegistry::run", skip_all, fields(context_type = %std::any::type_name::<TData>()))]
  pub async fn run<TData>(&self, ctx: FlowContext<TData>) -> Result<FlowOutcome, AppErr>
  where
    TData: 'static + Send + Sync,
  {
    let entry = {
      let flows = self.flows.read();
      flows.get(&TypeId::of::<TData>()).cloned()
    };
    let entry = entry.ok_or_else(|| {
      let type_name = std::any::type_name::<TData>().to_string();
      error!(%type_name, "No flow registered for context type.");
      AppErr::from(FlowError::NotRegistered { type_name })
    })?;

    entry.run_erased(Box::new(ctx)).await
  }
}

impl<AppErr> Default for FlowRegistry<AppErr>
where
  AppErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}
