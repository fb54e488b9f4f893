// tests/error_handling_tests.rs
mod common;

use common::*;
use rebooked_flow::{Flow, FlowContext, FlowError, FlowRegistry, StepControl, StepDef};
use serial_test::serial;

// A flow whose own error type is FlowError.
#[tokio::test]
#[serial]
async fn test_flow_with_flow_error_type() {
  setup_tracing();
  let mut flow = Flow::<OrderCtx, FlowError>::new("plain", vec![StepDef::required("fail")]);
  flow.on("fail", |_ctx: FlowContext<OrderCtx>| async move {
    Err::<StepControl, _>(FlowError::from(anyhow::anyhow!("courier api unreachable")))
  });

  match flow.run(FlowContext::new(OrderCtx::default())).await {
    Err(FlowError::Handler { source }) => assert_eq!(source.to_string(), "courier api unreachable"),
    other => panic!("expected FlowError::Handler, got {other:?}"),
  }
}

// Handler errors of the flow's type are converted into the registry's type.
#[tokio::test]
#[serial]
async fn test_registry_converts_flow_errors() {
  setup_tracing();
  let registry = FlowRegistry::<TestError>::new();
  let mut flow = Flow::<OrderCtx, TestError>::new("charge_only", vec![StepDef::required("charge")]);
  flow.on("charge", failing_handler("charge", "insufficient funds"));
  registry.register(flow);

  let result = registry.run(FlowContext::new(OrderCtx::default())).await;
  assert_eq!(result, Err(TestError::Handler("insufficient funds".to_string())));
}
