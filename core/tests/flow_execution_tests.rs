// tests/flow_execution_tests.rs
mod common;

use common::*;
use rebooked_flow::{Flow, FlowContext, FlowError, FlowOutcome, StepControl, StepDef};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_flow_runs_steps_in_order() {
  setup_tracing();
  let mut flow = Flow::<OrderCtx, TestError>::new(
    "ordered",
    vec![
      StepDef::required("validate"),
      StepDef::required("reserve"),
      StepDef::required("charge"),
    ],
  );
  flow.on("validate", recording_handler("validate"));
  flow.on("reserve", recording_handler("reserve"));
  flow.on("charge", recording_handler("charge"));

  let ctx = FlowContext::new(OrderCtx::default());
  let outcome = flow.run(ctx.clone()).await.unwrap();

  assert_eq!(outcome, FlowOutcome::Completed);
  assert_eq!(ctx.read().steps_executed, vec!["validate", "reserve", "charge"]);
}

#[tokio::test]
#[serial]
async fn test_halt_stops_remaining_steps() {
  setup_tracing();
  let mut flow = Flow::<OrderCtx, TestError>::new(
    "halting",
    vec![
      StepDef::required("load_order"),
      StepDef::required("already_paid"),
      StepDef::required("charge"),
    ],
  );
  flow.on("load_order", recording_handler("load_order"));
  flow.on("already_paid", recording_handler("already_paid"));
  flow.on("charge", recording_handler("charge"));

  let ctx = FlowContext::new(OrderCtx {
    halt_at: Some("already_paid".to_string()),
    ..Default::default()
  });
  let outcome = flow.run(ctx.clone()).await.unwrap();

  assert_eq!(outcome, FlowOutcome::Halted);
  assert_eq!(ctx.read().steps_executed, vec!["load_order", "already_paid"]);
}

#[tokio::test]
#[serial]
async fn test_required_step_error_aborts_flow() {
  setup_tracing();
  let mut flow = Flow::<OrderCtx, TestError>::new(
    "failing",
    vec![
      StepDef::required("validate"),
      StepDef::required("charge"),
      StepDef::required("notify"),
    ],
  );
  flow.on("validate", recording_handler("validate"));
  flow.on("charge", failing_handler("charge", "card declined"));
  flow.on("notify", recording_handler("notify"));

  let ctx = FlowContext::new(OrderCtx::default());
  let result = flow.run(ctx.clone()).await;

  assert_eq!(result, Err(TestError::Handler("card declined".to_string())));
  assert_eq!(ctx.read().steps_executed, vec!["validate", "charge"]);
}

#[tokio::test]
#[serial]
async fn test_optional_step_error_is_swallowed() {
  setup_tracing();
  let mut flow = Flow::<OrderCtx, TestError>::new(
    "optional_failure",
    vec![
      StepDef::required("mark_paid"),
      StepDef::optional("send_email"),
      StepDef::required("finish"),
    ],
  );
  flow.on("mark_paid", recording_handler("mark_paid"));
  flow.on("send_email", failing_handler("send_email", "mail server down"));
  flow.on("finish", recording_handler("finish"));

  let ctx = FlowContext::new(OrderCtx::default());
  let outcome = flow.run(ctx.clone()).await.unwrap();

  assert_eq!(outcome, FlowOutcome::Completed);
  assert_eq!(ctx.read().steps_executed, vec!["mark_paid", "send_email", "finish"]);
}

#[tokio::test]
#[serial]
async fn test_skip_condition_skips_step() {
  setup_tracing();
  let mut flow = Flow::<OrderCtx, TestError>::new(
    "skipping",
    vec![
      StepDef::required("load_order"),
      StepDef::required("refund").skip_when(|order: &OrderCtx| order.amount_cents == 0),
      StepDef::required("cancel"),
    ],
  );
  flow.on("load_order", recording_handler("load_order"));
  flow.on("refund", recording_handler("refund"));
  flow.on("cancel", recording_handler("cancel"));

  let ctx = FlowContext::new(OrderCtx::default());
  flow.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().steps_executed, vec!["load_order", "cancel"]);

  let paid_ctx = FlowContext::new(OrderCtx {
    amount_cents: 12_000,
    ..Default::default()
  });
  flow.run(paid_ctx.clone()).await.unwrap();
  assert_eq!(paid_ctx.read().steps_executed, vec!["load_order", "refund", "cancel"]);
}

#[tokio::test]
#[serial]
async fn test_required_step_without_handlers_fails() {
  setup_tracing();
  let flow = Flow::<OrderCtx, TestError>::new("unwired", vec![StepDef::required("charge")]);

  let result = flow.run(FlowContext::new(OrderCtx::default())).await;
  match result {
    Err(TestError::Flow(s)) => {
      assert!(s.contains("HandlerMissing"));
      assert!(s.contains("charge"));
    }
    other => panic!("expected HandlerMissing, got {other:?}"),
  }
}

#[tokio::test]
#[serial]
async fn test_optional_step_without_handlers_is_skipped() {
  setup_tracing();
  let flow = Flow::<OrderCtx, TestError>::new("empty_optional", vec![StepDef::optional("notify")]);
  let outcome = flow.run(FlowContext::new(OrderCtx::default())).await.unwrap();
  assert_eq!(outcome, FlowOutcome::Completed);
}

#[tokio::test]
#[serial]
async fn test_before_on_after_order() {
  setup_tracing();
  let mut flow = Flow::<OrderCtx, TestError>::new("phases", vec![StepDef::required("charge")]);
  flow.after("charge", recording_handler("after_charge"));
  flow.on("charge", recording_handler("charge"));
  flow.before("charge", recording_handler("before_charge"));

  let ctx = FlowContext::new(OrderCtx::default());
  flow.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().steps_executed, vec!["before_charge", "charge", "after_charge"]);
}

#[tokio::test]
#[serial]
async fn test_named_async_fn_handlers() {
  setup_tracing();

  async fn price_order(ctx: FlowContext<OrderCtx>) -> Result<StepControl, TestError> {
    tokio::task::yield_now().await;
    ctx.write().amount_cents = 35_000;
    Ok(StepControl::Continue)
  }

  async fn reject_free_orders(ctx: FlowContext<OrderCtx>) -> Result<StepControl, FlowError> {
    let amount = ctx.read().amount_cents;
    if amount == 0 {
      return Err(FlowError::HandlerMissing {
        step_name: "price".to_string(),
      });
    }
    Ok(StepControl::Continue)
  }

  let mut flow = Flow::<OrderCtx, TestError>::new("named_fns", vec![StepDef::required("price")]);
  flow.on("price", price_order).after("price", reject_free_orders);

  let ctx = FlowContext::new(OrderCtx::default());
  assert_eq!(flow.run(ctx.clone()).await.unwrap(), FlowOutcome::Completed);
  assert_eq!(ctx.read().amount_cents, 35_000);
}

#[test]
#[should_panic(expected = "is not defined in flow")]
fn test_registering_handler_for_unknown_step_panics() {
  let mut flow = Flow::<OrderCtx, TestError>::new("typo", vec![StepDef::required("charge")]);
  flow.on("chrage", recording_handler("chrage"));
}

#[test]
#[should_panic(expected = "declares step 'charge' twice")]
fn test_duplicate_step_names_panic() {
  let _ = Flow::<OrderCtx, TestError>::new(
    "dupes",
    vec![StepDef::required("charge"), StepDef::optional("charge")],
  );
}
