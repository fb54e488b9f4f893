// server/src/pipelines/order_cancel.rs

//! Cancels an order on behalf of the buyer, the seller (decline) or the
//! commit-deadline sweep. The order is claimed as cancelled before any money
//! moves; a refund the gateway has not confirmed stays `pending` on the order
//! and is settled by `settle_refund` on a later sweep.

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use rebooked_flow::{Flow, FlowContext, FlowOutcome, FlowRegistry, StepControl, StepDef};

use crate::errors::{AppError, Result as AppResult};
use crate::models::{
  CancellationActor, NewNotification, NotificationKind, Order, OrderStatus, OrderUpdate, RefundStatus,
};
use crate::pipelines::common_steps::{missing, notify_many};
use crate::pipelines::contexts::CancelOrderCtxData;
use crate::services::paystack::RefundReceipt;
use crate::state::AppState;

pub fn register_cancel_order_flow(registry: &FlowRegistry<AppError>) {
  let mut flow = Flow::<CancelOrderCtxData, AppError>::new(
    "cancel_order",
    vec![
      StepDef::required("load_order_for_actor"),
      StepDef::required("check_cancellable"),
      StepDef::required("claim_cancellation"),
      StepDef::required("refund_payment").skip_when(|d: &CancelOrderCtxData| !d.needs_refund()),
      StepDef::optional("notify_parties"),
    ],
  );

  flow.on("load_order_for_actor", |ctx: FlowContext<CancelOrderCtxData>| async move {
    let (store, order_id, actor) = ctx.with(|d| (d.app_state.store.clone(), d.order_id, d.actor));
    let order = store
      .get_order(order_id)
      .await?
      .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
    if !actor.owns(&order) {
      return Err(AppError::Forbidden("You are not allowed to cancel this order".to_string()));
    }
    ctx.update(|d| {
      d.previous_status = Some(order.status);
      d.order = Some(order);
    });
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("check_cancellable", |ctx: FlowContext<CancelOrderCtxData>| async move {
    let (actor, status) = ctx.with(|d| (d.actor, d.previous_status));
    let status = status.ok_or_else(|| missing("previous_status"))?;
    if status.is_terminal() {
      return Err(AppError::Conflict(format!("Order is already {}", status)));
    }
    if !actor.may_cancel_in(status) {
      return Err(AppError::Conflict(format!(
        "An order that is {} can no longer be cancelled this way",
        status
      )));
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  // Only the caller whose compare-and-set wins may refund.
  flow.on("claim_cancellation", |ctx: FlowContext<CancelOrderCtxData>| async move {
    let (store, order, previous, reason, money_taken) = ctx.with(|d| {
      (
        d.app_state.store.clone(),
        d.order.clone(),
        d.previous_status,
        d.reason.clone().unwrap_or_else(|| d.actor.default_reason().to_string()),
        d.needs_refund(),
      )
    });
    let order = order.ok_or_else(|| missing("order"))?;
    let previous = previous.ok_or_else(|| missing("previous_status"))?;

    let mut update = OrderUpdate::to(OrderStatus::Cancelled).with_reason(reason);
    if money_taken {
      update = update.with_refund_pending();
    }
    let cancelled = store
      .transition_order(order.id, previous, &update)
      .await?
      .ok_or_else(|| AppError::Conflict("Order changed while cancelling; please refresh".to_string()))?;
    if money_taken {
      store.set_book_sold(order.book_id, false).await?;
    }
    info!(order_id = %order.id, from = %previous, "Order cancelled.");
    ctx.write().order = Some(cancelled);
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("refund_payment", |ctx: FlowContext<CancelOrderCtxData>| async move {
    let (app_state, order) = ctx.with(|d| (d.app_state.clone(), d.order.clone()));
    let order = order.ok_or_else(|| missing("order"))?;
    let refund = settle_refund(&app_state, &order).await?;
    ctx.update(|d| {
      if refund.is_some() {
        if let Some(stored) = d.order.as_mut() {
          stored.refund_status = Some(RefundStatus::Refunded);
        }
      }
      d.refund = refund;
    });
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("notify_parties", |ctx: FlowContext<CancelOrderCtxData>| async move {
    let (app_state, order, actor) = ctx.with(|d| (d.app_state.clone(), d.order.clone(), d.actor));
    let order = order.ok_or_else(|| missing("order"))?;
    notify_many(&app_state, cancellation_notifications(&order, actor)).await?;
    Ok::<_, AppError>(StepControl::Continue)
  });

  registry.register(flow);
}

/// Asks the gateway to refund a cancelled order and records the outcome.
/// `None` means the gateway call failed and the order stays `pending` for the
/// next sweep. A transaction the gateway reports as already reversed counts as
/// refunded, so retrying after a lost acknowledgement is safe.
#[instrument(name = "order::settle_refund", skip(app_state, order), fields(order_id = %order.id))]
pub async fn settle_refund(app_state: &AppState, order: &Order) -> AppResult<Option<RefundReceipt>> {
  let reference = &order.payment_reference;
  let receipt = match app_state.gateway.refund(reference, None).await {
    Ok(receipt) => receipt,
    Err(e) if e.is_already_refunded() => {
      info!(%reference, "Transaction already reversed at the gateway.");
      RefundReceipt {
        reference: reference.clone(),
        status: "reversed".to_string(),
        amount_cents: None,
      }
    }
    Err(e) => {
      warn!(%reference, error = %e, "Refund failed; will retry on the next sweep.");
      return Ok(None);
    }
  };
  app_state.store.set_refund_status(order.id, RefundStatus::Refunded).await?;
  info!(%reference, status = %receipt.status, "Refund settled.");
  Ok(Some(receipt))
}

fn cancellation_notifications(order: &Order, actor: CancellationActor) -> Vec<NewNotification> {
  let reason = order.cancellation_reason.as_deref().unwrap_or("Order cancelled");
  let reference = &order.payment_reference;
  let buyer_message = match order.refund_status {
    Some(RefundStatus::Refunded) => format!(
      "Order {}: {}. A full refund has been issued to your original payment method.",
      reference, reason
    ),
    Some(RefundStatus::Pending) => format!(
      "Order {}: {}. Your refund is being processed and will reach your original payment method shortly.",
      reference, reason
    ),
    None => format!("Order {}: {}.", reference, reason),
  };
  let to_buyer = NewNotification::new(order.buyer_id, NotificationKind::Warning, "Order cancelled", buyer_message);
  let to_seller = NewNotification::new(
    order.seller_id,
    NotificationKind::Warning,
    "Order cancelled",
    format!("Order {}: {}. Your book is available for sale again.", reference, reason),
  );
  match actor {
    CancellationActor::Buyer(_) => vec![to_seller],
    CancellationActor::Seller(_) => vec![to_buyer],
    CancellationActor::System => vec![to_buyer, to_seller],
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledOrder {
  pub order: Order,
  pub refund: Option<RefundReceipt>,
  /// The buyer was charged but the gateway has not confirmed the refund yet.
  pub refund_pending: bool,
}

#[instrument(name = "flow::cancel_order", skip(app_state, reason))]
pub async fn cancel_order(
  app_state: &AppState,
  order_id: Uuid,
  actor: CancellationActor,
  reason: Option<String>,
) -> AppResult<CancelledOrder> {
  let ctx = FlowContext::new(CancelOrderCtxData {
    app_state: app_state.clone(),
    order_id,
    actor,
    reason: reason.filter(|r| !r.trim().is_empty()),
    order: None,
    previous_status: None,
    refund: None,
  });

  match app_state.flows.run(ctx.clone()).await? {
    FlowOutcome::Completed => {
      let (order, refund) = ctx.with(|d| (d.order.clone(), d.refund.clone()));
      let order = order.ok_or_else(|| missing("order"))?;
      Ok(CancelledOrder {
        refund_pending: order.refund_status == Some(RefundStatus::Pending),
        order,
        refund,
      })
    }
    FlowOutcome::Halted => Err(AppError::FlowHalted),
  }
}
