// server/src/pipelines/payment_verify.rs

//! Confirms a checkout with the gateway. Safe to call any number of times for
//! one reference: only the first successful verification moves the order.
//! A payment that arrives after another buyer already paid for the same book
//! is cancelled and refunded instead.

use chrono::Utc;
use tracing::{info, instrument, warn};

use rebooked_flow::{Flow, FlowContext, FlowOutcome, FlowRegistry, StepControl, StepDef};

use crate::errors::{AppError, Result as AppResult};
use crate::models::{
  commit_deadline_from, NewNotification, NewPayment, NotificationKind, Order, OrderStatus, OrderUpdate,
};
use crate::pipelines::common_steps::{email_user, missing, notify_many};
use crate::pipelines::contexts::VerifyPaymentCtxData;
use crate::pipelines::order_cancel::settle_refund;
use crate::services::email;
use crate::services::paystack::CURRENCY;
use crate::state::AppState;

pub const SOLD_ELSEWHERE_REASON: &str = "Book was sold to another buyer";

pub fn register_verify_payment_flow(registry: &FlowRegistry<AppError>) {
  let mut flow = Flow::<VerifyPaymentCtxData, AppError>::new(
    "verify_payment",
    vec![
      StepDef::required("load_order"),
      StepDef::required("check_already_processed"),
      StepDef::required("verify_with_gateway"),
      StepDef::required("record_payment"),
      StepDef::required("mark_order_paid"),
      StepDef::optional("notify_parties"),
      StepDef::optional("email_parties"),
    ],
  );

  flow.on("load_order", |ctx: FlowContext<VerifyPaymentCtxData>| async move {
    let (store, reference) = ctx.with(|d| (d.app_state.store.clone(), d.reference.clone()));
    let order = store
      .get_order_by_reference(&reference)
      .await?
      .ok_or_else(|| AppError::NotFound(format!("No order for payment reference {}", reference)))?;
    ctx.write().order = Some(order);
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("check_already_processed", |ctx: FlowContext<VerifyPaymentCtxData>| async move {
    let status = ctx.with(|d| d.order.as_ref().map(|o| o.status));
    let status = status.ok_or_else(|| missing("order"))?;
    if status != OrderStatus::Pending {
      info!(%status, "Order already processed; nothing to do.");
      ctx.write().already_processed = true;
      return Ok(StepControl::Halt);
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("verify_with_gateway", |ctx: FlowContext<VerifyPaymentCtxData>| async move {
    let (gateway, reference, expected_cents) = ctx.with(|d| {
      (
        d.app_state.gateway.clone(),
        d.reference.clone(),
        d.order.as_ref().map(|o| o.amount_cents),
      )
    });
    let expected_cents = expected_cents.ok_or_else(|| missing("order"))?;

    let transaction = gateway.verify_transaction(&reference).await?;
    if transaction.reference != reference {
      return Err(AppError::Payment(format!(
        "Gateway returned reference {} for {}",
        transaction.reference, reference
      )));
    }

    let successful = transaction.is_successful();
    if successful && transaction.amount_cents != expected_cents {
      warn!(expected_cents, paid_cents = transaction.amount_cents, "Paid amount does not match order.");
      return Err(AppError::Payment(format!(
        "Payment amount {} does not match order amount {}",
        transaction.amount_cents, expected_cents
      )));
    }
    let status = transaction.status.clone();
    ctx.write().transaction = Some(transaction);
    if !successful {
      info!(%status, "Transaction not successful; order stays pending.");
      return Ok(StepControl::Halt);
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("record_payment", |ctx: FlowContext<VerifyPaymentCtxData>| async move {
    let (store, new_payment) = {
      let guard = ctx.read();
      let order = guard.order.as_ref().ok_or_else(|| missing("order"))?;
      let tx = guard.transaction.as_ref().ok_or_else(|| missing("transaction"))?;
      (
        guard.app_state.store.clone(),
        NewPayment {
          order_id: order.id,
          reference: tx.reference.clone(),
          amount_cents: tx.amount_cents,
          currency: if tx.currency.is_empty() {
            CURRENCY.to_string()
          } else {
            tx.currency.clone()
          },
          status: tx.status.clone(),
          gateway_transaction_id: Some(tx.gateway_id),
          channel: tx.channel.clone(),
          split: order.split(),
          paid_at: Some(tx.paid_at.unwrap_or_else(Utc::now)),
        },
      )
    };
    let payment = store.upsert_payment(&new_payment).await?;
    ctx.write().payment = Some(payment);
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("mark_order_paid", |ctx: FlowContext<VerifyPaymentCtxData>| async move {
    let (app_state, order_id, book_id, paid_at) = {
      let guard = ctx.read();
      let order = guard.order.as_ref().ok_or_else(|| missing("order"))?;
      let paid_at = guard.payment.as_ref().and_then(|p| p.paid_at).unwrap_or_else(Utc::now);
      (guard.app_state.clone(), order.id, order.book_id, paid_at)
    };
    let store = app_state.store.clone();

    let mut update = OrderUpdate::to(OrderStatus::Paid).with_commit_deadline(commit_deadline_from(paid_at));
    update.at = paid_at;
    let Some(paid) = store.transition_order(order_id, OrderStatus::Pending, &update).await? else {
      // A concurrent verification won the race.
      info!(%order_id, "Order left pending concurrently; skipping side effects.");
      ctx.write().already_processed = true;
      return Ok(StepControl::Halt);
    };

    if !store.claim_book(book_id).await? {
      warn!(%order_id, %book_id, "Book already sold to another buyer; refunding this payment.");
      let update = OrderUpdate::to(OrderStatus::Cancelled)
        .with_reason(SOLD_ELSEWHERE_REASON)
        .with_refund_pending();
      let cancelled = store
        .transition_order(order_id, OrderStatus::Paid, &update)
        .await?
        .ok_or_else(|| AppError::Conflict("Order changed while refunding a duplicate sale".to_string()))?;
      let refund = settle_refund(&app_state, &cancelled).await?;
      if let Err(e) = notify_many(&app_state, vec![sold_elsewhere_notification(&cancelled, refund.is_some())]).await {
        warn!(error = %e, "Failed to notify buyer about the refunded payment.");
      }
      ctx.update(|d| {
        d.order = Some(cancelled);
        d.sold_elsewhere = true;
        d.refund = refund;
      });
      return Ok(StepControl::Halt);
    }

    info!(%order_id, deadline = ?paid.commit_deadline, "Order marked paid.");
    ctx.write().order = Some(paid);
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("notify_parties", |ctx: FlowContext<VerifyPaymentCtxData>| async move {
    let (app_state, order) = ctx.with(|d| (d.app_state.clone(), d.order.clone()));
    let order = order.ok_or_else(|| missing("order"))?;
    let sent = notify_many(&app_state, payment_notifications(&order)).await?;
    ctx.write().notifications_sent = sent;
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("email_parties", |ctx: FlowContext<VerifyPaymentCtxData>| async move {
    let (app_state, order) = ctx.with(|d| (d.app_state.clone(), d.order.clone()));
    let order = order.ok_or_else(|| missing("order"))?;
    let book = app_state
      .store
      .get_book(order.book_id)
      .await?
      .ok_or_else(|| AppError::NotFound(format!("Book {} not found", order.book_id)))?;

    let mut sent = 0;
    if email_user(&app_state, order.buyer_id, |to| email::purchase_confirmation(to, &order, &book)).await? {
      sent += 1;
    }
    if email_user(&app_state, order.seller_id, |to| email::new_sale(to, &order, &book)).await? {
      sent += 1;
    }
    ctx.write().emails_sent = sent;
    Ok::<_, AppError>(StepControl::Continue)
  });

  registry.register(flow);
}

fn payment_notifications(order: &Order) -> Vec<NewNotification> {
  vec![
    NewNotification::new(
      order.buyer_id,
      NotificationKind::Success,
      "Payment successful",
      format!(
        "Your payment of {} for order {} was received. The seller has 48 hours to confirm your order.",
        email::rands(order.amount_cents),
        order.payment_reference
      ),
    ),
    NewNotification::new(
      order.seller_id,
      NotificationKind::Info,
      "New order received",
      format!(
        "A buyer has paid for order {}. Please commit to the order within 48 hours.",
        order.payment_reference
      ),
    ),
  ]
}

fn sold_elsewhere_notification(order: &Order, refunded: bool) -> NewNotification {
  let refund = if refunded {
    "Your payment has been refunded."
  } else {
    "Your refund is being processed."
  };
  NewNotification::new(
    order.buyer_id,
    NotificationKind::Warning,
    "Book no longer available",
    format!(
      "Order {}: the book was sold to another buyer before your payment completed. {}",
      order.payment_reference, refund
    ),
  )
}

/// Verifies `reference` and returns the order as it stands afterwards.
/// Repeated calls for a processed reference return the order unchanged.
#[instrument(name = "flow::verify_payment", skip(app_state))]
pub async fn verify_payment(app_state: &AppState, reference: &str) -> AppResult<Order> {
  let ctx = FlowContext::new(VerifyPaymentCtxData {
    app_state: app_state.clone(),
    reference: reference.to_string(),
    order: None,
    already_processed: false,
    sold_elsewhere: false,
    refund: None,
    transaction: None,
    payment: None,
    notifications_sent: 0,
    emails_sent: 0,
  });

  let outcome = app_state.flows.run(ctx.clone()).await?;
  let data = ctx.snapshot();
  let order = data.order.ok_or_else(|| missing("order"))?;

  match outcome {
    FlowOutcome::Completed => Ok(order),
    FlowOutcome::Halted if data.sold_elsewhere => {
      let refund = if data.refund.is_some() {
        "Your payment has been refunded."
      } else {
        "Your refund is being processed."
      };
      Err(AppError::Conflict(format!(
        "This book was sold to another buyer. {}",
        refund
      )))
    }
    FlowOutcome::Halted if data.already_processed => {
      // Re-read so the caller sees the state the winning verification left.
      Ok(app_state.store.get_order(order.id).await?.unwrap_or(order))
    }
    FlowOutcome::Halted => {
      let status = data
        .transaction
        .map(|t| t.status)
        .unwrap_or_else(|| "unknown".to_string());
      Err(AppError::Payment(format!("Payment was not successful (status: {})", status)))
    }
  }
}
