// server/src/jobs/commit_deadline.rs

//! Cancels and refunds paid orders whose seller missed the commit deadline,
//! and retries refunds the gateway has not confirmed yet.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::Result;
use crate::models::CancellationActor;
use crate::pipelines::order_cancel::{cancel_order, settle_refund};
use crate::state::AppState;

/// Orders handled per sweep; the rest wait for the next tick.
pub const SWEEP_BATCH_SIZE: i64 = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
  pub examined: usize,
  pub cancelled: usize,
  pub failed: usize,
  /// Refunds from earlier cancellations confirmed on this pass.
  pub refunds_settled: usize,
  /// Cancelled orders still waiting on the gateway after this pass.
  pub refunds_outstanding: usize,
}

/// One pass: settle pending refunds, then expire overdue orders. A failure on
/// one order does not stop the others.
#[instrument(name = "job::commit_deadline_sweep", skip(app_state))]
pub async fn sweep_overdue_orders(app_state: &AppState, now: DateTime<Utc>) -> Result<SweepReport> {
  let mut report = SweepReport::default();

  for order in app_state.store.list_pending_refunds(SWEEP_BATCH_SIZE).await? {
    match settle_refund(app_state, &order).await {
      Ok(Some(_)) => report.refunds_settled += 1,
      Ok(None) => report.refunds_outstanding += 1,
      Err(e) => {
        report.refunds_outstanding += 1;
        error!(order_id = %order.id, error = %e, "Failed to record refund.");
      }
    }
  }

  let overdue = app_state.store.list_overdue_orders(now, SWEEP_BATCH_SIZE).await?;
  report.examined = overdue.len();
  for order in overdue {
    match cancel_order(app_state, order.id, CancellationActor::System, None).await {
      Ok(cancelled) => {
        report.cancelled += 1;
        if cancelled.refund_pending {
          report.refunds_outstanding += 1;
        }
      }
      Err(e) => {
        report.failed += 1;
        error!(order_id = %order.id, error = %e, "Failed to expire overdue order.");
      }
    }
  }

  if report != SweepReport::default() {
    info!(?report, "Commit deadline sweep finished.");
  } else {
    debug!("No overdue orders.");
  }
  Ok(report)
}

/// Runs the sweep every `interval` on the current runtime until the task is aborted.
pub fn spawn_commit_deadline_sweeper(app_state: AppState, interval: Duration) -> JoinHandle<()> {
  actix_web::rt::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = interval.as_secs(), "Commit deadline sweeper started.");
    loop {
      ticker.tick().await;
      if let Err(e) = sweep_overdue_orders(&app_state, Utc::now()).await {
        warn!(error = %e, "Commit deadline sweep failed.");
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::book::fixtures::book;
  use crate::models::order::fixtures::order;
  use crate::models::{OrderStatus, RefundStatus};
  use crate::services::paystack::{GatewayError, MockPaymentGateway, RefundReceipt};
  use crate::state::test_support::state_with;
  use crate::store::memory::MemoryStore;
  use chrono::Duration as ChronoDuration;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use uuid::Uuid;

  fn paid_order_due_in(store: &MemoryStore, offset: ChronoDuration) -> crate::models::Order {
    let seller = Uuid::new_v4();
    let mut b = book(seller, 20_000);
    b.sold = true;
    let mut o = order(Uuid::new_v4(), seller, b.id, OrderStatus::Paid);
    o.commit_deadline = Some(Utc::now() + offset);
    store.add_book(b);
    store.add_order(o.clone());
    o
  }

  #[tokio::test]
  async fn overdue_orders_are_cancelled_and_refunded() {
    let store = Arc::new(MemoryStore::new());
    let overdue = paid_order_due_in(&store, ChronoDuration::hours(-1));
    let on_time = paid_order_due_in(&store, ChronoDuration::hours(3));

    let mut gateway = MockPaymentGateway::new();
    gateway.expect_refund().times(1).returning(|reference, _| {
      Ok(RefundReceipt {
        reference: reference.to_string(),
        status: "pending".to_string(),
        amount_cents: None,
      })
    });
    let state = state_with(store.clone(), gateway);

    let report = sweep_overdue_orders(&state, Utc::now()).await.unwrap();
    assert_eq!(
      report,
      SweepReport {
        examined: 1,
        cancelled: 1,
        ..SweepReport::default()
      }
    );
    assert_eq!(store.order(overdue.id).unwrap().status, OrderStatus::Cancelled);
    assert!(!store.book(overdue.book_id).unwrap().sold);
    assert_eq!(store.order(on_time.id).unwrap().status, OrderStatus::Paid);
  }

  #[tokio::test]
  async fn failed_refund_is_retried_on_the_next_sweep() {
    let store = Arc::new(MemoryStore::new());
    let overdue = paid_order_due_in(&store, ChronoDuration::minutes(-5));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut gateway = MockPaymentGateway::new();
    {
      let calls = calls.clone();
      gateway.expect_refund().returning(move |reference, _| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
          Err(GatewayError::Api {
            status: 500,
            message: "try later".to_string(),
          })
        } else {
          Ok(RefundReceipt {
            reference: reference.to_string(),
            status: "processed".to_string(),
            amount_cents: None,
          })
        }
      });
    }
    let state = state_with(store.clone(), gateway);

    let first = sweep_overdue_orders(&state, Utc::now()).await.unwrap();
    assert_eq!((first.cancelled, first.refunds_outstanding), (1, 1));
    let stored = store.order(overdue.id).unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert_eq!(stored.refund_status, Some(RefundStatus::Pending));

    let second = sweep_overdue_orders(&state, Utc::now()).await.unwrap();
    assert_eq!(
      second,
      SweepReport {
        refunds_settled: 1,
        ..SweepReport::default()
      }
    );
    assert_eq!(store.order(overdue.id).unwrap().refund_status, Some(RefundStatus::Refunded));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
