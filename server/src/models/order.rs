// server/src/models/order.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

use super::delivery::{Address, CourierKind};
use super::payment::PaymentSplit;

/// Hours a seller has to commit to a paid order before it is cancelled and refunded.
pub const COMMIT_WINDOW_HOURS: i64 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Pending,
  Paid,
  Committed,
  Shipped,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Paid => "paid",
      OrderStatus::Committed => "committed",
      OrderStatus::Shipped => "shipped",
      OrderStatus::Delivered => "delivered",
      OrderStatus::Cancelled => "cancelled",
    }
  }

  pub fn can_transition_to(self, next: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
      (self, next),
      (Pending, Paid)
        | (Pending, Cancelled)
        | (Paid, Committed)
        | (Paid, Cancelled)
        | (Committed, Shipped)
        | (Committed, Cancelled)
        | (Shipped, Delivered)
    )
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
  }
}

/// Refund progress of a cancelled order that had been paid. `Pending` rows are
/// retried by the background sweep until the gateway confirms them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "refund_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
  Pending,
  Refunded,
}

impl std::fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub buyer_id: Uuid,
  pub seller_id: Uuid,
  pub book_id: Uuid,
  pub status: OrderStatus,
  pub payment_reference: String,
  pub amount_cents: i64,
  pub book_price_cents: i64,
  pub delivery_fee_cents: i64,
  pub platform_fee_cents: i64,
  pub seller_amount_cents: i64,
  pub courier: Option<String>,
  pub delivery_address: Option<Json<Address>>,
  pub tracking_number: Option<String>,
  pub commit_deadline: Option<DateTime<Utc>>,
  pub cancellation_reason: Option<String>,
  pub refund_status: Option<RefundStatus>,
  pub paid_at: Option<DateTime<Utc>>,
  pub committed_at: Option<DateTime<Utc>>,
  pub shipped_at: Option<DateTime<Utc>>,
  pub delivered_at: Option<DateTime<Utc>>,
  pub cancelled_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  pub fn is_party(&self, user_id: Uuid) -> bool {
    self.buyer_id == user_id || self.seller_id == user_id
  }

  pub fn courier_kind(&self) -> Option<CourierKind> {
    self.courier.as_deref().and_then(|c| c.parse().ok())
  }

  pub fn commit_deadline_passed(&self, now: DateTime<Utc>) -> bool {
    self.commit_deadline.is_some_and(|deadline| deadline <= now)
  }

  pub fn split(&self) -> PaymentSplit {
    PaymentSplit {
      book_price_cents: self.book_price_cents,
      delivery_fee_cents: self.delivery_fee_cents,
      platform_fee_cents: self.platform_fee_cents,
      seller_amount_cents: self.seller_amount_cents,
      total_cents: self.amount_cents,
    }
  }
}

pub fn commit_deadline_from(paid_at: DateTime<Utc>) -> DateTime<Utc> {
  paid_at + Duration::hours(COMMIT_WINDOW_HOURS)
}

#[derive(Debug, Clone)]
pub struct NewOrder {
  pub buyer_id: Uuid,
  pub seller_id: Uuid,
  pub book_id: Uuid,
  pub payment_reference: String,
  pub split: PaymentSplit,
  pub courier: Option<CourierKind>,
  pub delivery_address: Option<Address>,
}

/// A status change plus the columns that travel with it. Applied only if the
/// order is still in the expected status.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
  pub status: OrderStatus,
  pub at: DateTime<Utc>,
  pub commit_deadline: Option<DateTime<Utc>>,
  pub tracking_number: Option<String>,
  pub cancellation_reason: Option<String>,
  pub refund_status: Option<RefundStatus>,
}

impl OrderUpdate {
  pub fn to(status: OrderStatus) -> Self {
    Self {
      status,
      at: Utc::now(),
      commit_deadline: None,
      tracking_number: None,
      cancellation_reason: None,
      refund_status: None,
    }
  }

  pub fn with_commit_deadline(mut self, deadline: DateTime<Utc>) -> Self {
    self.commit_deadline = Some(deadline);
    self
  }

  pub fn with_tracking_number(mut self, tracking_number: impl Into<String>) -> Self {
    self.tracking_number = Some(tracking_number.into());
    self
  }

  pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
    self.cancellation_reason = Some(reason.into());
    self
  }

  pub fn with_refund_pending(mut self) -> Self {
    self.refund_status = Some(RefundStatus::Pending);
    self
  }
}

/// Who is cancelling an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CancellationActor {
  Buyer(Uuid),
  Seller(Uuid),
  System,
}

impl CancellationActor {
  pub fn user_id(self) -> Option<Uuid> {
    match self {
      CancellationActor::Buyer(id) | CancellationActor::Seller(id) => Some(id),
      CancellationActor::System => None,
    }
  }

  /// Whether this actor owns the order in the role it claims.
  pub fn owns(self, order: &Order) -> bool {
    match self {
      CancellationActor::Buyer(id) => order.buyer_id == id,
      CancellationActor::Seller(id) => order.seller_id == id,
      CancellationActor::System => true,
    }
  }

  /// Buyers may back out until the seller commits; sellers decline before or
  /// after committing; the system expires unpaid and uncommitted orders.
  pub fn may_cancel_in(self, status: OrderStatus) -> bool {
    match self {
      CancellationActor::Buyer(_) => matches!(status, OrderStatus::Pending | OrderStatus::Paid),
      CancellationActor::Seller(_) => matches!(status, OrderStatus::Paid | OrderStatus::Committed),
      CancellationActor::System => matches!(status, OrderStatus::Pending | OrderStatus::Paid),
    }
  }

  pub fn default_reason(self) -> &'static str {
    match self {
      CancellationActor::Buyer(_) => "Cancelled by buyer",
      CancellationActor::Seller(_) => "Declined by seller",
      CancellationActor::System => "Seller did not commit within 48 hours",
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use OrderStatus::*;

  #[test]
  fn forward_transitions_are_allowed() {
    assert!(Pending.can_transition_to(Paid));
    assert!(Paid.can_transition_to(Committed));
    assert!(Committed.can_transition_to(Shipped));
    assert!(Shipped.can_transition_to(Delivered));
  }

  #[test]
  fn skipping_or_reversing_is_rejected() {
    assert!(!Pending.can_transition_to(Committed));
    assert!(!Paid.can_transition_to(Shipped));
    assert!(!Shipped.can_transition_to(Cancelled));
    assert!(!Delivered.can_transition_to(Cancelled));
    assert!(!Cancelled.can_transition_to(Pending));
    assert!(!Paid.can_transition_to(Paid));
  }

  #[test]
  fn commit_deadline_is_48_hours_after_payment() {
    let paid_at = Utc::now();
    assert_eq!(commit_deadline_from(paid_at) - paid_at, Duration::hours(48));
  }

  #[test]
  fn deadline_check_uses_inclusive_bound() {
    let now = Utc::now();
    let mut o = fixtures::order(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Paid);
    assert!(!o.commit_deadline_passed(now));
    o.commit_deadline = Some(now);
    assert!(o.commit_deadline_passed(now));
    o.commit_deadline = Some(now + Duration::minutes(1));
    assert!(!o.commit_deadline_passed(now));
  }

  #[test]
  fn cancellation_rights_depend_on_actor() {
    let buyer = CancellationActor::Buyer(Uuid::new_v4());
    let seller = CancellationActor::Seller(Uuid::new_v4());
    assert!(buyer.may_cancel_in(Paid));
    assert!(!buyer.may_cancel_in(Committed));
    assert!(seller.may_cancel_in(Committed));
    assert!(!seller.may_cancel_in(Pending));
    assert!(CancellationActor::System.may_cancel_in(Paid));
    assert!(!CancellationActor::System.may_cancel_in(Shipped));
  }

  #[test]
  fn status_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&Committed).unwrap(), "\"committed\"");
  }
}
