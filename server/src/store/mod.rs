// server/src/store/mod.rs

//! Persistence boundary. Flows and handlers only see `MarketplaceStore`.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{
  BankingDetails, BankingDetailsInput, Book, BookFilter, NewNotification, NewOrder, NewPayment, Notification,
  Order, OrderStatus, OrderUpdate, Payment, Profile, RefundStatus,
};

pub use postgres::PgStore;

#[async_trait]
pub trait MarketplaceStore: Send + Sync {
  async fn ping(&self) -> Result<()>;

  async fn list_books(&self, filter: &BookFilter) -> Result<Vec<Book>>;
  async fn get_book(&self, id: Uuid) -> Result<Option<Book>>;
  async fn set_book_sold(&self, id: Uuid, sold: bool) -> Result<()>;
  /// Marks the book sold only if it is still available. `false` means another
  /// order already holds it.
  async fn claim_book(&self, id: Uuid) -> Result<bool>;

  async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>>;
  async fn set_profile_subaccount(&self, user_id: Uuid, subaccount_code: &str) -> Result<()>;

  async fn insert_order(&self, order: &NewOrder) -> Result<Order>;
  async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
  async fn get_order_by_reference(&self, reference: &str) -> Result<Option<Order>>;
  async fn orders_for_book(&self, book_id: Uuid) -> Result<Vec<Order>>;
  async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>>;
  /// Applies `update` only while the order is still `expected`. `None` means
  /// the order moved on (or does not exist) and nothing was written.
  async fn transition_order(&self, id: Uuid, expected: OrderStatus, update: &OrderUpdate) -> Result<Option<Order>>;
  /// Paid orders whose commit deadline is at or before `now`, oldest first.
  async fn list_overdue_orders(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Order>>;
  async fn set_refund_status(&self, id: Uuid, status: RefundStatus) -> Result<()>;
  /// Cancelled orders still waiting for the gateway to confirm their refund, oldest first.
  async fn list_pending_refunds(&self, limit: i64) -> Result<Vec<Order>>;

  /// Inserts or updates the payment row for `payment.reference`.
  async fn upsert_payment(&self, payment: &NewPayment) -> Result<Payment>;
  async fn get_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>>;

  async fn get_banking_details(&self, user_id: Uuid) -> Result<Option<BankingDetails>>;
  async fn upsert_banking_details(
    &self,
    user_id: Uuid,
    input: &BankingDetailsInput,
    subaccount_code: &str,
  ) -> Result<BankingDetails>;

  async fn insert_notification(&self, notification: &NewNotification) -> Result<Notification>;
  async fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>>;
  async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> Result<bool>;
}

/// Column stamped with the transition time for each target status.
pub(crate) fn stamp_column(status: OrderStatus) -> Option<&'static str> {
  match status {
    OrderStatus::Paid => Some("paid_at"),
    OrderStatus::Committed => Some("committed_at"),
    OrderStatus::Shipped => Some("shipped_at"),
    OrderStatus::Delivered => Some("delivered_at"),
    OrderStatus::Cancelled => Some("cancelled_at"),
    OrderStatus::Pending => None,
  }
}
