// server/src/store/memory.rs

//! In-process store used by flow and handler tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::types::Json;
use std::collections::HashMap;
use uuid::Uuid;

use super::{stamp_column, MarketplaceStore};
use crate::errors::{AppError, Result};
use crate::models::{
  BankingDetails, BankingDetailsInput, Book, BookFilter, NewNotification, NewOrder, NewPayment, Notification,
  Order, OrderStatus, OrderUpdate, Payment, Profile, RefundStatus,
};

#[derive(Default)]
struct Tables {
  books: HashMap<Uuid, Book>,
  profiles: HashMap<Uuid, Profile>,
  orders: HashMap<Uuid, Order>,
  payments: HashMap<String, Payment>,
  banking: HashMap<Uuid, BankingDetails>,
  notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct MemoryStore {
  tables: Mutex<Tables>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_book(&self, book: Book) {
    self.tables.lock().books.insert(book.id, book);
  }

  pub fn add_profile(&self, id: Uuid, email: &str, subaccount_code: Option<&str>) -> Profile {
    let now = Utc::now();
    let profile = Profile {
      id,
      email: email.to_string(),
      full_name: None,
      subaccount_code: subaccount_code.map(str::to_string),
      created_at: now,
      updated_at: now,
    };
    self.tables.lock().profiles.insert(id, profile.clone());
    profile
  }

  pub fn add_order(&self, order: Order) {
    self.tables.lock().orders.insert(order.id, order);
  }

  pub fn book(&self, id: Uuid) -> Option<Book> {
    self.tables.lock().books.get(&id).cloned()
  }

  pub fn order(&self, id: Uuid) -> Option<Order> {
    self.tables.lock().orders.get(&id).cloned()
  }

  pub fn order_count(&self) -> usize {
    self.tables.lock().orders.len()
  }

  pub fn payment_count(&self) -> usize {
    self.tables.lock().payments.len()
  }

  /// Synchronous `transition_order`, for tests that move an order from inside a mock.
  pub fn transition_now(&self, id: Uuid, expected: OrderStatus, update: &OrderUpdate) -> Result<Option<Order>> {
    if !expected.can_transition_to(update.status) {
      return Err(AppError::Conflict(format!(
        "Order cannot move from {} to {}",
        expected, update.status
      )));
    }
    let stamp = stamp_column(update.status)
      .ok_or_else(|| AppError::Internal(format!("No timestamp column for status {}", update.status)))?;

    let mut tables = self.tables.lock();
    let Some(order) = tables.orders.get_mut(&id) else {
      return Ok(None);
    };
    if order.status != expected {
      return Ok(None);
    }
    order.status = update.status;
    order.updated_at = update.at;
    match stamp {
      "paid_at" => order.paid_at = Some(update.at),
      "committed_at" => order.committed_at = Some(update.at),
      "shipped_at" => order.shipped_at = Some(update.at),
      "delivered_at" => order.delivered_at = Some(update.at),
      _ => order.cancelled_at = Some(update.at),
    }
    if update.commit_deadline.is_some() {
      order.commit_deadline = update.commit_deadline;
    }
    if update.tracking_number.is_some() {
      order.tracking_number = update.tracking_number.clone();
    }
    if update.cancellation_reason.is_some() {
      order.cancellation_reason = update.cancellation_reason.clone();
    }
    if update.refund_status.is_some() {
      order.refund_status = update.refund_status;
    }
    Ok(Some(order.clone()))
  }

  pub fn notifications_for(&self, user_id: Uuid) -> Vec<Notification> {
    self
      .tables
      .lock()
      .notifications
      .iter()
      .filter(|n| n.user_id == user_id)
      .cloned()
      .collect()
  }
}

#[async_trait]
impl MarketplaceStore for MemoryStore {
  async fn ping(&self) -> Result<()> {
    Ok(())
  }

  async fn list_books(&self, filter: &BookFilter) -> Result<Vec<Book>> {
    let tables = self.tables.lock();
    let mut books: Vec<Book> = tables.books.values().filter(|b| filter.matches(b)).cloned().collect();
    books.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(books)
  }

  async fn get_book(&self, id: Uuid) -> Result<Option<Book>> {
    Ok(self.tables.lock().books.get(&id).cloned())
  }

  async fn set_book_sold(&self, id: Uuid, sold: bool) -> Result<()> {
    let mut tables = self.tables.lock();
    let book = tables
      .books
      .get_mut(&id)
      .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))?;
    book.sold = sold;
    book.updated_at = Utc::now();
    Ok(())
  }

  async fn claim_book(&self, id: Uuid) -> Result<bool> {
    let mut tables = self.tables.lock();
    let book = tables
      .books
      .get_mut(&id)
      .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))?;
    if book.sold {
      return Ok(false);
    }
    book.sold = true;
    book.updated_at = Utc::now();
    Ok(true)
  }

  async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
    Ok(self.tables.lock().profiles.get(&user_id).cloned())
  }

  async fn set_profile_subaccount(&self, user_id: Uuid, subaccount_code: &str) -> Result<()> {
    let mut tables = self.tables.lock();
    let profile = tables
      .profiles
      .get_mut(&user_id)
      .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)))?;
    profile.subaccount_code = Some(subaccount_code.to_string());
    Ok(())
  }

  async fn insert_order(&self, new: &NewOrder) -> Result<Order> {
    let mut tables = self.tables.lock();
    if tables.orders.values().any(|o| o.payment_reference == new.payment_reference) {
      return Err(AppError::Conflict(format!(
        "Order with reference {} already exists",
        new.payment_reference
      )));
    }
    let now = Utc::now();
    let order = Order {
      id: Uuid::new_v4(),
      buyer_id: new.buyer_id,
      seller_id: new.seller_id,
      book_id: new.book_id,
      status: OrderStatus::Pending,
      payment_reference: new.payment_reference.clone(),
      amount_cents: new.split.total_cents,
      book_price_cents: new.split.book_price_cents,
      delivery_fee_cents: new.split.delivery_fee_cents,
      platform_fee_cents: new.split.platform_fee_cents,
      seller_amount_cents: new.split.seller_amount_cents,
      courier: new.courier.map(|c| c.as_str().to_string()),
      delivery_address: new.delivery_address.clone().map(Json),
      tracking_number: None,
      commit_deadline: None,
      cancellation_reason: None,
      refund_status: None,
      paid_at: None,
      committed_at: None,
      shipped_at: None,
      delivered_at: None,
      cancelled_at: None,
      created_at: now,
      updated_at: now,
    };
    tables.orders.insert(order.id, order.clone());
    Ok(order)
  }

  async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
    Ok(self.tables.lock().orders.get(&id).cloned())
  }

  async fn get_order_by_reference(&self, reference: &str) -> Result<Option<Order>> {
    let tables = self.tables.lock();
    Ok(tables.orders.values().find(|o| o.payment_reference == reference).cloned())
  }

  async fn orders_for_book(&self, book_id: Uuid) -> Result<Vec<Order>> {
    let tables = self.tables.lock();
    Ok(tables.orders.values().filter(|o| o.book_id == book_id).cloned().collect())
  }

  async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
    let tables = self.tables.lock();
    let mut orders: Vec<Order> = tables.orders.values().filter(|o| o.is_party(user_id)).cloned().collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(orders)
  }

  async fn transition_order(&self, id: Uuid, expected: OrderStatus, update: &OrderUpdate) -> Result<Option<Order>> {
    self.transition_now(id, expected, update)
  }

  async fn list_overdue_orders(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Order>> {
    let tables = self.tables.lock();
    let mut overdue: Vec<Order> = tables
      .orders
      .values()
      .filter(|o| o.status == OrderStatus::Paid && o.commit_deadline_passed(now))
      .cloned()
      .collect();
    overdue.sort_by_key(|o| o.commit_deadline);
    overdue.truncate(usize::try_from(limit).unwrap_or(0));
    Ok(overdue)
  }

  async fn set_refund_status(&self, id: Uuid, status: RefundStatus) -> Result<()> {
    let mut tables = self.tables.lock();
    let order = tables
      .orders
      .get_mut(&id)
      .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;
    order.refund_status = Some(status);
    order.updated_at = Utc::now();
    Ok(())
  }

  async fn list_pending_refunds(&self, limit: i64) -> Result<Vec<Order>> {
    let tables = self.tables.lock();
    let mut pending: Vec<Order> = tables
      .orders
      .values()
      .filter(|o| o.status == OrderStatus::Cancelled && o.refund_status == Some(RefundStatus::Pending))
      .cloned()
      .collect();
    pending.sort_by_key(|o| o.cancelled_at);
    pending.truncate(usize::try_from(limit).unwrap_or(0));
    Ok(pending)
  }

  async fn upsert_payment(&self, new: &NewPayment) -> Result<Payment> {
    let mut tables = self.tables.lock();
    let now = Utc::now();
    let payment = match tables.payments.get(&new.reference) {
      Some(existing) => Payment {
        status: new.status.clone(),
        gateway_transaction_id: new.gateway_transaction_id,
        channel: new.channel.clone(),
        paid_at: existing.paid_at.or(new.paid_at),
        updated_at: now,
        ..existing.clone()
      },
      None => Payment {
        id: Uuid::new_v4(),
        order_id: new.order_id,
        reference: new.reference.clone(),
        amount_cents: new.amount_cents,
        currency: new.currency.clone(),
        status: new.status.clone(),
        gateway_transaction_id: new.gateway_transaction_id,
        channel: new.channel.clone(),
        platform_fee_cents: new.split.platform_fee_cents,
        seller_amount_cents: new.split.seller_amount_cents,
        delivery_fee_cents: new.split.delivery_fee_cents,
        paid_at: new.paid_at,
        created_at: now,
        updated_at: now,
      },
    };
    tables.payments.insert(new.reference.clone(), payment.clone());
    Ok(payment)
  }

  async fn get_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
    Ok(self.tables.lock().payments.get(reference).cloned())
  }

  async fn get_banking_details(&self, user_id: Uuid) -> Result<Option<BankingDetails>> {
    Ok(self.tables.lock().banking.get(&user_id).cloned())
  }

  async fn upsert_banking_details(
    &self,
    user_id: Uuid,
    input: &BankingDetailsInput,
    subaccount_code: &str,
  ) -> Result<BankingDetails> {
    let mut tables = self.tables.lock();
    let now = Utc::now();
    let (id, created_at) = tables
      .banking
      .get(&user_id)
      .map(|existing| (existing.id, existing.created_at))
      .unwrap_or_else(|| (Uuid::new_v4(), now));
    let details = BankingDetails {
      id,
      user_id,
      business_name: input.business_name.clone(),
      email: input.email.clone(),
      bank_name: input.bank_name(),
      bank_code: input.bank_code.clone(),
      account_number: input.account_number.clone(),
      subaccount_code: Some(subaccount_code.to_string()),
      status: "active".to_string(),
      created_at,
      updated_at: now,
    };
    tables.banking.insert(user_id, details.clone());
    Ok(details)
  }

  async fn insert_notification(&self, new: &NewNotification) -> Result<Notification> {
    let notification = Notification {
      id: Uuid::new_v4(),
      user_id: new.user_id,
      kind: new.kind,
      title: new.title.clone(),
      message: new.message.clone(),
      read: false,
      created_at: Utc::now(),
    };
    self.tables.lock().notifications.push(notification.clone());
    Ok(notification)
  }

  async fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
    let tables = self.tables.lock();
    Ok(
      tables
        .notifications
        .iter()
        .rev()
        .filter(|n| n.user_id == user_id && (!unread_only || !n.read))
        .cloned()
        .collect(),
    )
  }

  async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
    let mut tables = self.tables.lock();
    match tables.notifications.iter_mut().find(|n| n.id == id && n.user_id == user_id) {
      Some(notification) => {
        notification.read = true;
        Ok(true)
      }
      None => Ok(false),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::book::fixtures::book;
  use crate::models::order::fixtures::order;
  use crate::models::PaymentSplit;

  #[tokio::test]
  async fn transition_is_compare_and_set() {
    let store = MemoryStore::new();
    let o = order(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), OrderStatus::Pending);
    store.add_order(o.clone());

    let paid = store
      .transition_order(o.id, OrderStatus::Pending, &OrderUpdate::to(OrderStatus::Paid))
      .await
      .unwrap();
    assert_eq!(paid.map(|p| p.status), Some(OrderStatus::Paid));

    let again = store
      .transition_order(o.id, OrderStatus::Pending, &OrderUpdate::to(OrderStatus::Paid))
      .await
      .unwrap();
    assert!(again.is_none());
  }

  #[tokio::test]
  async fn illegal_transition_is_a_conflict() {
    let store = MemoryStore::new();
    let result = store
      .transition_order(Uuid::new_v4(), OrderStatus::Pending, &OrderUpdate::to(OrderStatus::Shipped))
      .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
  }

  #[tokio::test]
  async fn book_can_only_be_claimed_once() {
    let store = MemoryStore::new();
    let b = book(Uuid::new_v4(), 20_000);
    store.add_book(b.clone());
    assert!(store.claim_book(b.id).await.unwrap());
    assert!(!store.claim_book(b.id).await.unwrap());
    store.set_book_sold(b.id, false).await.unwrap();
    assert!(store.claim_book(b.id).await.unwrap());
  }

  #[tokio::test]
  async fn payment_upsert_keeps_one_row_per_reference() {
    let store = MemoryStore::new();
    let new = NewPayment {
      order_id: Uuid::new_v4(),
      reference: "RB-dup".to_string(),
      amount_cents: 29_500,
      currency: "ZAR".to_string(),
      status: "success".to_string(),
      gateway_transaction_id: Some(1),
      channel: Some("card".to_string()),
      split: PaymentSplit::for_book_price(20_000, 9_500),
      paid_at: Some(Utc::now()),
    };
    let first = store.upsert_payment(&new).await.unwrap();
    let second = store.upsert_payment(&new).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(store.payment_count(), 1);
  }

  #[tokio::test]
  async fn duplicate_order_reference_is_rejected() {
    let store = MemoryStore::new();
    let b = book(Uuid::new_v4(), 20_000);
    let new = NewOrder {
      buyer_id: Uuid::new_v4(),
      seller_id: b.seller_id,
      book_id: b.id,
      payment_reference: "RB-same".to_string(),
      split: PaymentSplit::for_book_price(b.price_cents, 0),
      courier: None,
      delivery_address: None,
    };
    store.insert_order(&new).await.unwrap();
    assert!(matches!(store.insert_order(&new).await, Err(AppError::Conflict(_))));
    assert_eq!(store.order_count(), 1);
  }
}
