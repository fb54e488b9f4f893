// server/src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::{stamp_column, MarketplaceStore};
use crate::errors::{AppError, Result};
use crate::models::{
  BankingDetails, BankingDetailsInput, Book, BookFilter, NewNotification, NewOrder, NewPayment, Notification,
  Order, OrderStatus, OrderUpdate, Payment, Profile, RefundStatus,
};

const BOOK_COLUMNS: &str = "id, seller_id, title, author, isbn, condition, category, price_cents, image_url, \
                            province, sold, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, buyer_id, seller_id, book_id, status, payment_reference, amount_cents, \
                             book_price_cents, delivery_fee_cents, platform_fee_cents, seller_amount_cents, courier, \
                             delivery_address, tracking_number, commit_deadline, cancellation_reason, refund_status, \
                             paid_at, committed_at, shipped_at, delivered_at, cancelled_at, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, order_id, reference, amount_cents, currency, status, gateway_transaction_id, \
                               channel, platform_fee_cents, seller_amount_cents, delivery_fee_cents, paid_at, \
                               created_at, updated_at";

const BANKING_COLUMNS: &str = "id, user_id, business_name, email, bank_name, bank_code, account_number, \
                               subaccount_code, status, created_at, updated_at";

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, read, created_at";

const BOOK_LISTING_LIMIT: i64 = 200;

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }
}

fn log_db_error(operation: &'static str) -> impl Fn(sqlx::Error) -> AppError {
  move |e| {
    error!(operation, error = %e, "Database operation failed.");
    AppError::Sqlx(e)
  }
}

#[async_trait]
impl MarketplaceStore for PgStore {
  async fn ping(&self) -> Result<()> {
    sqlx::query("SELECT 1")
      .execute(&self.pool)
      .await
      .map_err(log_db_error("ping"))?;
    Ok(())
  }

  #[instrument(name = "store::list_books", skip(self))]
  async fn list_books(&self, filter: &BookFilter) -> Result<Vec<Book>> {
    let sql = format!(
      "SELECT {BOOK_COLUMNS} FROM books \
       WHERE ($1::text IS NULL OR title ILIKE '%' || $1 || '%' OR author ILIKE '%' || $1 || '%' OR isbn = $1) \
       AND ($2::text IS NULL OR category = $2) \
       AND ($3::text IS NULL OR province = $3) \
       AND ($4::bigint IS NULL OR price_cents <= $4) \
       AND ($5::uuid IS NULL OR seller_id = $5) \
       AND ($6 OR NOT sold) \
       ORDER BY created_at DESC LIMIT $7"
    );
    let books: Vec<Book> = sqlx::query_as(&sql)
      .bind(filter.search.as_deref())
      .bind(filter.category.as_deref())
      .bind(filter.province.as_deref())
      .bind(filter.max_price_cents)
      .bind(filter.seller_id)
      .bind(filter.include_sold)
      .bind(BOOK_LISTING_LIMIT)
      .fetch_all(&self.pool)
      .await
      .map_err(log_db_error("list_books"))?;
    debug!(count = books.len(), "Fetched books.");
    Ok(books)
  }

  async fn get_book(&self, id: Uuid) -> Result<Option<Book>> {
    let sql = format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1");
    sqlx::query_as(&sql)
      .bind(id)
      .fetch_optional(&self.pool)
      .await
      .map_err(log_db_error("get_book"))
  }

  async fn set_book_sold(&self, id: Uuid, sold: bool) -> Result<()> {
    let result = sqlx::query("UPDATE books SET sold = $2, updated_at = now() WHERE id = $1")
      .bind(id)
      .bind(sold)
      .execute(&self.pool)
      .await
      .map_err(log_db_error("set_book_sold"))?;
    if result.rows_affected() == 0 {
      return Err(AppError::NotFound(format!("Book {} not found", id)));
    }
    Ok(())
  }

  #[instrument(name = "store::claim_book", skip(self))]
  async fn claim_book(&self, id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE books SET sold = TRUE, updated_at = now() WHERE id = $1 AND NOT sold")
      .bind(id)
      .execute(&self.pool)
      .await
      .map_err(log_db_error("claim_book"))?;
    Ok(result.rows_affected() == 1)
  }

  async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
    sqlx::query_as(
      "SELECT id, email, full_name, subaccount_code, created_at, updated_at FROM profiles WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&self.pool)
    .await
    .map_err(log_db_error("get_profile"))
  }

  async fn set_profile_subaccount(&self, user_id: Uuid, subaccount_code: &str) -> Result<()> {
    let result = sqlx::query("UPDATE profiles SET subaccount_code = $2, updated_at = now() WHERE id = $1")
      .bind(user_id)
      .bind(subaccount_code)
      .execute(&self.pool)
      .await
      .map_err(log_db_error("set_profile_subaccount"))?;
    if result.rows_affected() == 0 {
      return Err(AppError::NotFound(format!("Profile {} not found", user_id)));
    }
    Ok(())
  }

  #[instrument(name = "store::insert_order", skip(self, order), fields(reference = %order.payment_reference))]
  async fn insert_order(&self, order: &NewOrder) -> Result<Order> {
    let sql = format!(
      "INSERT INTO orders (buyer_id, seller_id, book_id, status, payment_reference, amount_cents, book_price_cents, \
       delivery_fee_cents, platform_fee_cents, seller_amount_cents, courier, delivery_address) \
       VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8, $9, $10, $11) \
       RETURNING {ORDER_COLUMNS}"
    );
    sqlx::query_as(&sql)
      .bind(order.buyer_id)
      .bind(order.seller_id)
      .bind(order.book_id)
      .bind(&order.payment_reference)
      .bind(order.split.total_cents)
      .bind(order.split.book_price_cents)
      .bind(order.split.delivery_fee_cents)
      .bind(order.split.platform_fee_cents)
      .bind(order.split.seller_amount_cents)
      .bind(order.courier.map(|c| c.as_str()))
      .bind(order.delivery_address.clone().map(Json))
      .fetch_one(&self.pool)
      .await
      .map_err(|e| {
        if let sqlx::Error::Database(db) = &e {
          if db.is_unique_violation() {
            return AppError::Conflict(format!("Order with reference {} already exists", order.payment_reference));
          }
        }
        log_db_error("insert_order")(e)
      })
  }

  async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    sqlx::query_as(&sql)
      .bind(id)
      .fetch_optional(&self.pool)
      .await
      .map_err(log_db_error("get_order"))
  }

  async fn get_order_by_reference(&self, reference: &str) -> Result<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE payment_reference = $1");
    sqlx::query_as(&sql)
      .bind(reference)
      .fetch_optional(&self.pool)
      .await
      .map_err(log_db_error("get_order_by_reference"))
  }

  async fn orders_for_book(&self, book_id: Uuid) -> Result<Vec<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE book_id = $1 ORDER BY created_at DESC");
    sqlx::query_as(&sql)
      .bind(book_id)
      .fetch_all(&self.pool)
      .await
      .map_err(log_db_error("orders_for_book"))
  }

  async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
    let sql = format!(
      "SELECT {ORDER_COLUMNS} FROM orders WHERE buyer_id = $1 OR seller_id = $1 ORDER BY created_at DESC"
    );
    sqlx::query_as(&sql)
      .bind(user_id)
      .fetch_all(&self.pool)
      .await
      .map_err(log_db_error("list_orders_for_user"))
  }

  #[instrument(name = "store::transition_order", skip(self, update), fields(to = %update.status))]
  async fn transition_order(&self, id: Uuid, expected: OrderStatus, update: &OrderUpdate) -> Result<Option<Order>> {
    if !expected.can_transition_to(update.status) {
      return Err(AppError::Conflict(format!(
        "Order cannot move from {} to {}",
        expected, update.status
      )));
    }
    let stamp = stamp_column(update.status)
      .ok_or_else(|| AppError::Internal(format!("No timestamp column for status {}", update.status)))?;

    let sql = format!(
      "UPDATE orders SET status = $3, {stamp} = $4, updated_at = $4, \
       commit_deadline = COALESCE($5, commit_deadline), \
       tracking_number = COALESCE($6, tracking_number), \
       cancellation_reason = COALESCE($7, cancellation_reason), \
       refund_status = COALESCE($8, refund_status) \
       WHERE id = $1 AND status = $2 \
       RETURNING {ORDER_COLUMNS}"
    );
    let updated: Option<Order> = sqlx::query_as(&sql)
      .bind(id)
      .bind(expected)
      .bind(update.status)
      .bind(update.at)
      .bind(update.commit_deadline)
      .bind(update.tracking_number.as_deref())
      .bind(update.cancellation_reason.as_deref())
      .bind(update.refund_status)
      .fetch_optional(&self.pool)
      .await
      .map_err(log_db_error("transition_order"))?;
    if updated.is_none() {
      debug!(order_id = %id, %expected, "Order was not in the expected status; nothing written.");
    }
    Ok(updated)
  }

  async fn list_overdue_orders(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Order>> {
    let sql = format!(
      "SELECT {ORDER_COLUMNS} FROM orders WHERE status = 'paid' AND commit_deadline <= $1 \
       ORDER BY commit_deadline ASC LIMIT $2"
    );
    sqlx::query_as(&sql)
      .bind(now)
      .bind(limit)
      .fetch_all(&self.pool)
      .await
      .map_err(log_db_error("list_overdue_orders"))
  }

  async fn set_refund_status(&self, id: Uuid, status: RefundStatus) -> Result<()> {
    let result = sqlx::query("UPDATE orders SET refund_status = $2, updated_at = now() WHERE id = $1")
      .bind(id)
      .bind(status)
      .execute(&self.pool)
      .await
      .map_err(log_db_error("set_refund_status"))?;
    if result.rows_affected() == 0 {
      return Err(AppError::NotFound(format!("Order {} not found", id)));
    }
    Ok(())
  }

  async fn list_pending_refunds(&self, limit: i64) -> Result<Vec<Order>> {
    let sql = format!(
      "SELECT {ORDER_COLUMNS} FROM orders WHERE status = 'cancelled' AND refund_status = 'pending' \
       ORDER BY cancelled_at ASC LIMIT $1"
    );
    sqlx::query_as(&sql)
      .bind(limit)
      .fetch_all(&self.pool)
      .await
      .map_err(log_db_error("list_pending_refunds"))
  }

  #[instrument(name = "store::upsert_payment", skip(self, payment), fields(reference = %payment.reference))]
  async fn upsert_payment(&self, payment: &NewPayment) -> Result<Payment> {
    let sql = format!(
      "INSERT INTO payments (order_id, reference, amount_cents, currency, status, gateway_transaction_id, channel, \
       platform_fee_cents, seller_amount_cents, delivery_fee_cents, paid_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
       ON CONFLICT (reference) DO UPDATE SET \
         status = EXCLUDED.status, \
         gateway_transaction_id = EXCLUDED.gateway_transaction_id, \
         channel = EXCLUDED.channel, \
         paid_at = COALESCE(payments.paid_at, EXCLUDED.paid_at), \
         updated_at = now() \
       RETURNING {PAYMENT_COLUMNS}"
    );
    sqlx::query_as(&sql)
      .bind(payment.order_id)
      .bind(&payment.reference)
      .bind(payment.amount_cents)
      .bind(&payment.currency)
      .bind(&payment.status)
      .bind(payment.gateway_transaction_id)
      .bind(payment.channel.as_deref())
      .bind(payment.split.platform_fee_cents)
      .bind(payment.split.seller_amount_cents)
      .bind(payment.split.delivery_fee_cents)
      .bind(payment.paid_at)
      .fetch_one(&self.pool)
      .await
      .map_err(log_db_error("upsert_payment"))
  }

  async fn get_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1");
    sqlx::query_as(&sql)
      .bind(reference)
      .fetch_optional(&self.pool)
      .await
      .map_err(log_db_error("get_payment_by_reference"))
  }

  async fn get_banking_details(&self, user_id: Uuid) -> Result<Option<BankingDetails>> {
    let sql = format!("SELECT {BANKING_COLUMNS} FROM banking_details WHERE user_id = $1");
    sqlx::query_as(&sql)
      .bind(user_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(log_db_error("get_banking_details"))
  }

  #[instrument(name = "store::upsert_banking_details", skip(self, input))]
  async fn upsert_banking_details(
    &self,
    user_id: Uuid,
    input: &BankingDetailsInput,
    subaccount_code: &str,
  ) -> Result<BankingDetails> {
    let sql = format!(
      "INSERT INTO banking_details (user_id, business_name, email, bank_name, bank_code, account_number, \
       subaccount_code, status) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, 'active') \
       ON CONFLICT (user_id) DO UPDATE SET \
         business_name = EXCLUDED.business_name, \
         email = EXCLUDED.email, \
         bank_name = EXCLUDED.bank_name, \
         bank_code = EXCLUDED.bank_code, \
         account_number = EXCLUDED.account_number, \
         subaccount_code = EXCLUDED.subaccount_code, \
         status = 'active', \
         updated_at = now() \
       RETURNING {BANKING_COLUMNS}"
    );
    sqlx::query_as(&sql)
      .bind(user_id)
      .bind(&input.business_name)
      .bind(&input.email)
      .bind(input.bank_name())
      .bind(&input.bank_code)
      .bind(&input.account_number)
      .bind(subaccount_code)
      .fetch_one(&self.pool)
      .await
      .map_err(log_db_error("upsert_banking_details"))
  }

  async fn insert_notification(&self, notification: &NewNotification) -> Result<Notification> {
    let sql = format!(
      "INSERT INTO notifications (user_id, kind, title, message) VALUES ($1, $2, $3, $4) \
       RETURNING {NOTIFICATION_COLUMNS}"
    );
    sqlx::query_as(&sql)
      .bind(notification.user_id)
      .bind(notification.kind)
      .bind(&notification.title)
      .bind(&notification.message)
      .fetch_one(&self.pool)
      .await
      .map_err(log_db_error("insert_notification"))
  }

  async fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
    let sql = format!(
      "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = $1 AND (NOT $2 OR NOT read) \
       ORDER BY created_at DESC LIMIT 100"
    );
    sqlx::query_as(&sql)
      .bind(user_id)
      .bind(unread_only)
      .fetch_all(&self.pool)
      .await
      .map_err(log_db_error("list_notifications"))
  }

  async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2")
      .bind(id)
      .bind(user_id)
      .execute(&self.pool)
      .await
      .map_err(log_db_error("mark_notification_read"))?;
    Ok(result.rows_affected() > 0)
  }
}
