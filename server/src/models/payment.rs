// server/src/models/payment.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Platform commission on the book price, in percent.
pub const PLATFORM_COMMISSION_PERCENT: i64 = 10;

/// How one checkout total is divided. All amounts are ZAR cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSplit {
  pub book_price_cents: i64,
  pub delivery_fee_cents: i64,
  pub platform_fee_cents: i64,
  pub seller_amount_cents: i64,
  pub total_cents: i64,
}

impl PaymentSplit {
  /// 10% of the book price (half-up to the cent) goes to the platform, the
  /// rest of the book price to the seller. Delivery is collected by the
  /// platform, which pays the courier.
  pub fn for_book_price(book_price_cents: i64, delivery_fee_cents: i64) -> Self {
    let platform_fee_cents = (book_price_cents * PLATFORM_COMMISSION_PERCENT + 50) / 100;
    Self {
      book_price_cents,
      delivery_fee_cents,
      platform_fee_cents,
      seller_amount_cents: book_price_cents - platform_fee_cents,
      total_cents: book_price_cents + delivery_fee_cents,
    }
  }

  /// Flat amount kept by the main account when the transaction settles into a subaccount.
  pub fn platform_share_cents(&self) -> i64 {
    self.platform_fee_cents + self.delivery_fee_cents
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
  pub id: Uuid,
  pub order_id: Uuid,
  pub reference: String,
  pub amount_cents: i64,
  pub currency: String,
  pub status: String,
  pub gateway_transaction_id: Option<i64>,
  pub channel: Option<String>,
  pub platform_fee_cents: i64,
  pub seller_amount_cents: i64,
  pub delivery_fee_cents: i64,
  pub paid_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Payment row keyed by gateway reference; writing the same reference twice updates in place.
#[derive(Debug, Clone)]
pub struct NewPayment {
  pub order_id: Uuid,
  pub reference: String,
  pub amount_cents: i64,
  pub currency: String,
  pub status: String,
  pub gateway_transaction_id: Option<i64>,
  pub channel: Option<String>,
  pub split: PaymentSplit,
  pub paid_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn splits_ninety_ten_on_book_price() {
    let split = PaymentSplit::for_book_price(25_000, 9_500);
    assert_eq!(split.platform_fee_cents, 2_500);
    assert_eq!(split.seller_amount_cents, 22_500);
    assert_eq!(split.total_cents, 34_500);
    assert_eq!(split.platform_share_cents(), 12_000);
  }

  #[test]
  fn commission_rounds_half_up_to_the_cent() {
    assert_eq!(PaymentSplit::for_book_price(12_345, 0).platform_fee_cents, 1_235);
    assert_eq!(PaymentSplit::for_book_price(12_344, 0).platform_fee_cents, 1_234);
    assert_eq!(PaymentSplit::for_book_price(5, 0).platform_fee_cents, 1);
    assert_eq!(PaymentSplit::for_book_price(4, 0).platform_fee_cents, 0);
  }

  #[test]
  fn parts_always_sum_to_total() {
    for price in [1, 99, 1_001, 17_777, 250_000] {
      let split = PaymentSplit::for_book_price(price, 8_900);
      assert_eq!(
        split.platform_fee_cents + split.seller_amount_cents + split.delivery_fee_cents,
        split.total_cents
      );
    }
  }
}
