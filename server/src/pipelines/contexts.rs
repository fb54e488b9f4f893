// server/src/pipelines/contexts.rs

//! Data structs the flows run on. Handlers receive them wrapped in `FlowContext`.

use rebooked_flow::FlowContext;
use uuid::Uuid;

use crate::models::{
  Address, BankingDetails, BankingDetailsInput, Book, CancellationActor, CourierKind, Order, OrderStatus, Payment,
  PaymentSplit, Quote, Shipment, ShipmentRequest,
};
use crate::services::courier::CourierDirectory;
use crate::services::paystack::{InitializedTransaction, RefundReceipt, Subaccount, VerifiedTransaction};
use crate::state::AppState;

#[derive(Clone)]
pub struct InitializePaymentCtxData {
  pub app_state: AppState,
  pub buyer_id: Uuid,
  pub buyer_email: String,
  pub book_id: Uuid,
  pub courier: Option<CourierKind>,
  pub delivery_fee_cents: i64,
  pub delivery_address: Option<Address>,
  pub guard_held: bool,
  pub book: Option<Book>,
  pub seller_subaccount: Option<String>,
  pub split: Option<PaymentSplit>,
  pub order: Option<Order>,
  pub authorization: Option<InitializedTransaction>,
}

#[derive(Clone)]
pub struct VerifyPaymentCtxData {
  pub app_state: AppState,
  pub reference: String,
  pub order: Option<Order>,
  /// The order had already left `pending`; nothing was changed.
  pub already_processed: bool,
  /// Another order holds the book; this payment was cancelled and refunded.
  pub sold_elsewhere: bool,
  pub refund: Option<RefundReceipt>,
  pub transaction: Option<VerifiedTransaction>,
  pub payment: Option<Payment>,
  pub notifications_sent: usize,
  pub emails_sent: usize,
}

/// Sub-context for one courier's shipment sub-flow.
#[derive(Clone)]
pub struct ShipmentCtxData {
  pub couriers: CourierDirectory,
  pub courier: CourierKind,
  pub request: ShipmentRequest,
  pub quote: Option<Quote>,
  pub shipment: Option<Shipment>,
  /// Why the booking failed, kept for the caller since the step is optional.
  pub error: Option<String>,
}

#[derive(Clone)]
pub struct CommitOrderCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub seller_id: Uuid,
  pub pickup_address: Option<Address>,
  pub service_code: Option<String>,
  pub order: Option<Order>,
  pub shipment_ctx: Option<FlowContext<ShipmentCtxData>>,
  pub shipment: Option<Shipment>,
}

impl CommitOrderCtxData {
  pub fn courier(&self) -> Option<CourierKind> {
    self.order.as_ref().and_then(Order::courier_kind)
  }

  /// A shipment can only be booked with a courier and both addresses.
  pub fn can_dispatch(&self) -> bool {
    let has_delivery = self.order.as_ref().is_some_and(|o| o.delivery_address.is_some());
    self.courier().is_some() && self.pickup_address.is_some() && has_delivery
  }
}

#[derive(Clone)]
pub struct CancelOrderCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub actor: CancellationActor,
  pub reason: Option<String>,
  pub order: Option<Order>,
  pub previous_status: Option<OrderStatus>,
  pub refund: Option<RefundReceipt>,
}

impl CancelOrderCtxData {
  /// Money only moved once the order was paid.
  pub fn needs_refund(&self) -> bool {
    matches!(
      self.previous_status,
      Some(OrderStatus::Paid) | Some(OrderStatus::Committed)
    )
  }
}

#[derive(Clone)]
pub struct SubaccountCtxData {
  pub app_state: AppState,
  pub user_id: Uuid,
  pub input: BankingDetailsInput,
  pub existing: Option<BankingDetails>,
  /// Gateway code already on file, from banking details or the profile.
  pub existing_code: Option<String>,
  pub subaccount: Option<Subaccount>,
  pub saved: Option<BankingDetails>,
  pub created: bool,
}
