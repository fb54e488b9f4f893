// server/src/pipelines/payment_init.rs

//! Starts a checkout: guards against double purchase, checks the delivery fee
//! against the courier's quote, creates the pending order and asks the gateway
//! for an authorization URL with the seller's split.

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use rebooked_flow::{Flow, FlowContext, FlowOutcome, FlowRegistry, StepControl, StepDef};

use crate::errors::{AppError, Result as AppResult};
use crate::models::{
  Address, Book, CourierKind, NewOrder, Order, OrderStatus, OrderUpdate, Parcel, PaymentSplit, QuoteRequest,
};
use crate::pipelines::common_steps::missing;
use crate::pipelines::contexts::InitializePaymentCtxData;
use crate::services::paystack::InitializeTransaction;
use crate::state::AppState;

/// Highest delivery fee accepted from a checkout request (R1 000).
pub const MAX_DELIVERY_FEE_CENTS: i64 = 100_000;

/// A pending order younger than this still blocks the same buyer from starting another checkout.
pub const PENDING_ORDER_TTL_MINUTES: i64 = 30;

pub fn new_payment_reference() -> String {
  format!("RB-{}", Uuid::new_v4().simple())
}

pub fn register_initialize_payment_flow(registry: &FlowRegistry<AppError>) {
  let mut flow = Flow::<InitializePaymentCtxData, AppError>::new(
    "initialize_payment",
    vec![
      StepDef::required("validate_request"),
      StepDef::required("acquire_purchase_guard"),
      StepDef::required("load_book"),
      StepDef::required("check_existing_orders"),
      StepDef::required("price_delivery"),
      StepDef::required("resolve_seller_subaccount"),
      StepDef::required("create_pending_order"),
      StepDef::required("initialize_transaction"),
    ],
  );

  flow.on("validate_request", |ctx: FlowContext<InitializePaymentCtxData>| async move {
    let (email, fee, courier, address) = ctx.with(|d| {
      (
        d.buyer_email.clone(),
        d.delivery_fee_cents,
        d.courier,
        d.delivery_address.clone(),
      )
    });
    if !email.contains('@') {
      return Err(AppError::Validation("A valid buyer email is required".to_string()));
    }
    if !(0..=MAX_DELIVERY_FEE_CENTS).contains(&fee) {
      return Err(AppError::Validation(format!(
        "Delivery fee must be between 0 and {} cents",
        MAX_DELIVERY_FEE_CENTS
      )));
    }
    match (courier, address) {
      (Some(_), Some(address)) => address.validate().map_err(AppError::Validation)?,
      (None, None) => {}
      _ => {
        return Err(AppError::Validation(
          "Courier and delivery address must be provided together".to_string(),
        ))
      }
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("acquire_purchase_guard", |ctx: FlowContext<InitializePaymentCtxData>| async move {
    let (guard, buyer_id, book_id) = ctx.with(|d| (d.app_state.purchase_guard.clone(), d.buyer_id, d.book_id));
    if !guard.try_acquire(buyer_id, book_id) {
      warn!(%buyer_id, %book_id, "Purchase already in progress.");
      return Err(AppError::Conflict(
        "A purchase for this book is already in progress. Please wait a few minutes.".to_string(),
      ));
    }
    ctx.write().guard_held = true;
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("load_book", |ctx: FlowContext<InitializePaymentCtxData>| async move {
    let (store, buyer_id, book_id) = ctx.with(|d| (d.app_state.store.clone(), d.buyer_id, d.book_id));
    let book = store
      .get_book(book_id)
      .await?
      .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))?;
    if book.sold {
      return Err(AppError::Conflict("This book has already been sold".to_string()));
    }
    if book.seller_id == buyer_id {
      return Err(AppError::Validation("You cannot buy your own book".to_string()));
    }
    ctx.write().book = Some(book);
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("check_existing_orders", |ctx: FlowContext<InitializePaymentCtxData>| async move {
    let (store, buyer_id, book_id) = ctx.with(|d| (d.app_state.store.clone(), d.buyer_id, d.book_id));
    let orders = store.orders_for_book(book_id).await?;
    let stale_before = Utc::now() - Duration::minutes(PENDING_ORDER_TTL_MINUTES);

    for order in &orders {
      match order.status {
        OrderStatus::Cancelled => {}
        OrderStatus::Pending => {
          if order.buyer_id == buyer_id && order.created_at > stale_before {
            return Err(AppError::Conflict(
              "A payment for this book is already pending".to_string(),
            ));
          }
        }
        _ if order.buyer_id == buyer_id => {
          return Err(AppError::Conflict("You have already purchased this book".to_string()));
        }
        _ => return Err(AppError::Conflict("This book has already been sold".to_string())),
      }
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("price_delivery", |ctx: FlowContext<InitializePaymentCtxData>| async move {
    let (couriers, courier, fee, delivery, book) = ctx.with(|d| {
      (
        d.app_state.couriers.clone(),
        d.courier,
        d.delivery_fee_cents,
        d.delivery_address.clone(),
        d.book.clone(),
      )
    });
    let Some(courier) = courier else {
      if fee != 0 {
        return Err(AppError::Validation("A delivery fee requires a courier".to_string()));
      }
      return Ok(StepControl::Continue);
    };
    let delivery = delivery.ok_or_else(|| missing("delivery_address"))?;
    let book = book.ok_or_else(|| missing("book"))?;
    let route = QuoteRequest {
      collection: collection_estimate(&book, &delivery),
      delivery,
      parcel: Parcel::default(),
      declared_value_cents: book.price_cents,
    };

    let quote = couriers.get(courier)?.quote(&route).await?;
    if !quote.options.iter().any(|o| o.price_cents == fee) {
      warn!(%courier, fee, simulated = quote.simulated, "Delivery fee does not match the courier quote.");
      let offered = quote
        .options
        .iter()
        .map(|o| format!("{} {}", o.service_code, o.price_cents))
        .collect::<Vec<_>>()
        .join(", ");
      return Err(AppError::Validation(format!(
        "Delivery fee of {} cents does not match the {} quote ({})",
        fee,
        courier.display_name(),
        offered
      )));
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("resolve_seller_subaccount", |ctx: FlowContext<InitializePaymentCtxData>| async move {
    let (store, seller_id) = ctx.with(|d| {
      (
        d.app_state.store.clone(),
        d.book.as_ref().map(|b| b.seller_id),
      )
    });
    let seller_id = seller_id.ok_or_else(|| missing("book"))?;

    // The profile copy is authoritative; banking details are the fallback.
    let from_profile = store.get_profile(seller_id).await?.and_then(|p| p.subaccount_code);
    let subaccount = match from_profile {
      Some(code) => Some(code),
      None => store
        .get_banking_details(seller_id)
        .await?
        .and_then(|b| b.subaccount_code),
    };
    let Some(subaccount) = subaccount else {
      warn!(%seller_id, "Seller has no payout subaccount.");
      return Err(AppError::Validation(
        "This seller cannot receive payments yet. Please try again later.".to_string(),
      ));
    };
    ctx.write().seller_subaccount = Some(subaccount);
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("create_pending_order", |ctx: FlowContext<InitializePaymentCtxData>| async move {
    let (store, new_order) = {
      let guard = ctx.read();
      let book = guard.book.as_ref().ok_or_else(|| missing("book"))?;
      let split = PaymentSplit::for_book_price(book.price_cents, guard.delivery_fee_cents);
      (
        guard.app_state.store.clone(),
        NewOrder {
          buyer_id: guard.buyer_id,
          seller_id: book.seller_id,
          book_id: book.id,
          payment_reference: new_payment_reference(),
          split,
          courier: guard.courier,
          delivery_address: guard.delivery_address.clone(),
        },
      )
    };
    let order = store.insert_order(&new_order).await?;
    info!(order_id = %order.id, reference = %order.payment_reference, total = order.amount_cents, "Pending order created.");
    ctx.update(|d| {
      d.split = Some(new_order.split);
      d.order = Some(order);
    });
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("initialize_transaction", |ctx: FlowContext<InitializePaymentCtxData>| async move {
    let (gateway, request) = {
      let guard = ctx.read();
      let order = guard.order.as_ref().ok_or_else(|| missing("order"))?;
      let split = guard.split.ok_or_else(|| missing("split"))?;
      (
        guard.app_state.gateway.clone(),
        InitializeTransaction {
          email: guard.buyer_email.clone(),
          amount_cents: split.total_cents,
          reference: order.payment_reference.clone(),
          callback_url: guard.app_state.config.payment_callback_url(),
          subaccount: guard.seller_subaccount.clone(),
          transaction_charge_cents: Some(split.platform_share_cents()),
          metadata: json!({
            "order_id": order.id,
            "book_id": order.book_id,
            "buyer_id": order.buyer_id,
            "seller_id": order.seller_id,
            "platform_fee_cents": split.platform_fee_cents,
            "seller_amount_cents": split.seller_amount_cents,
            "delivery_fee_cents": split.delivery_fee_cents,
          }),
        },
      )
    };
    let authorization = gateway.initialize_transaction(&request).await?;
    ctx.write().authorization = Some(authorization);
    Ok::<_, AppError>(StepControl::Continue)
  });

  registry.register(flow);
}

/// The seller's pickup address is only known at commit time, so checkout
/// prices the route from the book's listed province.
fn collection_estimate(book: &Book, delivery: &Address) -> Address {
  Address {
    contact_name: "Seller".to_string(),
    phone: None,
    street: String::new(),
    suburb: None,
    city: String::new(),
    province: book.province.clone().unwrap_or_else(|| delivery.province.clone()),
    postal_code: String::new(),
  }
}

#[derive(Debug, Clone)]
pub struct InitializePaymentRequest {
  pub buyer_id: Uuid,
  pub buyer_email: String,
  pub book_id: Uuid,
  pub courier: Option<CourierKind>,
  pub delivery_fee_cents: i64,
  pub delivery_address: Option<Address>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializedPayment {
  pub order_id: Uuid,
  pub reference: String,
  pub authorization_url: String,
  pub access_code: String,
  pub split: PaymentSplit,
}

/// Runs the flow. On failure the purchase guard is released and an order
/// left without a gateway session is cancelled, so the buyer can retry.
#[instrument(name = "flow::initialize_payment", skip(app_state, request), fields(buyer_id = %request.buyer_id, book_id = %request.book_id))]
pub async fn initialize_payment(app_state: &AppState, request: InitializePaymentRequest) -> AppResult<InitializedPayment> {
  let ctx = FlowContext::new(InitializePaymentCtxData {
    app_state: app_state.clone(),
    buyer_id: request.buyer_id,
    buyer_email: request.buyer_email,
    book_id: request.book_id,
    courier: request.courier,
    delivery_fee_cents: request.delivery_fee_cents,
    delivery_address: request.delivery_address,
    guard_held: false,
    book: None,
    seller_subaccount: None,
    split: None,
    order: None,
    authorization: None,
  });

  let result = app_state.flows.run(ctx.clone()).await;
  let (guard_held, order, split, authorization) =
    ctx.with(|d| (d.guard_held, d.order.clone(), d.split, d.authorization.clone()));

  match (result, order, split, authorization) {
    (Ok(FlowOutcome::Completed), Some(order), Some(split), Some(authorization)) => Ok(InitializedPayment {
      order_id: order.id,
      reference: order.payment_reference,
      authorization_url: authorization.authorization_url,
      access_code: authorization.access_code,
      split,
    }),
    (result, order, _, _) => {
      if guard_held {
        app_state.purchase_guard.release(request.buyer_id, request.book_id);
      }
      if let Some(order) = order {
        abandon_order(app_state, &order).await;
      }
      match result {
        Err(e) => Err(e),
        Ok(_) => Err(AppError::FlowHalted),
      }
    }
  }
}

async fn abandon_order(app_state: &AppState, order: &Order) {
  let update = OrderUpdate::to(OrderStatus::Cancelled).with_reason("Payment initialization failed");
  match app_state.store.transition_order(order.id, OrderStatus::Pending, &update).await {
    Ok(_) => info!(order_id = %order.id, "Abandoned pending order cancelled."),
    Err(e) => error!(order_id = %order.id, error = %e, "Failed to cancel abandoned order."),
  }
}
