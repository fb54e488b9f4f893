// server/src/pipelines/order_commit.rs

//! Seller commits to a paid order. When the order has a courier and the seller
//! gives a pickup address, the shipment is booked straight away through the
//! courier's own sub-flow. A failed booking leaves the order committed and is
//! reported back so the seller can retry later.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use rebooked_flow::{Flow, FlowContext, FlowOutcome, FlowRegistry, StepControl, StepDef};

use crate::errors::{AppError, Result as AppResult};
use crate::models::{
  Address, CourierKind, NewNotification, NotificationKind, Order, OrderStatus, OrderUpdate, Parcel, Quote,
  QuoteOption, QuoteRequest, Shipment, ShipmentRequest,
};
use crate::pipelines::common_steps::{email_user, missing, notify_many};
use crate::pipelines::contexts::{CommitOrderCtxData, ShipmentCtxData};
use crate::services::email;
use crate::state::AppState;

/// Fastway's standard parcel label; used whenever the lookup offers it.
const FASTWAY_PARCEL_SERVICE: &str = "PARCEL";

pub fn register_commit_order_flow(registry: &FlowRegistry<AppError>) {
  let courier_guy = Arc::new(courier_guy_shipment_flow());
  let fastway = Arc::new(fastway_shipment_flow());

  let mut flow = Flow::<CommitOrderCtxData, AppError>::new(
    "commit_order",
    vec![
      StepDef::required("load_order"),
      StepDef::required("check_commit_allowed"),
      StepDef::required("mark_committed"),
      StepDef::optional("dispatch_shipment").skip_when(|d: &CommitOrderCtxData| !d.can_dispatch()),
      StepDef::optional("notify_buyer"),
    ],
  );

  flow.on("load_order", |ctx: FlowContext<CommitOrderCtxData>| async move {
    let (store, order_id, seller_id) = ctx.with(|d| (d.app_state.store.clone(), d.order_id, d.seller_id));
    let order = store
      .get_order(order_id)
      .await?
      .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
    if order.seller_id != seller_id {
      return Err(AppError::Forbidden("Only the seller can commit to this order".to_string()));
    }
    ctx.write().order = Some(order);
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("check_commit_allowed", |ctx: FlowContext<CommitOrderCtxData>| async move {
    let order = ctx.with(|d| d.order.clone()).ok_or_else(|| missing("order"))?;
    if order.status != OrderStatus::Paid {
      return Err(AppError::Conflict(format!(
        "Order is {} and can no longer be committed",
        order.status
      )));
    }
    if order.commit_deadline_passed(Utc::now()) {
      return Err(AppError::Conflict("The 48-hour commit deadline has passed".to_string()));
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("mark_committed", |ctx: FlowContext<CommitOrderCtxData>| async move {
    let (store, order_id) = ctx.with(|d| (d.app_state.store.clone(), d.order_id));
    let committed = store
      .transition_order(order_id, OrderStatus::Paid, &OrderUpdate::to(OrderStatus::Committed))
      .await?
      .ok_or_else(|| AppError::Conflict("Order changed while committing; please refresh".to_string()))?;
    info!(%order_id, "Order committed by seller.");
    ctx.write().order = Some(committed);
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.before("dispatch_shipment", |ctx: FlowContext<CommitOrderCtxData>| async move {
    let shipment_ctx = {
      let guard = ctx.read();
      let order = guard.order.as_ref().ok_or_else(|| missing("order"))?;
      let courier = guard.courier().ok_or_else(|| missing("courier"))?;
      let collection = guard.pickup_address.clone().ok_or_else(|| missing("pickup_address"))?;
      let delivery = order.delivery_address.clone().ok_or_else(|| missing("delivery_address"))?;
      ShipmentCtxData {
        couriers: guard.app_state.couriers.clone(),
        courier,
        request: ShipmentRequest {
          order_reference: order.payment_reference.clone(),
          route: QuoteRequest {
            collection,
            delivery: delivery.0,
            parcel: Parcel::default(),
            declared_value_cents: order.book_price_cents,
          },
          service_code: guard.service_code.clone(),
        },
        quote: None,
        shipment: None,
        error: None,
      }
    };
    ctx.write().shipment_ctx = Some(FlowContext::new(shipment_ctx));
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow
    .branch("dispatch_shipment")
    .when(
      "courier_guy",
      |d: &CommitOrderCtxData| d.courier() == Some(CourierKind::CourierGuy),
      courier_guy,
      extract_shipment_ctx,
    )
    .when(
      "fastway",
      |d: &CommitOrderCtxData| d.courier() == Some(CourierKind::Fastway),
      fastway,
      extract_shipment_ctx,
    )
    .finish();

  flow.after("dispatch_shipment", |ctx: FlowContext<CommitOrderCtxData>| async move {
    let (store, order_id, shipment) = ctx.with(|d| {
      (
        d.app_state.store.clone(),
        d.order_id,
        d.shipment_ctx.as_ref().and_then(|s| s.with(|s| s.shipment.clone())),
      )
    });
    let shipment = shipment.ok_or_else(|| missing("shipment"))?;
    let update = OrderUpdate::to(OrderStatus::Shipped).with_tracking_number(shipment.tracking_number.clone());
    let shipped = store
      .transition_order(order_id, OrderStatus::Committed, &update)
      .await?
      .ok_or_else(|| AppError::Conflict("Order changed while booking the shipment".to_string()))?;
    info!(%order_id, tracking_number = %shipment.tracking_number, simulated = shipment.simulated, "Order shipped.");
    ctx.update(|d| {
      d.order = Some(shipped);
      d.shipment = Some(shipment);
    });
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("notify_buyer", |ctx: FlowContext<CommitOrderCtxData>| async move {
    let (app_state, order, shipment) = ctx.with(|d| (d.app_state.clone(), d.order.clone(), d.shipment.clone()));
    let order = order.ok_or_else(|| missing("order"))?;
    let note = match &shipment {
      Some(s) => NewNotification::new(
        order.buyer_id,
        NotificationKind::Success,
        "Your book has shipped",
        format!("Order {} is on its way. Tracking number: {}", order.payment_reference, s.tracking_number),
      ),
      None => NewNotification::new(
        order.buyer_id,
        NotificationKind::Info,
        "Order confirmed",
        format!(
          "The seller has committed to order {} and will arrange delivery.",
          order.payment_reference
        ),
      ),
    };
    notify_many(&app_state, vec![note]).await?;
    if let Some(s) = shipment {
      email_user(&app_state, order.buyer_id, |to| {
        email::order_shipped(to, &order, &s.tracking_number)
      })
      .await?;
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  registry.register(flow);
}

/// Keeps the booking error on the sub-context before handing it to the flow.
fn remember_failure(ctx: &FlowContext<ShipmentCtxData>, err: impl Into<AppError>) -> AppError {
  let err = err.into();
  ctx.write().error = Some(err.to_string());
  err
}

fn extract_shipment_ctx(ctx: &FlowContext<CommitOrderCtxData>) -> anyhow::Result<FlowContext<ShipmentCtxData>> {
  ctx
    .with(|d| d.shipment_ctx.clone())
    .ok_or_else(|| anyhow::anyhow!("shipment context was not prepared"))
}

/// Picks the requested service when the quote offers it, else `fallback_pick`.
fn choose_option<'q>(
  quote: &'q Quote,
  requested: Option<&str>,
  fallback_pick: impl FnOnce(&'q Quote) -> Option<&'q QuoteOption>,
) -> Option<&'q QuoteOption> {
  requested
    .and_then(|code| quote.options.iter().find(|o| o.service_code == code))
    .or_else(|| fallback_pick(quote))
}

/// Courier Guy: request rates, take the requested or cheapest service, then book.
fn courier_guy_shipment_flow() -> Flow<ShipmentCtxData, AppError> {
  let mut flow = Flow::<ShipmentCtxData, AppError>::new(
    "courier_guy_shipment",
    vec![StepDef::required("request_rates"), StepDef::required("create_shipment")],
  );

  flow.on("request_rates", |ctx: FlowContext<ShipmentCtxData>| async move {
    let (couriers, route, requested) =
      ctx.with(|d| (d.couriers.clone(), d.request.route.clone(), d.request.service_code.clone()));
    let quote = couriers
      .get(CourierKind::CourierGuy)?
      .quote(&route)
      .await
      .map_err(|e| remember_failure(&ctx, e))?;
    let service = choose_option(&quote, requested.as_deref(), Quote::cheapest)
      .map(|o| o.service_code.clone())
      .ok_or_else(|| remember_failure(&ctx, AppError::Gateway("The Courier Guy returned no rates".to_string())))?;
    ctx.update(|d| {
      d.request.service_code = Some(service);
      d.quote = Some(quote);
    });
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("create_shipment", |ctx: FlowContext<ShipmentCtxData>| async move {
    let (couriers, request) = ctx.with(|d| (d.couriers.clone(), d.request.clone()));
    let shipment = couriers
      .get(CourierKind::CourierGuy)?
      .create_shipment(&request)
      .await
      .map_err(|e| remember_failure(&ctx, e))?;
    ctx.write().shipment = Some(shipment);
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow
}

/// Fastway: look up the label for the route (prefer a standard parcel), then lodge the consignment.
fn fastway_shipment_flow() -> Flow<ShipmentCtxData, AppError> {
  let mut flow = Flow::<ShipmentCtxData, AppError>::new(
    "fastway_shipment",
    vec![StepDef::required("lookup_label"), StepDef::required("create_consignment")],
  );

  flow.on("lookup_label", |ctx: FlowContext<ShipmentCtxData>| async move {
    let (couriers, route, requested) =
      ctx.with(|d| (d.couriers.clone(), d.request.route.clone(), d.request.service_code.clone()));
    let quote = couriers
      .get(CourierKind::Fastway)?
      .quote(&route)
      .await
      .map_err(|e| remember_failure(&ctx, e))?;
    let service = choose_option(&quote, requested.as_deref(), |q| {
      q.options
        .iter()
        .find(|o| o.service_code == FASTWAY_PARCEL_SERVICE)
        .or_else(|| q.cheapest())
    })
    .map(|o| o.service_code.clone())
    .ok_or_else(|| remember_failure(&ctx, AppError::Gateway("Fastway returned no labels for this route".to_string())))?;
    ctx.update(|d| {
      d.request.service_code = Some(service);
      d.quote = Some(quote);
    });
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("create_consignment", |ctx: FlowContext<ShipmentCtxData>| async move {
    let (couriers, request) = ctx.with(|d| (d.couriers.clone(), d.request.clone()));
    let shipment = couriers
      .get(CourierKind::Fastway)?
      .create_shipment(&request)
      .await
      .map_err(|e| remember_failure(&ctx, e))?;
    ctx.write().shipment = Some(shipment);
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow
}

#[derive(Debug, Clone)]
pub struct CommitOrderRequest {
  pub order_id: Uuid,
  pub seller_id: Uuid,
  pub pickup_address: Option<Address>,
  pub service_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedOrder {
  pub order: Order,
  pub shipment: Option<Shipment>,
  /// Set when a shipment was requested but could not be booked.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub dispatch_error: Option<String>,
}

#[instrument(name = "flow::commit_order", skip(app_state, request), fields(order_id = %request.order_id))]
pub async fn commit_order(app_state: &AppState, request: CommitOrderRequest) -> AppResult<CommittedOrder> {
  if let Some(pickup) = &request.pickup_address {
    pickup.validate().map_err(AppError::Validation)?;
  }
  let ctx = FlowContext::new(CommitOrderCtxData {
    app_state: app_state.clone(),
    order_id: request.order_id,
    seller_id: request.seller_id,
    pickup_address: request.pickup_address,
    service_code: request.service_code,
    order: None,
    shipment_ctx: None,
    shipment: None,
  });

  match app_state.flows.run(ctx.clone()).await? {
    FlowOutcome::Completed => {
      let (order, shipment, sub_ctx) = ctx.with(|d| (d.order.clone(), d.shipment.clone(), d.shipment_ctx.clone()));
      let dispatch_error = match (&shipment, sub_ctx) {
        (None, Some(sub)) => Some(
          sub
            .with(|s| s.error.clone())
            .unwrap_or_else(|| "The shipment could not be booked".to_string()),
        ),
        _ => None,
      };
      if let Some(reason) = &dispatch_error {
        warn!(%reason, "Order committed without a shipment.");
      }
      Ok(CommittedOrder {
        order: order.ok_or_else(|| missing("order"))?,
        shipment,
        dispatch_error,
      })
    }
    FlowOutcome::Halted => Err(AppError::FlowHalted),
  }
}
