// server/src/pipelines/subaccount.rs

//! Registers or updates a seller's payout subaccount with the gateway and
//! stores the banking details it was created from.

use tracing::{info, instrument};
use uuid::Uuid;

use rebooked_flow::{Flow, FlowContext, FlowOutcome, FlowRegistry, StepControl, StepDef};

use crate::errors::{AppError, Result as AppResult};
use crate::models::{BankingDetailsInput, BankingSummary, NewNotification, NotificationKind};
use crate::pipelines::common_steps::{missing, notify_many};
use crate::pipelines::contexts::SubaccountCtxData;
use crate::services::paystack::SubaccountRequest;
use crate::state::AppState;

/// Percentage the gateway keeps for the platform on subaccount settlements.
pub const SUBACCOUNT_PERCENTAGE_CHARGE: f64 = 10.0;

pub fn register_subaccount_flow(registry: &FlowRegistry<AppError>) {
  let mut flow = Flow::<SubaccountCtxData, AppError>::new(
    "seller_subaccount",
    vec![
      StepDef::required("validate_banking_details"),
      StepDef::required("sync_gateway_subaccount"),
      StepDef::required("save_banking_details"),
      StepDef::optional("notify_seller"),
    ],
  );

  flow.on("validate_banking_details", |ctx: FlowContext<SubaccountCtxData>| async move {
    let (store, user_id, input) = ctx.with(|d| (d.app_state.store.clone(), d.user_id, d.input.clone()));
    let input = input.validated()?;
    let existing = store.get_banking_details(user_id).await?;
    let existing_code = match existing.as_ref().and_then(|e| e.subaccount_code.clone()) {
      Some(code) => Some(code),
      None => store.get_profile(user_id).await?.and_then(|p| p.subaccount_code),
    };
    ctx.update(|d| {
      d.input = input;
      d.existing = existing;
      d.existing_code = existing_code;
    });
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("sync_gateway_subaccount", |ctx: FlowContext<SubaccountCtxData>| async move {
    let (gateway, existing_code, request) = ctx.with(|d| {
      (
        d.app_state.gateway.clone(),
        d.existing_code.clone(),
        SubaccountRequest {
          business_name: d.input.business_name.clone(),
          settlement_bank: d.input.bank_code.clone(),
          account_number: d.input.account_number.clone(),
          percentage_charge: SUBACCOUNT_PERCENTAGE_CHARGE,
          primary_contact_email: Some(d.input.email.clone()),
        },
      )
    });

    let (subaccount, created) = match existing_code {
      Some(code) => (gateway.update_subaccount(&code, &request).await?, false),
      None => (gateway.create_subaccount(&request).await?, true),
    };
    info!(subaccount_code = %subaccount.subaccount_code, created, "Gateway subaccount synced.");
    ctx.update(|d| {
      d.subaccount = Some(subaccount);
      d.created = created;
    });
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("save_banking_details", |ctx: FlowContext<SubaccountCtxData>| async move {
    let (store, user_id, input, code) = ctx.with(|d| {
      (
        d.app_state.store.clone(),
        d.user_id,
        d.input.clone(),
        d.subaccount.as_ref().map(|s| s.subaccount_code.clone()),
      )
    });
    let code = code.ok_or_else(|| missing("subaccount"))?;
    let saved = store.upsert_banking_details(user_id, &input, &code).await?;
    store.set_profile_subaccount(user_id, &code).await?;
    ctx.write().saved = Some(saved);
    Ok::<_, AppError>(StepControl::Continue)
  });

  flow.on("notify_seller", |ctx: FlowContext<SubaccountCtxData>| async move {
    let (app_state, user_id, created) = ctx.with(|d| (d.app_state.clone(), d.user_id, d.created));
    let note = if created {
      NewNotification::new(
        user_id,
        NotificationKind::Success,
        "Banking details saved",
        "You can now receive payments for books you sell.",
      )
    } else {
      NewNotification::new(
        user_id,
        NotificationKind::Info,
        "Banking details updated",
        "Future payouts will go to your updated account.",
      )
    };
    notify_many(&app_state, vec![note]).await?;
    Ok::<_, AppError>(StepControl::Continue)
  });

  registry.register(flow);
}

/// Creates or updates the seller's subaccount and returns the masked details.
#[instrument(name = "flow::seller_subaccount", skip(app_state, input))]
pub async fn save_seller_subaccount(
  app_state: &AppState,
  user_id: Uuid,
  input: BankingDetailsInput,
) -> AppResult<BankingSummary> {
  let ctx = FlowContext::new(SubaccountCtxData {
    app_state: app_state.clone(),
    user_id,
    input,
    existing: None,
    existing_code: None,
    subaccount: None,
    saved: None,
    created: false,
  });

  match app_state.flows.run(ctx.clone()).await? {
    FlowOutcome::Completed => {
      let saved = ctx.with(|d| d.saved.clone()).ok_or_else(|| missing("saved"))?;
      Ok(BankingSummary::from(&saved))
    }
    FlowOutcome::Halted => Err(AppError::FlowHalted),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::services::paystack::{GatewayError, MockPaymentGateway, Subaccount};
  use crate::state::test_support::state_with;
  use crate::store::memory::MemoryStore;
  use crate::store::MarketplaceStore;
  use std::sync::Arc;

  fn input() -> BankingDetailsInput {
    BankingDetailsInput {
      business_name: "Thandi's Books".to_string(),
      email: "thandi@example.co.za".to_string(),
      bank_code: "470010".to_string(),
      account_number: "1234 5678 90".to_string(),
    }
  }

  fn subaccount(code: &str) -> Subaccount {
    Subaccount {
      subaccount_code: code.to_string(),
      business_name: "Thandi's Books".to_string(),
      settlement_bank: Some("Capitec Bank".to_string()),
      percentage_charge: Some(SUBACCOUNT_PERCENTAGE_CHARGE),
    }
  }

  #[tokio::test]
  async fn first_save_creates_subaccount_and_updates_profile() {
    let store = Arc::new(MemoryStore::new());
    let user_id = Uuid::new_v4();
    store.add_profile(user_id, "thandi@example.co.za", None);
    let mut gateway = MockPaymentGateway::new();
    gateway
      .expect_create_subaccount()
      .withf(|req| req.percentage_charge == 10.0 && req.account_number == "1234567890")
      .times(1)
      .returning(|_| Ok(subaccount("ACCT_new")));
    let state = state_with(store.clone(), gateway);

    let summary = save_seller_subaccount(&state, user_id, input()).await.unwrap();
    assert_eq!(summary.subaccount_code.as_deref(), Some("ACCT_new"));
    assert_eq!(summary.account_number_masked, "******7890");
    let profile = store.get_profile(user_id).await.unwrap().unwrap();
    assert_eq!(profile.subaccount_code.as_deref(), Some("ACCT_new"));
    assert_eq!(store.notifications_for(user_id)[0].title, "Banking details saved");
  }

  #[tokio::test]
  async fn second_save_updates_existing_subaccount() {
    let store = Arc::new(MemoryStore::new());
    let user_id = Uuid::new_v4();
    store.add_profile(user_id, "thandi@example.co.za", None);
    store.upsert_banking_details(user_id, &input(), "ACCT_old").await.unwrap();

    let mut gateway = MockPaymentGateway::new();
    gateway.expect_create_subaccount().never();
    gateway
      .expect_update_subaccount()
      .withf(|code, _| code == "ACCT_old")
      .times(1)
      .returning(|_, _| Ok(subaccount("ACCT_old")));
    let state = state_with(store.clone(), gateway);

    save_seller_subaccount(&state, user_id, input()).await.unwrap();
    assert_eq!(store.notifications_for(user_id)[0].title, "Banking details updated");
  }

  #[tokio::test]
  async fn code_kept_only_on_profile_is_updated_not_duplicated() {
    let store = Arc::new(MemoryStore::new());
    let user_id = Uuid::new_v4();
    store.add_profile(user_id, "thandi@example.co.za", Some("ACCT_profile"));

    let mut gateway = MockPaymentGateway::new();
    gateway.expect_create_subaccount().never();
    gateway
      .expect_update_subaccount()
      .withf(|code, _| code == "ACCT_profile")
      .times(1)
      .returning(|_, _| Ok(subaccount("ACCT_profile")));
    let state = state_with(store.clone(), gateway);

    let summary = save_seller_subaccount(&state, user_id, input()).await.unwrap();
    assert_eq!(summary.subaccount_code.as_deref(), Some("ACCT_profile"));
    let saved = store.get_banking_details(user_id).await.unwrap().unwrap();
    assert_eq!(saved.subaccount_code.as_deref(), Some("ACCT_profile"));
  }

  #[tokio::test]
  async fn invalid_details_never_reach_the_gateway() {
    let store = Arc::new(MemoryStore::new());
    let state = state_with(store, MockPaymentGateway::new());
    let mut bad = input();
    bad.account_number = "12AB".to_string();
    let err = save_seller_subaccount(&state, Uuid::new_v4(), bad).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
  }

  #[tokio::test]
  async fn gateway_rejection_saves_nothing() {
    let store = Arc::new(MemoryStore::new());
    let user_id = Uuid::new_v4();
    store.add_profile(user_id, "thandi@example.co.za", None);
    let mut gateway = MockPaymentGateway::new();
    gateway
      .expect_create_subaccount()
      .returning(|_| Err(GatewayError::Rejected("Account number is invalid".to_string())));
    let state = state_with(store.clone(), gateway);

    let err = save_seller_subaccount(&state, user_id, input()).await.unwrap_err();
    assert!(matches!(err, AppError::Payment(_)));
    assert!(store.get_banking_details(user_id).await.unwrap().is_none());
  }
}
