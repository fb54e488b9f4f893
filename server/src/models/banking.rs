// server/src/models/banking.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::{AppError, Result};

/// Universal branch codes of the banks sellers most often settle into.
pub const KNOWN_BANKS: &[(&str, &str)] = &[
  ("632005", "ABSA Bank"),
  ("470010", "Capitec Bank"),
  ("250655", "First National Bank"),
  ("198765", "Nedbank"),
  ("051001", "Standard Bank"),
  ("678910", "TymeBank"),
  ("430000", "African Bank"),
  ("462005", "Bidvest Bank"),
  ("679000", "Discovery Bank"),
];

pub fn bank_name_for_code(code: &str) -> Option<&'static str> {
  KNOWN_BANKS.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}

/// A seller's settlement account; one row per seller.
#[derive(Debug, Clone, FromRow)]
pub struct BankingDetails {
  pub id: Uuid,
  pub user_id: Uuid,
  pub business_name: String,
  pub email: String,
  pub bank_name: String,
  pub bank_code: String,
  pub account_number: String,
  pub subaccount_code: Option<String>,
  pub status: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankingDetailsInput {
  pub business_name: String,
  pub email: String,
  pub bank_code: String,
  pub account_number: String,
}

impl BankingDetailsInput {
  /// Trims every field and rejects values the gateway would refuse.
  pub fn validated(self) -> Result<Self> {
    let business_name = self.business_name.trim().to_string();
    let email = self.email.trim().to_string();
    let bank_code = self.bank_code.trim().to_string();
    let account_number: String = self.account_number.chars().filter(|c| !c.is_whitespace()).collect();

    if business_name.len() < 2 {
      return Err(AppError::Validation("Business name is required".to_string()));
    }
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
      return Err(AppError::Validation("A valid email address is required".to_string()));
    }
    if bank_code.is_empty() || !bank_code.chars().all(|c| c.is_ascii_digit()) {
      return Err(AppError::Validation("Bank code must be numeric".to_string()));
    }
    if !(6..=16).contains(&account_number.len()) || !account_number.chars().all(|c| c.is_ascii_digit()) {
      return Err(AppError::Validation(
        "Account number must be 6 to 16 digits".to_string(),
      ));
    }
    Ok(Self {
      business_name,
      email,
      bank_code,
      account_number,
    })
  }

  pub fn bank_name(&self) -> String {
    bank_name_for_code(&self.bank_code)
      .map(str::to_string)
      .unwrap_or_else(|| format!("Bank {}", self.bank_code))
  }
}

/// What a seller sees of their own banking details.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankingSummary {
  pub business_name: String,
  pub email: String,
  pub bank_name: String,
  pub account_number_masked: String,
  pub subaccount_code: Option<String>,
  pub status: String,
  pub updated_at: DateTime<Utc>,
}

pub fn mask_account_number(account_number: &str) -> String {
  let visible = account_number.len().min(4);
  let (hidden, shown) = account_number.split_at(account_number.len() - visible);
  format!("{}{}", "*".repeat(hidden.len()), shown)
}

impl From<&BankingDetails> for BankingSummary {
  fn from(details: &BankingDetails) -> Self {
    Self {
      business_name: details.business_name.clone(),
      email: details.email.clone(),
      bank_name: details.bank_name.clone(),
      account_number_masked: mask_account_number(&details.account_number),
      subaccount_code: details.subaccount_code.clone(),
      status: details.status.clone(),
      updated_at: details.updated_at,
    }
  }
}
