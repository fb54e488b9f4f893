// server/src/models/book.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Book {
  pub id: Uuid,
  pub seller_id: Uuid,
  pub title: String,
  pub author: String,
  pub isbn: Option<String>,
  pub condition: String,
  pub category: Option<String>,
  pub price_cents: i64,
  pub image_url: Option<String>,
  pub province: Option<String>,
  pub sold: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Query-string filter for the public listing. Every field narrows the result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookFilter {
  pub search: Option<String>,
  pub category: Option<String>,
  pub province: Option<String>,
  pub max_price_cents: Option<i64>,
  pub seller_id: Option<Uuid>,
  #[serde(default)]
  pub include_sold: bool,
}

impl BookFilter {
  pub fn matches(&self, book: &Book) -> bool {
    if book.sold && !self.include_sold {
      return false;
    }
    if let Some(search) = self.search.as_deref().map(str::to_lowercase) {
      let in_title = book.title.to_lowercase().contains(&search);
      let in_author = book.author.to_lowercase().contains(&search);
      let in_isbn = book.isbn.as_deref().is_some_and(|isbn| isbn.contains(&search));
      if !(in_title || in_author || in_isbn) {
        return false;
      }
    }
    if let Some(category) = &self.category {
      if book.category.as_deref() != Some(category.as_str()) {
        return false;
      }
    }
    if let Some(province) = &self.province {
      if book.province.as_deref() != Some(province.as_str()) {
        return false;
      }
    }
    if let Some(max) = self.max_price_cents {
      if book.price_cents > max {
        return false;
      }
    }
    if let Some(seller_id) = self.seller_id {
      if book.seller_id != seller_id {
        return false;
      }
    }
    true
  }
}
