// server/src/web/handlers/book_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::BookFilter;
use crate::state::AppState;

#[instrument(name = "handler::list_books", skip(app_state))]
pub async fn list_books_handler(
  app_state: web::Data<AppState>,
  filter: web::Query<BookFilter>,
) -> Result<HttpResponse, AppError> {
  let books = app_state.store.list_books(&filter).await?;
  info!(count = books.len(), "Books listed.");
  Ok(HttpResponse::Ok().json(json!({ "books": books })))
}

#[instrument(name = "handler::get_book", skip(app_state, path), fields(book_id = %path.as_ref()))]
pub async fn get_book_handler(app_state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, AppError> {
  let book_id = path.into_inner();
  let book = app_state
    .store
    .get_book(book_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))?;
  Ok(HttpResponse::Ok().json(book))
}
