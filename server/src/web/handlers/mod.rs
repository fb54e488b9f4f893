// server/src/web/handlers/mod.rs

pub mod book_handlers;
pub mod courier_handlers;
pub mod email_handlers;
pub mod health_handlers;
pub mod notification_handlers;
pub mod order_handlers;
pub mod payment_handlers;
pub mod subaccount_handlers;
