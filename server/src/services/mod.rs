// server/src/services/mod.rs

//! Clients for external services plus the in-process helpers around them.

pub mod courier;
pub mod email;
pub mod health_cache;
pub mod notifications;
pub mod paystack;
pub mod purchase_guard;
pub mod retry;
