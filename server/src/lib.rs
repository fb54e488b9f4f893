// server/src/lib.rs

//! ReBooked marketplace service: used-textbook listings, split payments to
//! sellers, courier dispatch and the order lifecycle around them.

pub mod config;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod store;
pub mod web;
