// server/src/jobs/mod.rs

//! Periodic background work started by the server binary.

pub mod commit_deadline;

pub use commit_deadline::{spawn_commit_deadline_sweeper, sweep_overdue_orders, SweepReport};
