// src/branch/mod.rs

//! Branch steps: run one of several sub-flows depending on the context.

mod arm;
pub mod builder;

pub use builder::BranchBuilder;
