// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Seat Pool Shared Types and Utilities
//!
//! Identifiers, plan tiers and database helpers shared by the seat pool crates.

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
