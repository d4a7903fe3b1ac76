// Billing crate clippy configuration
#![allow(clippy::result_large_err)] // BillingError variants carry gateway messages
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Seatpool Billing Module
//!
//! Allocates seats from a provider's pool to its client organizations and
//! keeps the provider's Stripe subscription in step with the allocation.
//!
//! ## Features
//!
//! - **Seat Assignment**: Assign, add and remove client organization seats
//! - **Threshold Billing**: Bill the seat minimum, plus seats bought above it
//! - **Seat Minimums**: Change contractual minimums in one atomic batch
//! - **Concurrency**: Per-tier locks plus revision-checked ledger writes
//! - **Retries**: Backoff on transient Stripe failures, re-run on ledger conflicts

pub mod accessor;
pub mod assignment;
pub mod billed;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod locks;
pub mod memory;
pub mod models;
pub mod persistence;
pub mod postgres;
pub mod seat_minimum;
pub mod service;

// Collaborators
pub use accessor::AssignmentAccessor;
pub use gateway::{GatewaySubscriptionAdapter, LineItem, LineItemQuantity, StripeSubscriptionAdapter};
pub use persistence::{PersistenceGateway, SeatChange};
pub use postgres::PgSeatStore;

// In-memory collaborators
pub use memory::{GatewayCall, InMemorySeatStore, RecordingGateway};

// Client & config
pub use client::{ProviderPriceIds, StripeClient, StripeConfig};
pub use config::SeatBillingConfig;

// Error
pub use error::{BillingError, BillingResult, ErrorKind};

// Ledger & models
pub use ledger::{ConfiguredTierSummary, SeatLedger};
pub use models::{
    AssignmentChange, ClientOrganization, ClientOrganizationSeatAssignment, Provider,
    SeatMinimumChange,
};

// Engine
pub use engine::{LineItemUpdate, SeatMinimumPlan, SeatQuadrant, SeatScalingDecision};

// Workflows
pub use assignment::SeatAdjustment;
pub use billed::BilledQuantities;
pub use locks::SeatLocks;
pub use seat_minimum::SeatMinimumUpdate;
pub use service::ProviderSeatService;
