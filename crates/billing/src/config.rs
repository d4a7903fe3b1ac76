//! Seat billing tunables
//!
//! Configurable via environment variables:
//! - `SEAT_BILLING_GATEWAY_MAX_RETRIES`: retries for transient gateway failures (default: 3)
//! - `SEAT_BILLING_GATEWAY_RETRY_BASE_MS`: first backoff delay, doubled on each retry (default: 200)
//! - `SEAT_BILLING_GATEWAY_RETRY_MAX_DELAY_MS`: backoff ceiling (default: 5000)
//! - `SEAT_BILLING_MAX_CONFLICT_RETRIES`: re-runs of a workflow after a ledger revision conflict (default: 3)

use std::time::Duration;

use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone)]
pub struct SeatBillingConfig {
    pub gateway_max_retries: usize,
    pub gateway_retry_base: Duration,
    pub gateway_retry_max_delay: Duration,
    pub max_conflict_retries: u32,
}

impl Default for SeatBillingConfig {
    fn default() -> Self {
        Self {
            gateway_max_retries: 3,
            gateway_retry_base: Duration::from_millis(200),
            gateway_retry_max_delay: Duration::from_millis(5_000),
            max_conflict_retries: 3,
        }
    }
}

impl SeatBillingConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> BillingResult<Self> {
        let defaults = Self::default();

        Ok(Self {
            gateway_max_retries: env_or("SEAT_BILLING_GATEWAY_MAX_RETRIES", defaults.gateway_max_retries)?,
            gateway_retry_base: Duration::from_millis(env_or(
                "SEAT_BILLING_GATEWAY_RETRY_BASE_MS",
                defaults.gateway_retry_base.as_millis() as u64,
            )?),
            gateway_retry_max_delay: Duration::from_millis(env_or(
                "SEAT_BILLING_GATEWAY_RETRY_MAX_DELAY_MS",
                defaults.gateway_retry_max_delay.as_millis() as u64,
            )?),
            max_conflict_retries: env_or(
                "SEAT_BILLING_MAX_CONFLICT_RETRIES",
                defaults.max_conflict_retries,
            )?,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> BillingResult<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BillingError::Configuration(format!("{} is not a valid number: {}", key, raw))),
        Err(_) => Ok(default),
    }
}
