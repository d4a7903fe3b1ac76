//! Stripe client configuration

use seatpool_shared::PlanTier;
use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Price IDs for each pooled provider tier
    pub price_ids: ProviderPriceIds,
}

/// Stripe price IDs for provider seat line items.
/// A provider subscription carries one item per configured tier; the item is
/// located by its price.
#[derive(Debug, Clone, Default)]
pub struct ProviderPriceIds {
    pub teams_monthly: String,
    pub enterprise_monthly: String,
}

impl ProviderPriceIds {
    /// Get the price ID billed for a pooled tier
    pub fn price_id_for_tier(&self, tier: PlanTier) -> BillingResult<&str> {
        let price_id = match tier {
            PlanTier::TeamsMonthly => self.teams_monthly.as_str(),
            PlanTier::EnterpriseMonthly => self.enterprise_monthly.as_str(),
            other => {
                return Err(BillingError::Validation(format!(
                    "Plan tier {} does not support pooled provider billing",
                    other
                )))
            }
        };

        if price_id.is_empty() {
            return Err(BillingError::Configuration(format!(
                "No provider price configured for plan tier {}",
                tier
            )));
        }

        Ok(price_id)
    }
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Configuration("STRIPE_SECRET_KEY not set".to_string()))?,
            price_ids: ProviderPriceIds {
                teams_monthly: std::env::var("STRIPE_PROVIDER_PRICE_TEAMS_MONTHLY").map_err(|_| {
                    BillingError::Configuration(
                        "STRIPE_PROVIDER_PRICE_TEAMS_MONTHLY not set".to_string(),
                    )
                })?,
                enterprise_monthly: std::env::var("STRIPE_PROVIDER_PRICE_ENTERPRISE_MONTHLY")
                    .map_err(|_| {
                        BillingError::Configuration(
                            "STRIPE_PROVIDER_PRICE_ENTERPRISE_MONTHLY not set".to_string(),
                        )
                    })?,
            },
        })
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
