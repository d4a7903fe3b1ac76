//! Subscription line item quantities
//!
//! Each pooled plan tier is one line item on the provider's Stripe
//! subscription, located by its price. Setting a quantity is idempotent, so
//! transient failures (timeouts, rate limits, 5xx) are retried with
//! exponential backoff before the error is surfaced.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use stripe::{SubscriptionId, UpdateSubscription, UpdateSubscriptionItems};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::client::StripeClient;
use crate::config::SeatBillingConfig;
use crate::error::{BillingError, BillingResult};

/// A subscription line item as the gateway reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub item_id: String,
    pub price_id: String,
    pub quantity: i32,
}

/// Target quantity for the line item billed at `price_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItemQuantity {
    pub price_id: String,
    pub quantity: i32,
}

impl LineItemQuantity {
    pub fn new(price_id: impl Into<String>, quantity: i32) -> Self {
        Self {
            price_id: price_id.into(),
            quantity,
        }
    }
}

/// Sets billed quantities on a provider's subscription
#[async_trait]
pub trait GatewaySubscriptionAdapter: Send + Sync {
    /// Set a single line item's quantity
    async fn set_line_item_quantity(
        &self,
        subscription_id: &str,
        price_id: &str,
        quantity: i32,
    ) -> BillingResult<LineItem> {
        let updated = self
            .set_line_item_quantities(subscription_id, &[LineItemQuantity::new(price_id, quantity)])
            .await?;

        updated.into_iter().next().ok_or_else(|| {
            BillingError::Gateway(format!(
                "Subscription {} returned no line item for price {}",
                subscription_id, price_id
            ))
        })
    }

    /// Set several line items' quantities in one round trip
    async fn set_line_item_quantities(
        &self,
        subscription_id: &str,
        updates: &[LineItemQuantity],
    ) -> BillingResult<Vec<LineItem>>;
}

/// Stripe-backed line item updates
#[derive(Clone)]
pub struct StripeSubscriptionAdapter {
    stripe: StripeClient,
    config: SeatBillingConfig,
}

impl StripeSubscriptionAdapter {
    pub fn new(stripe: StripeClient, config: SeatBillingConfig) -> Self {
        Self { stripe, config }
    }

    /// Run a Stripe call, retrying transient failures only
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, call: F) -> BillingResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, stripe::StripeError>>,
    {
        let strategy = backoff_delays(&self.config).map(jitter);

        let outcome = Retry::spawn(strategy, || {
            let attempt = call();
            async move {
                match attempt.await {
                    Ok(value) => Ok(Ok(value)),
                    Err(e) if is_transient(&e) => {
                        tracing::warn!(
                            operation = operation,
                            error = %e,
                            "Transient Stripe error - will retry"
                        );
                        Err(e)
                    }
                    // Wrapped in Ok to stop retrying
                    Err(e) => Ok(Err(e)),
                }
            }
        })
        .await;

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) | Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl GatewaySubscriptionAdapter for StripeSubscriptionAdapter {
    async fn set_line_item_quantities(
        &self,
        subscription_id: &str,
        updates: &[LineItemQuantity],
    ) -> BillingResult<Vec<LineItem>> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }

        let sub_id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|e| BillingError::Configuration(format!("Invalid subscription ID: {}", e)))?;

        let client = self.stripe.inner();

        let subscription = self
            .with_retry("retrieve_subscription", || {
                stripe::Subscription::retrieve(client, &sub_id, &[])
            })
            .await?;

        let mut items = Vec::with_capacity(updates.len());
        for update in updates {
            if update.quantity < 0 {
                return Err(BillingError::Validation(format!(
                    "Line item quantity must be at least 0 (price {})",
                    update.price_id
                )));
            }

            let item = subscription
                .items
                .data
                .iter()
                .find(|item| {
                    item.price
                        .as_ref()
                        .map(|p| p.id.as_str() == update.price_id)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    BillingError::Configuration(format!(
                        "Subscription {} has no line item for price {}",
                        subscription_id, update.price_id
                    ))
                })?;

            items.push(UpdateSubscriptionItems {
                id: Some(item.id.to_string()),
                price: Some(update.price_id.clone()),
                quantity: Some(update.quantity as u64),
                ..Default::default()
            });
        }

        let mut params = UpdateSubscription::new();
        params.items = Some(items);

        let updated = self
            .with_retry("update_subscription_items", || {
                stripe::Subscription::update(client, &sub_id, params.clone())
            })
            .await?;

        tracing::info!(
            subscription_id = %subscription_id,
            line_items = updates.len(),
            "Updated subscription line item quantities"
        );

        Ok(updates
            .iter()
            .filter_map(|update| {
                updated
                    .items
                    .data
                    .iter()
                    .find(|item| {
                        item.price
                            .as_ref()
                            .map(|p| p.id.as_str() == update.price_id)
                            .unwrap_or(false)
                    })
                    .map(|item| LineItem {
                        item_id: item.id.to_string(),
                        price_id: update.price_id.clone(),
                        quantity: item.quantity.map(|q| q as i32).unwrap_or(update.quantity),
                    })
            })
            .collect())
    }
}

/// Delays before each retry: the base, then doubling up to the ceiling.
/// `from_millis` is the growth rate and `factor` scales it, so 2 with a
/// factor of half the base yields base, 2 * base, 4 * base.
fn backoff_delays(config: &SeatBillingConfig) -> impl Iterator<Item = Duration> {
    let base_ms = config.gateway_retry_base.as_millis().max(2) as u64;

    ExponentialBackoff::from_millis(2)
        .factor(base_ms / 2)
        .max_delay(config.gateway_retry_max_delay)
        .take(config.gateway_max_retries)
}

/// Rate limits, server errors, timeouts and connection failures are safe to
/// retry because the update only ever sets an absolute quantity.
fn is_transient(error: &stripe::StripeError) -> bool {
    match error {
        stripe::StripeError::Stripe(request) => {
            request.http_status == 429 || (500..600).contains(&request.http_status)
        }
        stripe::StripeError::Timeout | stripe::StripeError::ClientError(_) => true,
        _ => false,
    }
}
