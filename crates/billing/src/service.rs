//! Provider seat service
//!
//! Owns the collaborators every seat workflow needs. The workflows themselves
//! live in `assignment` and `seat_minimum`.

use std::future::Future;
use std::sync::Arc;

use seatpool_shared::{PlanTier, ProviderId, ProviderType};
use sqlx::PgPool;

use crate::accessor::AssignmentAccessor;
use crate::billed::BilledQuantities;
use crate::client::{ProviderPriceIds, StripeClient};
use crate::config::SeatBillingConfig;
use crate::error::{BillingError, BillingResult};
use crate::engine::LineItemUpdate;
use crate::gateway::{GatewaySubscriptionAdapter, LineItemQuantity, StripeSubscriptionAdapter};
use crate::ledger::{ConfiguredTierSummary, SeatLedger};
use crate::locks::SeatLocks;
use crate::models::{ClientOrganization, Provider};
use crate::persistence::PersistenceGateway;
use crate::postgres::PgSeatStore;

/// Seat allocation and billing reconciliation for providers
#[derive(Clone)]
pub struct ProviderSeatService {
    pub(crate) accessor: Arc<dyn AssignmentAccessor>,
    pub(crate) gateway: Arc<dyn GatewaySubscriptionAdapter>,
    pub(crate) store: Arc<dyn PersistenceGateway>,
    pub(crate) price_ids: ProviderPriceIds,
    pub(crate) locks: SeatLocks,
    pub(crate) billed: BilledQuantities,
    pub(crate) config: SeatBillingConfig,
}

impl ProviderSeatService {
    pub fn new(
        accessor: Arc<dyn AssignmentAccessor>,
        gateway: Arc<dyn GatewaySubscriptionAdapter>,
        store: Arc<dyn PersistenceGateway>,
        price_ids: ProviderPriceIds,
        config: SeatBillingConfig,
    ) -> Self {
        Self {
            accessor,
            gateway,
            store,
            price_ids,
            locks: SeatLocks::new(),
            billed: BilledQuantities::new(),
            config,
        }
    }

    /// PostgreSQL storage with Stripe line items
    pub fn postgres(pool: PgPool, stripe: StripeClient, config: SeatBillingConfig) -> Self {
        let store = Arc::new(PgSeatStore::new(pool));
        let price_ids = stripe.config().price_ids.clone();
        let gateway = Arc::new(StripeSubscriptionAdapter::new(stripe, config.clone()));

        Self::new(store.clone(), gateway, store, price_ids, config)
    }

    /// Configured tiers with their billed quantities
    pub async fn seat_summary(&self, provider: &Provider) -> BillingResult<Vec<ConfiguredTierSummary>> {
        let ledgers = self.store.read_ledgers(provider.id).await?;
        Ok(ledgers
            .iter()
            .filter_map(ConfiguredTierSummary::from_ledger)
            .collect())
    }

    /// Set up a pooled tier for a provider. Nothing is billed until seats are
    /// assigned above the minimum, so the gateway is not called.
    pub async fn configure_plan_tier(
        &self,
        provider: &Provider,
        plan_tier: PlanTier,
        seat_minimum: i32,
    ) -> BillingResult<SeatLedger> {
        provider.ensure_pooled_billing()?;

        if !plan_tier.supports_pooled_billing() {
            return Err(BillingError::Validation(format!(
                "Plan tier {} does not support pooled provider billing",
                plan_tier
            )));
        }
        if seat_minimum < 0 {
            return Err(BillingError::Validation(
                "Provider seat minimums must be at least 0".to_string(),
            ));
        }

        let _guard = self.locks.lock(provider.id, plan_tier).await;

        let stored = match self.store.read_ledger(provider.id, plan_tier).await? {
            Some(existing) if existing.is_configured() => {
                return Err(BillingError::Validation(format!(
                    "Provider {} already has a {} plan",
                    provider.id, plan_tier
                )));
            }
            Some(mut existing) => {
                existing.seat_minimum = Some(seat_minimum);
                self.store.replace_ledger(&existing).await?
            }
            None => {
                self.store
                    .insert_ledger(&SeatLedger::new(provider.id, plan_tier, seat_minimum))
                    .await?
            }
        };

        tracing::info!(
            provider_id = %provider.id,
            plan_tier = %plan_tier,
            seat_minimum = seat_minimum,
            "Provider plan tier configured"
        );

        Ok(stored)
    }

    /// Tier a client organization's seats are drawn from when it is managed
    pub(crate) async fn managed_tier(
        &self,
        provider: &Provider,
        organization: &ClientOrganization,
    ) -> BillingResult<PlanTier> {
        if provider.provider_type == ProviderType::BusinessUnit {
            // Business units bill every organization on their first configured
            // plan in tier order, whatever order the store returns them in
            let ledgers = self.store.read_ledgers(provider.id).await?;
            return ledgers
                .iter()
                .filter(|ledger| ledger.is_configured())
                .map(|ledger| ledger.plan_tier)
                .min()
                .ok_or_else(|| {
                    BillingError::Configuration(format!(
                        "Business unit {} has no configured plan",
                        provider.id
                    ))
                });
        }

        organization.plan_tier.managed_tier().ok_or_else(|| {
            BillingError::Validation(format!(
                "Organization {} is on the {} plan, which cannot be managed by a provider",
                organization.id,
                organization.plan_tier.display_name()
            ))
        })
    }

    /// Read the tier's ledger, failing if it was never configured
    pub(crate) async fn configured_ledger(
        &self,
        provider_id: ProviderId,
        plan_tier: PlanTier,
    ) -> BillingResult<SeatLedger> {
        let ledger = self
            .store
            .read_ledger(provider_id, plan_tier)
            .await?
            .ok_or_else(|| {
                BillingError::Configuration(format!(
                    "Provider {} has no {} plan configured",
                    provider_id, plan_tier
                ))
            })?;
        ledger.configured_minimum()?;
        Ok(ledger)
    }

    /// Quantity to send for a tier about to be persisted at `billed`.
    ///
    /// The decided quantity wins. Without one, the ledger's billed quantity
    /// is re-sent when an earlier call (a lost revision race or a failed
    /// write) may have left the line item elsewhere.
    pub(crate) fn line_item_for(
        &self,
        provider_id: ProviderId,
        plan_tier: PlanTier,
        decided: Option<i32>,
        billed: i32,
    ) -> Option<LineItemUpdate> {
        let quantity = decided.or_else(|| {
            self.billed
                .needs_resync(provider_id, plan_tier, billed)
                .then(|| {
                    tracing::warn!(
                        provider_id = %provider_id,
                        plan_tier = %plan_tier,
                        last_sent = ?self.billed.last_sent(provider_id, plan_tier),
                        billed_quantity = billed,
                        "Line item may not match ledger - re-sending billed quantity"
                    );
                    billed
                })
        })?;

        Some(LineItemUpdate {
            plan_tier,
            quantity,
        })
    }

    /// Set line item quantities in one gateway call, tracking what was sent
    pub(crate) async fn push_line_items(
        &self,
        provider: &Provider,
        items: &[LineItemUpdate],
    ) -> BillingResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let subscription_id = provider.subscription_id()?;
        let updates = items
            .iter()
            .map(|item| {
                self.price_ids
                    .price_id_for_tier(item.plan_tier)
                    .map(|price_id| LineItemQuantity::new(price_id, item.quantity))
            })
            .collect::<BillingResult<Vec<_>>>()?;

        for item in items {
            self.billed.mark_pending(provider.id, item.plan_tier);
        }

        let result = match updates.as_slice() {
            [single] => self
                .gateway
                .set_line_item_quantity(subscription_id, &single.price_id, single.quantity)
                .await
                .map(|_| ()),
            _ => self
                .gateway
                .set_line_item_quantities(subscription_id, &updates)
                .await
                .map(|_| ()),
        };

        if let Err(e) = result {
            tracing::error!(
                provider_id = %provider.id,
                line_items = items.len(),
                error = %e,
                "Failed to update seat line items - ledger left unchanged"
            );
            return Err(e);
        }

        for item in items {
            self.billed.record(provider.id, item.plan_tier, item.quantity);
        }
        Ok(())
    }

    /// Re-run a whole read-decide-call-persist cycle while it loses revision races
    pub(crate) async fn retry_on_conflict<T, F, Fut>(
        &self,
        provider_id: ProviderId,
        operation: &'static str,
        attempt: F,
    ) -> BillingResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = BillingResult<T>>,
    {
        let mut conflicts = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_conflict() && conflicts < self.config.max_conflict_retries => {
                    conflicts += 1;
                    tracing::warn!(
                        provider_id = %provider_id,
                        operation = operation,
                        attempt = conflicts,
                        error = %e,
                        "Seat ledger changed concurrently - retrying"
                    );
                }
                result => return result,
            }
        }
    }
}
