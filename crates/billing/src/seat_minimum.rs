//! Seat minimum changes
//!
//! A batch moves several tiers at once. All affected line items go to the
//! gateway in a single call and all ledgers are written in one transaction,
//! so a provider never ends up with half a batch applied.

use serde::Serialize;

use crate::engine::{self, LineItemUpdate};
use crate::error::BillingResult;
use crate::ledger::SeatLedger;
use crate::models::{Provider, SeatMinimumChange};
use crate::service::ProviderSeatService;

/// Result of a seat minimum batch
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SeatMinimumUpdate {
    /// Ledgers as persisted, for tiers whose minimum changed
    pub ledgers: Vec<SeatLedger>,
    /// Line item quantities sent to the gateway, in one call
    pub line_items: Vec<LineItemUpdate>,
}

impl SeatMinimumUpdate {
    pub fn is_noop(&self) -> bool {
        self.ledgers.is_empty()
    }
}

impl ProviderSeatService {
    /// Change the seat minimum of one or more tiers.
    ///
    /// Purchased seats are carried over when the new minimum still fits
    /// inside what is billed, so raising a minimum into already-bought seats
    /// does not change the invoice.
    pub async fn update_seat_minimums(
        &self,
        provider: &Provider,
        changes: &[SeatMinimumChange],
    ) -> BillingResult<SeatMinimumUpdate> {
        provider.ensure_pooled_billing()?;
        engine::validate_seat_minimum_changes(changes)?;

        if changes.is_empty() {
            return Ok(SeatMinimumUpdate::default());
        }

        let _guards = self
            .locks
            .lock_many(provider.id, changes.iter().map(|change| change.plan_tier))
            .await;

        self.retry_on_conflict(provider.id, "update_seat_minimums", || {
            self.update_seat_minimums_once(provider, changes)
        })
        .await
    }

    async fn update_seat_minimums_once(
        &self,
        provider: &Provider,
        changes: &[SeatMinimumChange],
    ) -> BillingResult<SeatMinimumUpdate> {
        let ledgers = self.store.read_ledgers(provider.id).await?;
        let plan = engine::change_seat_minimums(&ledgers, changes)?;

        // Every tier in the batch, changed or not, is checked against what
        // an earlier attempt may have sent
        let line_items: Vec<LineItemUpdate> = changes
            .iter()
            .filter_map(|change| {
                let ledger = plan
                    .ledgers
                    .iter()
                    .chain(ledgers.iter())
                    .find(|ledger| ledger.plan_tier == change.plan_tier)?;
                let decided = plan
                    .line_items
                    .iter()
                    .find(|item| item.plan_tier == change.plan_tier)
                    .map(|item| item.quantity);
                self.line_item_for(
                    provider.id,
                    change.plan_tier,
                    decided,
                    ledger.billed_quantity(),
                )
            })
            .collect();

        self.push_line_items(provider, &line_items).await?;

        if plan.is_noop() {
            tracing::debug!(provider_id = %provider.id, "Seat minimums unchanged");
            return Ok(SeatMinimumUpdate {
                ledgers: Vec::new(),
                line_items,
            });
        }

        let stored = self.store.replace_ledgers(&plan.ledgers).await?;

        for ledger in &stored {
            tracing::info!(
                provider_id = %provider.id,
                plan_tier = %ledger.plan_tier,
                seat_minimum = ledger.seat_minimum.unwrap_or(0),
                purchased_seats = ledger.purchased_seats,
                billed_quantity = ledger.billed_quantity(),
                "Provider seat minimum updated"
            );
        }

        Ok(SeatMinimumUpdate {
            ledgers: stored,
            line_items,
        })
    }

    /// Change a single tier's seat minimum
    pub async fn update_seat_minimum(
        &self,
        provider: &Provider,
        change: SeatMinimumChange,
    ) -> BillingResult<SeatLedger> {
        let update = self.update_seat_minimums(provider, &[change]).await?;

        if let Some(ledger) = update.ledgers.into_iter().next() {
            return Ok(ledger);
        }

        // Unchanged minimum: report the stored ledger
        self.configured_ledger(provider.id, change.plan_tier).await
    }
}
