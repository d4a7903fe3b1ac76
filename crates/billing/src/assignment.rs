//! Seat assignment workflows
//!
//! Every change to the seats a provider hands out runs the same cycle under
//! the tier lock:
//! 1. Read the ledger and the occupied seat total
//! 2. Decide the new ledger state and line item quantity
//! 3. Set the quantity on the gateway
//! 4. Persist the ledger together with the organization and its link
//!
//! A gateway failure stops the cycle before anything is persisted. Losing a
//! revision race at step 4 re-runs the whole cycle; the gateway call is an
//! absolute quantity, so repeating it is harmless. Once a quantity has been
//! sent for the tier, any later cycle whose ledger bills something else sends
//! the ledger's billed quantity even when its own decision needs no call.

use seatpool_shared::{OrganizationStatus, PlanTier, ProviderId};
use serde::Serialize;

use crate::engine::{self, SeatQuadrant};
use crate::error::{BillingError, BillingResult};
use crate::ledger::SeatLedger;
use crate::models::{AssignmentChange, ClientOrganization, ClientOrganizationSeatAssignment, Provider};
use crate::persistence::SeatChange;
use crate::service::ProviderSeatService;

/// Result of a seat workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatAdjustment {
    pub provider_id: ProviderId,
    pub plan_tier: PlanTier,
    /// `None` when the seat total did not move
    pub quadrant: Option<SeatQuadrant>,
    pub previous_total: i32,
    pub new_total: i32,
    /// Quantity set on the gateway, if a call was made
    pub gateway_quantity: Option<i32>,
    /// Ledger as persisted (or as read, for a no-op)
    pub ledger: SeatLedger,
    /// Organization as persisted, for organization workflows
    pub organization: Option<ClientOrganization>,
}

impl SeatAdjustment {
    pub fn is_noop(&self) -> bool {
        self.quadrant.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
enum SeatTarget<'a> {
    Assign { organization: &'a ClientOrganization, seats: i32 },
    Add { organization: &'a ClientOrganization },
    Remove { organization: &'a ClientOrganization },
}

impl ProviderSeatService {
    /// Whether applying `seat_delta` now would make the provider buy seats
    pub async fn seat_adjustment_results_in_purchase(
        &self,
        provider: &Provider,
        plan_tier: PlanTier,
        seat_delta: i32,
    ) -> BillingResult<bool> {
        provider.ensure_pooled_billing()?;

        let ledger = self.configured_ledger(provider.id, plan_tier).await?;
        let current_total = self.accessor.occupied_seats(provider.id, plan_tier).await?;

        Ok(engine::results_in_purchase(
            ledger.configured_minimum()?,
            current_total,
            seat_delta,
        ))
    }

    /// Give a managed client organization `seats` seats from its provider's pool
    pub async fn assign_seats_to_client_organization(
        &self,
        provider: &Provider,
        organization: &ClientOrganization,
        seats: i32,
    ) -> BillingResult<SeatAdjustment> {
        provider.ensure_pooled_billing()?;

        if seats < 0 {
            return Err(BillingError::Validation(
                "You cannot assign negative seats to a client organization".to_string(),
            ));
        }

        let plan_tier = self.managed_tier(provider, organization).await?;

        self.scale_seats(
            provider,
            plan_tier,
            SeatTarget::Assign {
                organization,
                seats,
            },
            "assign_seats_to_client_organization",
        )
        .await
    }

    /// Bring an existing organization under a provider, drawing its current
    /// seats from the pool and moving it onto the managed tier
    pub async fn add_client_organization(
        &self,
        provider: &Provider,
        organization: &ClientOrganization,
    ) -> BillingResult<SeatAdjustment> {
        provider.ensure_pooled_billing()?;

        let plan_tier = self.managed_tier(provider, organization).await?;

        self.scale_seats(
            provider,
            plan_tier,
            SeatTarget::Add { organization },
            "add_client_organization",
        )
        .await
    }

    /// Detach an organization from its provider, returning its seats to the pool
    pub async fn remove_client_organization(
        &self,
        provider: &Provider,
        organization: &ClientOrganization,
    ) -> BillingResult<SeatAdjustment> {
        provider.ensure_pooled_billing()?;

        let assignment = self
            .store
            .read_assignment(provider.id, organization.id)
            .await?
            .filter(ClientOrganizationSeatAssignment::is_active)
            .ok_or_else(|| not_managed(provider, organization))?;

        self.scale_seats(
            provider,
            assignment.plan_tier,
            SeatTarget::Remove { organization },
            "remove_client_organization",
        )
        .await
    }

    /// Move a tier's pool by the seats an organization change adds or frees.
    /// Seats only move together with an assignment link, so the allocation
    /// always equals the seats of the tier's managed links.
    async fn scale_seats(
        &self,
        provider: &Provider,
        plan_tier: PlanTier,
        target: SeatTarget<'_>,
        operation: &'static str,
    ) -> BillingResult<SeatAdjustment> {
        let _guard = self.locks.lock(provider.id, plan_tier).await;

        self.retry_on_conflict(provider.id, operation, || {
            self.reconcile_once(provider, plan_tier, target)
        })
        .await
    }

    async fn reconcile_once(
        &self,
        provider: &Provider,
        plan_tier: PlanTier,
        target: SeatTarget<'_>,
    ) -> BillingResult<SeatAdjustment> {
        let ledger = self.configured_ledger(provider.id, plan_tier).await?;

        let (seat_delta, organization_change) = match target {
            SeatTarget::Assign {
                organization,
                seats,
            } => {
                let assignment = self
                    .managed_assignment(provider, organization, plan_tier)
                    .await?;

                let mut updated = organization.clone();
                updated.seats = Some(seats);
                let link = ClientOrganizationSeatAssignment {
                    seats,
                    ..assignment.clone()
                };

                // Nothing moves, so nothing is written
                let change = (seats != assignment.seats)
                    .then(|| (updated, AssignmentChange::Upsert(link)));
                (seats - assignment.seats, change)
            }
            SeatTarget::Add { organization } => {
                let existing = self
                    .store
                    .read_assignment(provider.id, organization.id)
                    .await?;
                if existing.as_ref().is_some_and(ClientOrganizationSeatAssignment::is_active) {
                    return Err(BillingError::Validation(format!(
                        "Organization {} is already managed by provider {}",
                        organization.id, provider.id
                    )));
                }

                let seats = organization.seat_count();
                let mut updated = organization.clone();
                updated.plan_tier = plan_tier;
                updated.status = OrganizationStatus::Managed;
                let link = ClientOrganizationSeatAssignment {
                    provider_id: provider.id,
                    organization_id: organization.id,
                    plan_tier,
                    seats,
                    status: OrganizationStatus::Managed,
                };

                (seats, Some((updated, AssignmentChange::Upsert(link))))
            }
            SeatTarget::Remove { organization } => {
                let assignment = self
                    .managed_assignment(provider, organization, plan_tier)
                    .await?;

                let mut updated = organization.clone();
                updated.status = OrganizationStatus::Created;
                let unlink = AssignmentChange::Delete {
                    provider_id: provider.id,
                    organization_id: organization.id,
                };

                (-assignment.seats, Some((updated, unlink)))
            }
        };

        let current_total = self.accessor.occupied_seats(provider.id, plan_tier).await?;
        let decision = engine::scale_seats(&ledger, current_total, seat_delta)?;

        let line_item = self.line_item_for(
            provider.id,
            plan_tier,
            decision.gateway_quantity,
            decision.ledger.billed_quantity(),
        );

        if decision.is_noop() && organization_change.is_none() {
            tracing::debug!(
                provider_id = %provider.id,
                plan_tier = %plan_tier,
                "Seat total unchanged - skipping update"
            );
            if let Some(item) = line_item {
                self.push_line_items(provider, &[item]).await?;
            }
            return Ok(SeatAdjustment {
                provider_id: provider.id,
                plan_tier,
                quadrant: None,
                previous_total: current_total,
                new_total: current_total,
                gateway_quantity: line_item.map(|item| item.quantity),
                ledger,
                organization: None,
            });
        }

        if let Some(item) = line_item {
            self.push_line_items(provider, &[item]).await?;
        }

        let (organization, change) = match organization_change {
            Some((organization, assignment)) => (
                Some(organization.clone()),
                SeatChange::for_organization(decision.ledger.clone(), organization, assignment),
            ),
            None => (None, SeatChange::ledger(decision.ledger.clone())),
        };

        let stored = match self.store.apply_seat_change(&change).await {
            Ok(stored) => stored,
            Err(e) => {
                if line_item.is_some() && !e.is_conflict() {
                    // The sent quantity stays recorded, so the next cycle on
                    // this tier in this process re-sends the ledger's quantity
                    tracing::error!(
                        provider_id = %provider.id,
                        plan_tier = %plan_tier,
                        error = %e,
                        "Seat ledger write failed after gateway update"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            provider_id = %provider.id,
            plan_tier = %plan_tier,
            quadrant = decision.quadrant.map(|q| q.as_str()).unwrap_or("none"),
            previous_total = decision.current_total,
            new_total = decision.new_total,
            billed_quantity = stored.billed_quantity(),
            "Provider seats reconciled"
        );

        Ok(SeatAdjustment {
            provider_id: provider.id,
            plan_tier,
            quadrant: decision.quadrant,
            previous_total: decision.current_total,
            new_total: decision.new_total,
            gateway_quantity: line_item.map(|item| item.quantity),
            ledger: stored,
            organization,
        })
    }

    /// The organization's active link on `plan_tier`
    async fn managed_assignment(
        &self,
        provider: &Provider,
        organization: &ClientOrganization,
        plan_tier: PlanTier,
    ) -> BillingResult<ClientOrganizationSeatAssignment> {
        let assignment = self
            .store
            .read_assignment(provider.id, organization.id)
            .await?
            .filter(ClientOrganizationSeatAssignment::is_active)
            .ok_or_else(|| not_managed(provider, organization))?;

        if assignment.plan_tier != plan_tier {
            return Err(BillingError::Validation(format!(
                "Organization {} draws seats from the {} plan, not {}",
                organization.id, assignment.plan_tier, plan_tier
            )));
        }

        Ok(assignment)
    }
}

fn not_managed(provider: &Provider, organization: &ClientOrganization) -> BillingError {
    BillingError::Validation(format!(
        "Organization {} is not managed by provider {}",
        organization.id, provider.id
    ))
}
