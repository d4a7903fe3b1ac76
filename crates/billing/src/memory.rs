//! In-memory collaborators for tests and local development
//!
//! Note: state lives in the process, so these are not suitable when several
//! instances share one provider's seat pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use seatpool_shared::{OrganizationId, OrganizationStatus, PlanTier, ProviderId};

use crate::accessor::AssignmentAccessor;
use crate::error::{BillingError, BillingResult};
use crate::gateway::{GatewaySubscriptionAdapter, LineItem, LineItemQuantity};
use crate::ledger::SeatLedger;
use crate::models::{AssignmentChange, ClientOrganization, ClientOrganizationSeatAssignment};
use crate::persistence::{PersistenceGateway, SeatChange};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct StoreState {
    ledgers: HashMap<(ProviderId, PlanTier), SeatLedger>,
    organizations: HashMap<OrganizationId, ClientOrganization>,
    assignments: HashMap<(ProviderId, OrganizationId), ClientOrganizationSeatAssignment>,
    /// Upcoming ledger writes that lose a race with another writer
    pending_conflicts: u32,
    /// Every ledger write fails with this message while set
    write_failure: Option<String>,
}

impl StoreState {
    /// Fail the write if it was planned against a stale revision
    fn check_write(&mut self, ledger: &SeatLedger) -> BillingResult<()> {
        if let Some(message) = &self.write_failure {
            return Err(BillingError::Persistence(message.clone()));
        }

        let key = (ledger.provider_id, ledger.plan_tier);
        let stored = self.ledgers.get_mut(&key).ok_or_else(|| {
            BillingError::Persistence(format!(
                "Provider {} has no {} plan",
                ledger.provider_id, ledger.plan_tier
            ))
        })?;

        if self.pending_conflicts > 0 {
            self.pending_conflicts -= 1;
            stored.revision += 1;
        }

        if stored.revision != ledger.revision {
            return Err(BillingError::ConcurrentModification(format!(
                "Provider {} plan tier {} changed since revision {}",
                ledger.provider_id, ledger.plan_tier, ledger.revision
            )));
        }

        Ok(())
    }

    fn store(&mut self, ledger: &SeatLedger) -> SeatLedger {
        let mut stored = ledger.clone();
        stored.revision += 1;
        self.ledgers
            .insert((stored.provider_id, stored.plan_tier), stored.clone());
        stored
    }
}

/// Ledger, organization and link storage held in memory
#[derive(Clone, Default)]
pub struct InMemorySeatStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a ledger as-is, replacing any existing one for the tier
    pub fn seed_ledger(&self, ledger: SeatLedger) {
        lock(&self.state)
            .ledgers
            .insert((ledger.provider_id, ledger.plan_tier), ledger);
    }

    /// Store an organization, linking it to `provider_id` when it is managed
    pub fn seed_organization(&self, provider_id: ProviderId, organization: ClientOrganization) {
        let mut state = lock(&self.state);
        if organization.status == OrganizationStatus::Managed {
            state.assignments.insert(
                (provider_id, organization.id),
                ClientOrganizationSeatAssignment {
                    provider_id,
                    organization_id: organization.id,
                    plan_tier: organization.plan_tier,
                    seats: organization.seat_count(),
                    status: OrganizationStatus::Managed,
                },
            );
        }
        state.organizations.insert(organization.id, organization);
    }

    pub fn ledger(&self, provider_id: ProviderId, plan_tier: PlanTier) -> Option<SeatLedger> {
        lock(&self.state).ledgers.get(&(provider_id, plan_tier)).cloned()
    }

    pub fn organization(&self, organization_id: OrganizationId) -> Option<ClientOrganization> {
        lock(&self.state).organizations.get(&organization_id).cloned()
    }

    pub fn assignment(
        &self,
        provider_id: ProviderId,
        organization_id: OrganizationId,
    ) -> Option<ClientOrganizationSeatAssignment> {
        lock(&self.state)
            .assignments
            .get(&(provider_id, organization_id))
            .cloned()
    }

    /// Make the next `count` ledger writes race with an outside writer
    pub fn inject_conflicts(&self, count: u32) {
        lock(&self.state).pending_conflicts = count;
    }

    /// Fail every ledger write until cleared with `None`
    pub fn fail_writes(&self, message: Option<&str>) {
        lock(&self.state).write_failure = message.map(str::to_string);
    }
}

#[async_trait]
impl AssignmentAccessor for InMemorySeatStore {
    async fn occupied_seats(&self, provider_id: ProviderId, plan_tier: PlanTier) -> BillingResult<i32> {
        Ok(lock(&self.state)
            .assignments
            .values()
            .filter(|link| {
                link.provider_id == provider_id && link.plan_tier == plan_tier && link.is_active()
            })
            .map(|link| link.seats)
            .sum())
    }
}

#[async_trait]
impl PersistenceGateway for InMemorySeatStore {
    async fn read_ledger(
        &self,
        provider_id: ProviderId,
        plan_tier: PlanTier,
    ) -> BillingResult<Option<SeatLedger>> {
        Ok(self.ledger(provider_id, plan_tier))
    }

    async fn read_ledgers(&self, provider_id: ProviderId) -> BillingResult<Vec<SeatLedger>> {
        let mut ledgers: Vec<SeatLedger> = lock(&self.state)
            .ledgers
            .values()
            .filter(|ledger| ledger.provider_id == provider_id)
            .cloned()
            .collect();
        ledgers.sort_by_key(|ledger| ledger.plan_tier);
        Ok(ledgers)
    }

    async fn insert_ledger(&self, ledger: &SeatLedger) -> BillingResult<SeatLedger> {
        let mut state = lock(&self.state);
        let key = (ledger.provider_id, ledger.plan_tier);
        if state.ledgers.contains_key(&key) {
            return Err(BillingError::Validation(format!(
                "Provider {} already has a {} plan",
                ledger.provider_id, ledger.plan_tier
            )));
        }

        let mut stored = ledger.clone();
        stored.revision = 0;
        state.ledgers.insert(key, stored.clone());
        Ok(stored)
    }

    async fn replace_ledger(&self, ledger: &SeatLedger) -> BillingResult<SeatLedger> {
        let mut state = lock(&self.state);
        state.check_write(ledger)?;
        Ok(state.store(ledger))
    }

    async fn replace_ledgers(&self, ledgers: &[SeatLedger]) -> BillingResult<Vec<SeatLedger>> {
        let mut state = lock(&self.state);

        // Check every row before writing any
        for ledger in ledgers {
            state.check_write(ledger)?;
        }

        Ok(ledgers.iter().map(|ledger| state.store(ledger)).collect())
    }

    async fn read_assignment(
        &self,
        provider_id: ProviderId,
        organization_id: OrganizationId,
    ) -> BillingResult<Option<ClientOrganizationSeatAssignment>> {
        Ok(self.assignment(provider_id, organization_id))
    }

    async fn apply_seat_change(&self, change: &SeatChange) -> BillingResult<SeatLedger> {
        let mut state = lock(&self.state);
        state.check_write(&change.ledger)?;

        let stored = state.store(&change.ledger);

        if let Some(organization) = &change.organization {
            state
                .organizations
                .insert(organization.id, organization.clone());
        }

        match &change.assignment {
            Some(AssignmentChange::Upsert(assignment)) => {
                state.assignments.insert(
                    (assignment.provider_id, assignment.organization_id),
                    assignment.clone(),
                );
            }
            Some(AssignmentChange::Delete {
                provider_id,
                organization_id,
            }) => {
                state.assignments.remove(&(*provider_id, *organization_id));
            }
            None => {}
        }

        Ok(stored)
    }
}

/// One `set_line_item_quantities` call as the gateway received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub subscription_id: String,
    pub updates: Vec<LineItemQuantity>,
}

#[derive(Default)]
struct GatewayState {
    calls: Vec<GatewayCall>,
    quantities: HashMap<(String, String), i32>,
    failure: Option<String>,
}

/// Gateway that records every quantity it is asked to set
#[derive(Clone, Default)]
pub struct RecordingGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls that reached the gateway, including failed ones
    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.state).calls.clone()
    }

    /// Quantities from every call, in order
    pub fn quantities(&self) -> Vec<i32> {
        lock(&self.state)
            .calls
            .iter()
            .flat_map(|call| call.updates.iter().map(|update| update.quantity))
            .collect()
    }

    /// Last quantity successfully set on a line item
    pub fn quantity(&self, subscription_id: &str, price_id: &str) -> Option<i32> {
        lock(&self.state)
            .quantities
            .get(&(subscription_id.to_string(), price_id.to_string()))
            .copied()
    }

    /// Reject every call until cleared with `None`
    pub fn fail_with(&self, message: Option<&str>) {
        lock(&self.state).failure = message.map(str::to_string);
    }
}

#[async_trait]
impl GatewaySubscriptionAdapter for RecordingGateway {
    async fn set_line_item_quantities(
        &self,
        subscription_id: &str,
        updates: &[LineItemQuantity],
    ) -> BillingResult<Vec<LineItem>> {
        let mut state = lock(&self.state);

        state.calls.push(GatewayCall {
            subscription_id: subscription_id.to_string(),
            updates: updates.to_vec(),
        });

        if let Some(message) = &state.failure {
            return Err(BillingError::Gateway(message.clone()));
        }

        let mut items = Vec::with_capacity(updates.len());
        for update in updates {
            state.quantities.insert(
                (subscription_id.to_string(), update.price_id.clone()),
                update.quantity,
            );
            items.push(LineItem {
                item_id: format!("si_{}", update.price_id),
                price_id: update.price_id.clone(),
                quantity: update.quantity,
            });
        }

        Ok(items)
    }
}
