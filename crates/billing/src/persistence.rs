//! Ledger and assignment storage
//!
//! Writes are conditional on the ledger revision that was read. A write
//! against a stale revision fails with `ConcurrentModification` and leaves
//! storage untouched, so the caller can re-run the whole cycle.

use async_trait::async_trait;
use seatpool_shared::{OrganizationId, PlanTier, ProviderId};

use crate::error::BillingResult;
use crate::ledger::SeatLedger;
use crate::models::{AssignmentChange, ClientOrganization, ClientOrganizationSeatAssignment};

/// Everything a seat workflow persists in one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatChange {
    pub ledger: SeatLedger,
    pub organization: Option<ClientOrganization>,
    pub assignment: Option<AssignmentChange>,
}

impl SeatChange {
    /// A ledger-only change
    pub fn ledger(ledger: SeatLedger) -> Self {
        Self {
            ledger,
            organization: None,
            assignment: None,
        }
    }

    /// A ledger change together with the organization that triggered it
    pub fn for_organization(
        ledger: SeatLedger,
        organization: ClientOrganization,
        assignment: AssignmentChange,
    ) -> Self {
        Self {
            ledger,
            organization: Some(organization),
            assignment: Some(assignment),
        }
    }
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn read_ledger(
        &self,
        provider_id: ProviderId,
        plan_tier: PlanTier,
    ) -> BillingResult<Option<SeatLedger>>;

    /// All ledgers for a provider, configured or not
    async fn read_ledgers(&self, provider_id: ProviderId) -> BillingResult<Vec<SeatLedger>>;

    /// Create a ledger; fails if the provider already has one for the tier
    async fn insert_ledger(&self, ledger: &SeatLedger) -> BillingResult<SeatLedger>;

    /// Replace a ledger read at `ledger.revision`, returning the stored row
    async fn replace_ledger(&self, ledger: &SeatLedger) -> BillingResult<SeatLedger>;

    /// Replace several ledgers atomically: all are written or none are
    async fn replace_ledgers(&self, ledgers: &[SeatLedger]) -> BillingResult<Vec<SeatLedger>>;

    async fn read_assignment(
        &self,
        provider_id: ProviderId,
        organization_id: OrganizationId,
    ) -> BillingResult<Option<ClientOrganizationSeatAssignment>>;

    /// Write the ledger, the organization and its link atomically
    async fn apply_seat_change(&self, change: &SeatChange) -> BillingResult<SeatLedger>;
}
