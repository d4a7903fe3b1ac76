#![allow(clippy::unwrap_used)]

//! Integration tests for provider seat workflows
//!
//! These tests drive `ProviderSeatService` end to end against the in-memory
//! store and a recording gateway, checking both what the gateway was told
//! and what ended up persisted.
//!
//! ## Test Coverage
//! - All four threshold crossings through client organization assignment
//! - No-op and rejected requests (no gateway call, no write)
//! - Gateway failures leaving the ledger untouched
//! - Ledger write failures after a gateway update, repaired by the next cycle
//! - Concurrent assignments and revision conflicts
//! - Adding and removing client organizations
//! - Seat minimum batches

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use seatpool_billing::{
    AssignmentAccessor, BillingError, BillingResult, ClientOrganization, InMemorySeatStore,
    ProviderPriceIds, ProviderSeatService, Provider, RecordingGateway, SeatBillingConfig,
    SeatLedger, SeatMinimumChange, SeatQuadrant,
};
use seatpool_shared::{OrganizationId, OrganizationStatus, PlanTier, ProviderId, ProviderType};

// ============================================================================
// Test Utilities
// ============================================================================

const SUBSCRIPTION: &str = "sub_provider";
const TEAMS_PRICE: &str = "price_teams_monthly";
const ENTERPRISE_PRICE: &str = "price_enterprise_monthly";

struct Harness {
    store: InMemorySeatStore,
    gateway: RecordingGateway,
    service: Arc<ProviderSeatService>,
    provider: Provider,
}

impl Harness {
    fn new() -> Self {
        Self::with_provider_type(ProviderType::Msp)
    }

    fn with_provider_type(provider_type: ProviderType) -> Self {
        let store = InMemorySeatStore::new();
        Self::build(provider_type, store.clone(), Arc::new(store))
    }

    /// Count occupied seats with `accessor` instead of the store's links
    fn with_accessor(accessor: Arc<dyn AssignmentAccessor>) -> Self {
        Self::build(ProviderType::Msp, InMemorySeatStore::new(), accessor)
    }

    fn build(
        provider_type: ProviderType,
        store: InMemorySeatStore,
        accessor: Arc<dyn AssignmentAccessor>,
    ) -> Self {
        let gateway = RecordingGateway::new();
        let service = ProviderSeatService::new(
            accessor,
            Arc::new(gateway.clone()),
            Arc::new(store.clone()),
            ProviderPriceIds {
                teams_monthly: TEAMS_PRICE.to_string(),
                enterprise_monthly: ENTERPRISE_PRICE.to_string(),
            },
            SeatBillingConfig::default(),
        );

        Self {
            store,
            gateway,
            service: Arc::new(service),
            provider: Provider {
                id: ProviderId::new(),
                name: "Acme MSP".to_string(),
                provider_type,
                gateway_customer_id: Some("cus_provider".to_string()),
                gateway_subscription_id: Some(SUBSCRIPTION.to_string()),
            },
        }
    }

    fn seed_ledger(&self, tier: PlanTier, minimum: i32, purchased: i32, allocated: i32) -> SeatLedger {
        let mut ledger = SeatLedger::new(self.provider.id, tier, minimum);
        ledger.purchased_seats = purchased;
        ledger.allocated_seats = allocated;
        self.store.seed_ledger(ledger.clone());
        ledger
    }

    fn seed_managed(&self, tier: PlanTier, seats: i32) -> ClientOrganization {
        let organization = ClientOrganization {
            id: OrganizationId::new(),
            name: "Managed Client".to_string(),
            plan_tier: tier,
            seats: Some(seats),
            status: OrganizationStatus::Managed,
        };
        self.store
            .seed_organization(self.provider.id, organization.clone());
        organization
    }

    fn ledger(&self, tier: PlanTier) -> SeatLedger {
        self.store.ledger(self.provider.id, tier).unwrap()
    }
}

/// Reports a different occupied total on each read, as when other
/// organizations change seats between attempts
struct ShiftingAccessor {
    totals: Mutex<VecDeque<i32>>,
}

impl ShiftingAccessor {
    fn new(totals: &[i32]) -> Self {
        Self {
            totals: Mutex::new(totals.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl AssignmentAccessor for ShiftingAccessor {
    async fn occupied_seats(&self, _provider_id: ProviderId, _plan_tier: PlanTier) -> BillingResult<i32> {
        let mut totals = self.totals.lock().unwrap();
        let total = totals.front().copied().unwrap();
        if totals.len() > 1 {
            totals.pop_front();
        }
        Ok(total)
    }
}

// ============================================================================
// Threshold Crossings
// ============================================================================

#[tokio::test]
async fn test_below_to_below_skips_gateway() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 100, 0, 80);
    h.seed_managed(PlanTier::TeamsMonthly, 80);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 0);

    let adjustment = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 10)
        .await
        .unwrap();

    assert_eq!(adjustment.quadrant, Some(SeatQuadrant::BelowToBelow));
    assert_eq!(adjustment.gateway_quantity, None);
    assert!(h.gateway.calls().is_empty());

    let ledger = h.ledger(PlanTier::TeamsMonthly);
    assert_eq!(ledger.allocated_seats, 90);
    assert_eq!(ledger.purchased_seats, 0);
    assert_eq!(ledger.billed_quantity(), 100);
    assert_eq!(h.store.organization(client.id).unwrap().seats, Some(10));
    assert_eq!(h.store.assignment(h.provider.id, client.id).unwrap().seats, 10);
}

#[tokio::test]
async fn test_below_to_above_buys_the_overflow() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 100, 0, 95);
    h.seed_managed(PlanTier::TeamsMonthly, 95);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 0);

    let adjustment = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 10)
        .await
        .unwrap();

    assert_eq!(adjustment.quadrant, Some(SeatQuadrant::BelowToAbove));
    assert_eq!(h.gateway.quantities(), vec![105]);
    assert_eq!(h.gateway.calls()[0].subscription_id, SUBSCRIPTION);
    assert_eq!(h.gateway.quantity(SUBSCRIPTION, TEAMS_PRICE), Some(105));

    let ledger = h.ledger(PlanTier::TeamsMonthly);
    assert_eq!(ledger.purchased_seats, 5);
    assert_eq!(ledger.allocated_seats, 105);
    assert_eq!(ledger.billed_quantity(), 105);
}

#[tokio::test]
async fn test_above_to_above_tracks_usage() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 100, 10, 110);
    h.seed_managed(PlanTier::TeamsMonthly, 100);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 10);

    h.service
        .assign_seats_to_client_organization(&h.provider, &client, 15)
        .await
        .unwrap();

    assert_eq!(h.gateway.quantities(), vec![115]);
    let ledger = h.ledger(PlanTier::TeamsMonthly);
    assert_eq!(ledger.purchased_seats, 15);
    assert_eq!(ledger.allocated_seats, 115);
}

#[tokio::test]
async fn test_above_to_below_bills_the_minimum() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 100, 10, 110);
    h.seed_managed(PlanTier::TeamsMonthly, 80);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 30);

    let adjustment = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 10)
        .await
        .unwrap();

    assert_eq!(adjustment.quadrant, Some(SeatQuadrant::AboveToBelow));
    assert_eq!(h.gateway.quantities(), vec![100]);

    let ledger = h.ledger(PlanTier::TeamsMonthly);
    assert_eq!(ledger.purchased_seats, 0);
    assert_eq!(ledger.allocated_seats, 90);
    assert_eq!(ledger.billed_quantity(), 100);
}

#[tokio::test]
async fn test_enterprise_tier_uses_its_own_line_item() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::EnterpriseMonthly, 20, 0, 20);
    let client = h.seed_managed(PlanTier::EnterpriseMonthly, 20);

    h.service
        .assign_seats_to_client_organization(&h.provider, &client, 21)
        .await
        .unwrap();

    assert_eq!(h.gateway.quantity(SUBSCRIPTION, ENTERPRISE_PRICE), Some(21));
    assert_eq!(h.gateway.quantity(SUBSCRIPTION, TEAMS_PRICE), None);
}

// ============================================================================
// No-ops and Rejections
// ============================================================================

#[tokio::test]
async fn test_unchanged_seats_are_a_noop() {
    let h = Harness::new();
    let seeded = h.seed_ledger(PlanTier::TeamsMonthly, 100, 10, 110);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 110);

    let adjustment = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 110)
        .await
        .unwrap();

    assert!(adjustment.is_noop());
    assert!(h.gateway.calls().is_empty());
    assert_eq!(h.ledger(PlanTier::TeamsMonthly), seeded);
}

#[tokio::test]
async fn test_negative_seats_rejected_before_any_call() {
    let h = Harness::new();
    let seeded = h.seed_ledger(PlanTier::TeamsMonthly, 100, 0, 40);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 40);

    let err = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, -1)
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Validation(_)));
    assert!(h.gateway.calls().is_empty());
    assert_eq!(h.ledger(PlanTier::TeamsMonthly), seeded);
}

#[tokio::test]
async fn test_unconfigured_tier_is_configuration_error() {
    let h = Harness::new();
    let client = h.seed_managed(PlanTier::TeamsMonthly, 5);

    let err = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 10)
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Configuration(_)));
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_reseller_is_rejected() {
    let h = Harness::with_provider_type(ProviderType::Reseller);
    h.seed_ledger(PlanTier::TeamsMonthly, 10, 0, 0);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 0);

    let err = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 5)
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Validation(_)));
}

#[tokio::test]
async fn test_unmanaged_organization_is_rejected() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 10, 0, 0);
    let stranger = ClientOrganization {
        id: OrganizationId::new(),
        name: "Stranger".to_string(),
        plan_tier: PlanTier::TeamsMonthly,
        seats: Some(3),
        status: OrganizationStatus::Created,
    };

    let err = h
        .service
        .assign_seats_to_client_organization(&h.provider, &stranger, 5)
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Validation(_)));
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_gateway_failure_leaves_state_untouched() {
    let h = Harness::new();
    let seeded = h.seed_ledger(PlanTier::TeamsMonthly, 100, 0, 95);
    h.seed_managed(PlanTier::TeamsMonthly, 95);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 0);
    h.gateway.fail_with(Some("card_declined"));

    let err = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 10)
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Gateway(_)));
    assert_eq!(h.gateway.calls().len(), 1);
    assert_eq!(h.ledger(PlanTier::TeamsMonthly), seeded);
    assert_eq!(h.store.organization(client.id).unwrap().seats, Some(0));
    assert_eq!(h.store.assignment(h.provider.id, client.id).unwrap().seats, 0);
}

#[tokio::test]
async fn test_missing_subscription_fails_before_gateway() {
    let mut h = Harness::new();
    h.provider.gateway_subscription_id = None;
    let seeded = h.seed_ledger(PlanTier::TeamsMonthly, 10, 0, 10);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 10);

    let err = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 12)
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Configuration(_)));
    assert!(h.gateway.calls().is_empty());
    assert_eq!(h.ledger(PlanTier::TeamsMonthly), seeded);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_assignments_serialize() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 100, 0, 95);
    h.seed_managed(PlanTier::TeamsMonthly, 95);
    let first = h.seed_managed(PlanTier::TeamsMonthly, 0);
    let second = h.seed_managed(PlanTier::TeamsMonthly, 0);

    let tasks: Vec<_> = [first, second]
        .into_iter()
        .map(|client| {
            let service = Arc::clone(&h.service);
            let provider = h.provider.clone();
            tokio::spawn(async move {
                service
                    .assign_seats_to_client_organization(&provider, &client, 10)
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let ledger = h.ledger(PlanTier::TeamsMonthly);
    assert_eq!(ledger.allocated_seats, 115);
    assert_eq!(ledger.purchased_seats, 15);
    assert_eq!(ledger.billed_quantity(), 115);
    assert_eq!(h.gateway.quantities(), vec![105, 115]);
}

#[tokio::test]
async fn test_revision_conflict_reruns_the_cycle() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 100, 0, 95);
    h.seed_managed(PlanTier::TeamsMonthly, 95);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 0);
    h.store.inject_conflicts(1);

    h.service
        .assign_seats_to_client_organization(&h.provider, &client, 10)
        .await
        .unwrap();

    // Same absolute quantity on both attempts
    assert_eq!(h.gateway.quantities(), vec![105, 105]);
    let ledger = h.ledger(PlanTier::TeamsMonthly);
    assert_eq!(ledger.allocated_seats, 105);
    assert_eq!(ledger.purchased_seats, 5);
}

#[tokio::test]
async fn test_persistent_conflicts_surface_after_retries() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 100, 0, 95);
    h.seed_managed(PlanTier::TeamsMonthly, 95);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 0);
    h.store.inject_conflicts(10);

    let err = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 10)
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(
        h.gateway.calls().len(),
        SeatBillingConfig::default().max_conflict_retries as usize + 1
    );
    let ledger = h.ledger(PlanTier::TeamsMonthly);
    assert_eq!(ledger.allocated_seats, 95);
    assert_eq!(ledger.purchased_seats, 0);
    assert_eq!(h.store.assignment(h.provider.id, client.id).unwrap().seats, 0);
}

#[tokio::test]
async fn test_conflict_retry_resyncs_when_total_shrinks() {
    let h = Harness::with_accessor(Arc::new(ShiftingAccessor::new(&[95, 85])));
    h.seed_ledger(PlanTier::TeamsMonthly, 100, 0, 95);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 0);
    h.store.inject_conflicts(1);

    let adjustment = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 10)
        .await
        .unwrap();

    // The first attempt bought 5 seats; the second lands below the minimum
    // and must take them back
    assert_eq!(adjustment.quadrant, Some(SeatQuadrant::BelowToBelow));
    assert_eq!(adjustment.gateway_quantity, Some(100));
    assert_eq!(h.gateway.quantities(), vec![105, 100]);
    assert_eq!(h.gateway.quantity(SUBSCRIPTION, TEAMS_PRICE), Some(100));

    let ledger = h.ledger(PlanTier::TeamsMonthly);
    assert_eq!(ledger.allocated_seats, 95);
    assert_eq!(ledger.purchased_seats, 0);
    assert_eq!(ledger.billed_quantity(), 100);
}

// ============================================================================
// Ledger Write Failures
// ============================================================================

#[tokio::test]
async fn test_failed_write_is_repaired_by_next_assignment() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 100, 0, 95);
    h.seed_managed(PlanTier::TeamsMonthly, 95);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 0);

    h.store.fail_writes(Some("disk full"));
    let err = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 10)
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Persistence(_)));
    assert_eq!(h.gateway.quantity(SUBSCRIPTION, TEAMS_PRICE), Some(105));
    assert_eq!(h.ledger(PlanTier::TeamsMonthly).billed_quantity(), 100);

    h.store.fail_writes(None);
    let adjustment = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 5)
        .await
        .unwrap();

    // Below the minimum needs no call of its own, but the line item still
    // carries the failed attempt's quantity
    assert_eq!(adjustment.quadrant, Some(SeatQuadrant::BelowToBelow));
    assert_eq!(h.gateway.quantities(), vec![105, 100]);
    assert_eq!(h.gateway.quantity(SUBSCRIPTION, TEAMS_PRICE), Some(100));

    let ledger = h.ledger(PlanTier::TeamsMonthly);
    assert_eq!(ledger.allocated_seats, 100);
    assert_eq!(ledger.billed_quantity(), 100);
    assert_eq!(h.store.assignment(h.provider.id, client.id).unwrap().seats, 5);
}

#[tokio::test]
async fn test_failed_write_is_repaired_by_unchanged_assignment() {
    let h = Harness::new();
    let seeded = h.seed_ledger(PlanTier::TeamsMonthly, 100, 0, 95);
    h.seed_managed(PlanTier::TeamsMonthly, 95);
    let client = h.seed_managed(PlanTier::TeamsMonthly, 0);

    h.store.fail_writes(Some("disk full"));
    h.service
        .assign_seats_to_client_organization(&h.provider, &client, 10)
        .await
        .unwrap_err();
    h.store.fail_writes(None);

    let adjustment = h
        .service
        .assign_seats_to_client_organization(&h.provider, &client, 0)
        .await
        .unwrap();

    assert!(adjustment.is_noop());
    assert_eq!(adjustment.gateway_quantity, Some(100));
    assert_eq!(h.gateway.quantity(SUBSCRIPTION, TEAMS_PRICE), Some(100));
    assert_eq!(h.ledger(PlanTier::TeamsMonthly), seeded);

    // Back in step: the next unchanged request makes no call
    h.service
        .assign_seats_to_client_organization(&h.provider, &client, 0)
        .await
        .unwrap();
    assert_eq!(h.gateway.calls().len(), 2);
}

#[tokio::test]
async fn test_failed_minimum_write_is_repaired_by_next_batch() {
    let h = Harness::new();
    let teams = h.seed_ledger(PlanTier::TeamsMonthly, 30, 0, 25);
    h.seed_ledger(PlanTier::EnterpriseMonthly, 50, 0, 20);

    h.store.fail_writes(Some("disk full"));
    let err = h
        .service
        .update_seat_minimums(
            &h.provider,
            &[
                SeatMinimumChange::new(PlanTier::TeamsMonthly, 40),
                SeatMinimumChange::new(PlanTier::EnterpriseMonthly, 60),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Persistence(_)));
    assert_eq!(h.gateway.quantity(SUBSCRIPTION, TEAMS_PRICE), Some(40));
    assert_eq!(h.ledger(PlanTier::TeamsMonthly), teams);

    h.store.fail_writes(None);
    let update = h
        .service
        .update_seat_minimums(
            &h.provider,
            &[
                SeatMinimumChange::new(PlanTier::TeamsMonthly, 30),
                SeatMinimumChange::new(PlanTier::EnterpriseMonthly, 55),
            ],
        )
        .await
        .unwrap();

    // Teams is unchanged in the ledger but goes back to 30 on the gateway
    assert_eq!(update.ledgers.len(), 1);
    assert_eq!(update.line_items.len(), 2);
    let calls = h.gateway.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].updates.len(), 2);
    assert_eq!(h.gateway.quantity(SUBSCRIPTION, TEAMS_PRICE), Some(30));
    assert_eq!(h.gateway.quantity(SUBSCRIPTION, ENTERPRISE_PRICE), Some(55));
    assert_eq!(h.ledger(PlanTier::TeamsMonthly), teams);
    assert_eq!(h.ledger(PlanTier::EnterpriseMonthly).seat_minimum, Some(55));
}

// ============================================================================
// Client Organization Lifecycle
// ============================================================================

#[tokio::test]
async fn test_add_then_remove_client_organization() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 10, 0, 0);
    let organization = ClientOrganization {
        id: OrganizationId::new(),
        name: "Joining Client".to_string(),
        plan_tier: PlanTier::TeamsAnnually,
        seats: Some(20),
        status: OrganizationStatus::Created,
    };

    let added = h
        .service
        .add_client_organization(&h.provider, &organization)
        .await
        .unwrap();

    assert_eq!(added.quadrant, Some(SeatQuadrant::BelowToAbove));
    assert_eq!(h.gateway.quantities(), vec![20]);

    let managed = h.store.organization(organization.id).unwrap();
    assert_eq!(managed.status, OrganizationStatus::Managed);
    assert_eq!(managed.plan_tier, PlanTier::TeamsMonthly);
    let link = h.store.assignment(h.provider.id, organization.id).unwrap();
    assert_eq!(link.seats, 20);
    assert_eq!(h.ledger(PlanTier::TeamsMonthly).purchased_seats, 10);

    let err = h
        .service
        .add_client_organization(&h.provider, &managed)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));

    let removed = h
        .service
        .remove_client_organization(&h.provider, &managed)
        .await
        .unwrap();

    assert_eq!(removed.quadrant, Some(SeatQuadrant::AboveToBelow));
    assert_eq!(h.gateway.quantities(), vec![20, 10]);
    assert!(h.store.assignment(h.provider.id, organization.id).is_none());
    assert_eq!(
        h.store.organization(organization.id).unwrap().status,
        OrganizationStatus::Created
    );

    let ledger = h.ledger(PlanTier::TeamsMonthly);
    assert_eq!(ledger.allocated_seats, 0);
    assert_eq!(ledger.purchased_seats, 0);
    assert_eq!(ledger.billed_quantity(), 10);
}

#[tokio::test]
async fn test_free_organization_cannot_be_added() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 10, 0, 0);
    let organization = ClientOrganization {
        id: OrganizationId::new(),
        name: "Free Client".to_string(),
        plan_tier: PlanTier::Free,
        seats: Some(2),
        status: OrganizationStatus::Created,
    };

    let err = h
        .service
        .add_client_organization(&h.provider, &organization)
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Validation(_)));
    assert!(h.store.assignment(h.provider.id, organization.id).is_none());
}

#[tokio::test]
async fn test_purchase_check_does_not_mutate() {
    let h = Harness::new();
    let seeded = h.seed_ledger(PlanTier::TeamsMonthly, 100, 0, 95);
    h.seed_managed(PlanTier::TeamsMonthly, 95);

    assert!(h
        .service
        .seat_adjustment_results_in_purchase(&h.provider, PlanTier::TeamsMonthly, 10)
        .await
        .unwrap());
    assert!(!h
        .service
        .seat_adjustment_results_in_purchase(&h.provider, PlanTier::TeamsMonthly, 5)
        .await
        .unwrap());

    assert!(h.gateway.calls().is_empty());
    assert_eq!(h.ledger(PlanTier::TeamsMonthly), seeded);
}

// ============================================================================
// Seat Minimums
// ============================================================================

#[tokio::test]
async fn test_seat_minimum_batch_is_one_gateway_call() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 30, 0, 25);
    h.seed_ledger(PlanTier::EnterpriseMonthly, 50, 0, 20);

    let update = h
        .service
        .update_seat_minimums(
            &h.provider,
            &[
                SeatMinimumChange::new(PlanTier::TeamsMonthly, 20),
                SeatMinimumChange::new(PlanTier::EnterpriseMonthly, 30),
            ],
        )
        .await
        .unwrap();

    assert_eq!(update.ledgers.len(), 2);
    let calls = h.gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].updates.len(), 2);
    assert_eq!(h.gateway.quantity(SUBSCRIPTION, TEAMS_PRICE), Some(25));
    assert_eq!(h.gateway.quantity(SUBSCRIPTION, ENTERPRISE_PRICE), Some(30));

    let teams = h.ledger(PlanTier::TeamsMonthly);
    assert_eq!(teams.seat_minimum, Some(20));
    assert_eq!(teams.purchased_seats, 5);
    let enterprise = h.ledger(PlanTier::EnterpriseMonthly);
    assert_eq!(enterprise.seat_minimum, Some(30));
    assert_eq!(enterprise.purchased_seats, 0);
}

#[tokio::test]
async fn test_invalid_entry_rejects_whole_batch() {
    let h = Harness::new();
    let teams = h.seed_ledger(PlanTier::TeamsMonthly, 30, 0, 25);
    let enterprise = h.seed_ledger(PlanTier::EnterpriseMonthly, 50, 0, 20);

    let err = h
        .service
        .update_seat_minimums(
            &h.provider,
            &[
                SeatMinimumChange::new(PlanTier::TeamsMonthly, 20),
                SeatMinimumChange::new(PlanTier::EnterpriseMonthly, -1),
            ],
        )
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "Provider seat minimums must be at least 0");
    assert!(h.gateway.calls().is_empty());
    assert_eq!(h.ledger(PlanTier::TeamsMonthly), teams);
    assert_eq!(h.ledger(PlanTier::EnterpriseMonthly), enterprise);
}

#[tokio::test]
async fn test_raising_minimum_into_purchased_seats_keeps_invoice() {
    let h = Harness::new();
    h.seed_ledger(PlanTier::TeamsMonthly, 10, 5, 15);

    let ledger = h
        .service
        .update_seat_minimum(&h.provider, SeatMinimumChange::new(PlanTier::TeamsMonthly, 12))
        .await
        .unwrap();

    assert_eq!(ledger.seat_minimum, Some(12));
    assert_eq!(ledger.purchased_seats, 3);
    assert_eq!(ledger.billed_quantity(), 15);
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_seat_minimum_gateway_failure_leaves_ledgers() {
    let h = Harness::new();
    let teams = h.seed_ledger(PlanTier::TeamsMonthly, 30, 0, 25);
    h.gateway.fail_with(Some("subscription_canceled"));

    let err = h
        .service
        .update_seat_minimums(&h.provider, &[SeatMinimumChange::new(PlanTier::TeamsMonthly, 40)])
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Gateway(_)));
    assert_eq!(h.ledger(PlanTier::TeamsMonthly), teams);
}

#[tokio::test]
async fn test_unchanged_minimum_is_a_noop() {
    let h = Harness::new();
    let teams = h.seed_ledger(PlanTier::TeamsMonthly, 30, 0, 25);

    let update = h
        .service
        .update_seat_minimums(&h.provider, &[SeatMinimumChange::new(PlanTier::TeamsMonthly, 30)])
        .await
        .unwrap();

    assert!(update.is_noop());
    assert!(h.gateway.calls().is_empty());
    assert_eq!(h.ledger(PlanTier::TeamsMonthly), teams);
}
