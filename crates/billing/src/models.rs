//! Providers, client organizations and the links between them

use seatpool_shared::{OrganizationId, OrganizationStatus, PlanTier, ProviderId, ProviderType};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};

/// A provider billed for a pooled seat count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    pub provider_type: ProviderType,
    pub gateway_customer_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
}

impl Provider {
    /// Reject providers that cannot hold a seat pool
    pub fn ensure_pooled_billing(&self) -> BillingResult<()> {
        if !self.provider_type.supports_pooled_billing() {
            return Err(BillingError::Validation(format!(
                "Pooled seat billing does not support {} providers",
                self.provider_type
            )));
        }
        Ok(())
    }

    /// The gateway subscription seat line items live on
    pub fn subscription_id(&self) -> BillingResult<&str> {
        self.gateway_subscription_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                BillingError::Configuration(format!(
                    "Provider {} has no gateway subscription",
                    self.id
                ))
            })
    }
}

/// A client organization as far as seat accounting is concerned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClientOrganization {
    pub id: OrganizationId,
    pub name: String,
    pub plan_tier: PlanTier,
    pub seats: Option<i32>,
    pub status: OrganizationStatus,
}

impl ClientOrganization {
    pub fn seat_count(&self) -> i32 {
        self.seats.unwrap_or(0)
    }
}

/// Link from a client organization to its provider's seat pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClientOrganizationSeatAssignment {
    pub provider_id: ProviderId,
    pub organization_id: OrganizationId,
    pub plan_tier: PlanTier,
    pub seats: i32,
    pub status: OrganizationStatus,
}

impl ClientOrganizationSeatAssignment {
    /// Whether this link's seats count toward the provider's allocation
    pub fn is_active(&self) -> bool {
        self.status == OrganizationStatus::Managed
    }
}

/// What happens to the assignment link alongside a ledger write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentChange {
    /// Insert or replace the link
    Upsert(ClientOrganizationSeatAssignment),
    /// Remove the link
    Delete {
        provider_id: ProviderId,
        organization_id: OrganizationId,
    },
}

/// A requested seat minimum for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatMinimumChange {
    pub plan_tier: PlanTier,
    pub seat_minimum: i32,
}

impl SeatMinimumChange {
    pub fn new(plan_tier: PlanTier, seat_minimum: i32) -> Self {
        Self {
            plan_tier,
            seat_minimum,
        }
    }
}
