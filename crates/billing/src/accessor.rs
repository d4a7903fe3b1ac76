//! Occupied seat lookups

use async_trait::async_trait;
use seatpool_shared::{PlanTier, ProviderId};

use crate::error::BillingResult;

/// Reports how many of a provider's pooled seats are in use
#[async_trait]
pub trait AssignmentAccessor: Send + Sync {
    /// Sum of seats across the provider's managed client organizations on `plan_tier`
    async fn occupied_seats(&self, provider_id: ProviderId, plan_tier: PlanTier) -> BillingResult<i32>;
}
