//! Provider seat ledger
//!
//! One ledger exists per (provider, plan tier). It records the contractual
//! seat minimum, the seats bought on top of it and the seats currently handed
//! out to client organizations. The billed quantity is always derived, never
//! stored.

use seatpool_shared::{PlanTier, ProviderId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Seat accounting for one provider plan tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SeatLedger {
    pub id: Uuid,
    pub provider_id: ProviderId,
    pub plan_tier: PlanTier,
    /// Contractual floor; `None` until the tier is configured
    pub seat_minimum: Option<i32>,
    /// Seats billed above the floor
    pub purchased_seats: i32,
    /// Seats assigned to managed client organizations
    pub allocated_seats: i32,
    /// Row version for optimistic concurrency
    pub revision: i64,
}

impl SeatLedger {
    /// A freshly configured tier: minimum set, nothing purchased or allocated
    pub fn new(provider_id: ProviderId, plan_tier: PlanTier, seat_minimum: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_id,
            plan_tier,
            seat_minimum: Some(seat_minimum),
            purchased_seats: 0,
            allocated_seats: 0,
            revision: 0,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.seat_minimum.is_some()
    }

    /// The configured seat minimum, or a configuration error naming the tier
    pub fn configured_minimum(&self) -> BillingResult<i32> {
        self.seat_minimum.ok_or_else(|| {
            BillingError::Configuration(format!(
                "Provider {} plan tier {} has no seat minimum configured",
                self.provider_id, self.plan_tier
            ))
        })
    }

    /// Quantity the gateway line item should carry
    pub fn billed_quantity(&self) -> i32 {
        self.seat_minimum.unwrap_or(0) + self.purchased_seats
    }

    /// Check the counters every persisted ledger must satisfy
    pub fn check_invariants(&self) -> BillingResult<()> {
        let minimum = self.configured_minimum()?;

        if minimum < 0 || self.purchased_seats < 0 || self.allocated_seats < 0 {
            return Err(BillingError::Validation(format!(
                "Seat counts must be at least 0 (minimum {}, purchased {}, allocated {})",
                minimum, self.purchased_seats, self.allocated_seats
            )));
        }

        if self.billed_quantity() < minimum {
            return Err(BillingError::Validation(format!(
                "Billed quantity {} is below seat minimum {}",
                self.billed_quantity(),
                minimum
            )));
        }

        Ok(())
    }

    /// Seats that could still be assigned without buying more
    pub fn unassigned_seats(&self) -> i32 {
        (self.billed_quantity() - self.allocated_seats).max(0)
    }
}

/// Read model for a configured tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfiguredTierSummary {
    pub plan_tier: PlanTier,
    pub seat_minimum: i32,
    pub purchased_seats: i32,
    pub allocated_seats: i32,
    pub billed_quantity: i32,
}

impl ConfiguredTierSummary {
    pub fn from_ledger(ledger: &SeatLedger) -> Option<Self> {
        let seat_minimum = ledger.seat_minimum?;
        Some(Self {
            plan_tier: ledger.plan_tier,
            seat_minimum,
            purchased_seats: ledger.purchased_seats,
            allocated_seats: ledger.allocated_seats,
            billed_quantity: ledger.billed_quantity(),
        })
    }
}
