//! Last quantity sent to each seat line item
//!
//! The gateway is updated before the ledger is written. When that write
//! fails or loses a revision race, the gateway is left ahead of the ledger.
//! Each later cycle on the tier checks what was last sent and re-sends the
//! ledger's billed quantity when the two differ.
//!
//! Note: this is tracked per process. A crash between the gateway call and
//! the ledger write is not visible to other instances.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use seatpool_shared::{PlanTier, ProviderId};

type TierKey = (ProviderId, PlanTier);

/// `None` means a call was started but its outcome is unknown
type Sent = Option<i32>;

#[derive(Clone, Default)]
pub struct BilledQuantities {
    sent: Arc<Mutex<HashMap<TierKey, Sent>>>,
}

impl BilledQuantities {
    pub fn new() -> Self {
        Self::default()
    }

    fn sent(&self) -> MutexGuard<'_, HashMap<TierKey, Sent>> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether the line item may not carry `billed`.
    /// A tier with no recorded call is assumed to match its ledger.
    pub fn needs_resync(&self, provider_id: ProviderId, plan_tier: PlanTier, billed: i32) -> bool {
        match self.sent().get(&(provider_id, plan_tier)) {
            None => false,
            Some(None) => true,
            Some(Some(quantity)) => *quantity != billed,
        }
    }

    /// Mark a call as in flight until it is recorded
    pub fn mark_pending(&self, provider_id: ProviderId, plan_tier: PlanTier) {
        self.sent().insert((provider_id, plan_tier), None);
    }

    /// Record a quantity the gateway accepted
    pub fn record(&self, provider_id: ProviderId, plan_tier: PlanTier, quantity: i32) {
        self.sent().insert((provider_id, plan_tier), Some(quantity));
    }

    pub fn last_sent(&self, provider_id: ProviderId, plan_tier: PlanTier) -> Option<i32> {
        self.sent().get(&(provider_id, plan_tier)).copied().flatten()
    }
}
