//! Per-tier serialization of seat workflows
//!
//! Every read-decide-call-persist cycle for a (provider, plan tier) runs while
//! holding that tier's lock. Batches take several locks, always in tier order,
//! so two batches cannot deadlock each other.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use seatpool_shared::{PlanTier, ProviderId};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type TierKey = (ProviderId, PlanTier);

#[derive(Clone, Default)]
pub struct SeatLocks {
    locks: Arc<Mutex<HashMap<TierKey, Arc<AsyncMutex<()>>>>>,
}

impl SeatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: TierKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(key).or_default())
    }

    /// Wait for exclusive access to one tier
    pub async fn lock(&self, provider_id: ProviderId, plan_tier: PlanTier) -> OwnedMutexGuard<()> {
        self.handle((provider_id, plan_tier)).lock_owned().await
    }

    /// Wait for exclusive access to several tiers
    pub async fn lock_many(
        &self,
        provider_id: ProviderId,
        plan_tiers: impl IntoIterator<Item = PlanTier>,
    ) -> Vec<OwnedMutexGuard<()>> {
        let ordered: BTreeSet<PlanTier> = plan_tiers.into_iter().collect();

        let mut guards = Vec::with_capacity(ordered.len());
        for plan_tier in ordered {
            guards.push(self.lock(provider_id, plan_tier).await);
        }
        guards
    }
}
