//! In-memory billing cycle store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{BillingCycle, CycleStatus};

#[async_trait]
pub trait CycleStore: Send + Sync {
    async fn insert(&self, cycle: BillingCycle);
    async fn get(&self, org_id: i64, id: i64) -> Option<BillingCycle>;
    async fn open_cycle_for_subscription(&self, subscription_id: i64) -> Option<BillingCycle>;
    async fn has_open_cycle(&self, subscription_id: i64) -> bool;
    async fn due_for_close(
        &self,
        at: chrono::DateTime<chrono::Utc>,
        test_clock_id: Option<i64>,
    ) -> Vec<BillingCycle>;
    async fn closing_cycles(&self, org_id: i64) -> Vec<BillingCycle>;
    async fn closed_cycles(&self, org_id: i64) -> Vec<BillingCycle>;
}

#[derive(Default)]
pub struct InMemoryCycleStore {
    cycles: RwLock<HashMap<i64, BillingCycle>>,
}

impl InMemoryCycleStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl CycleStore for InMemoryCycleStore {
    async fn insert(&self, cycle: BillingCycle) {
        self.cycles.write().await.insert(cycle.id, cycle);
    }

    async fn get(&self, org_id: i64, id: i64) -> Option<BillingCycle> {
        self.cycles
            .read()
            .await
            .get(&id)
            .filter(|c| c.org_id == org_id)
            .cloned()
    }

    async fn open_cycle_for_subscription(&self, subscription_id: i64) -> Option<BillingCycle> {
        self.cycles
            .read()
            .await
            .values()
            .find(|c| c.subscription_id == subscription_id && c.status == CycleStatus::Open)
            .cloned()
    }

    async fn has_open_cycle(&self, subscription_id: i64) -> bool {
        self.cycles
            .read()
            .await
            .values()
            .any(|c| c.subscription_id == subscription_id && c.status != CycleStatus::Closed)
    }

    async fn due_for_close(
        &self,
        at: chrono::DateTime<chrono::Utc>,
        test_clock_id: Option<i64>,
    ) -> Vec<BillingCycle> {
        self.cycles
            .read()
            .await
            .values()
            .filter(|c| {
                c.status == CycleStatus::Open
                    && c.period_end <= at
                    && c.test_clock_id == test_clock_id
            })
            .cloned()
            .collect()
    }

    async fn closing_cycles(&self, org_id: i64) -> Vec<BillingCycle> {
        self.cycles
            .read()
            .await
            .values()
            .filter(|c| c.org_id == org_id && c.status == CycleStatus::Closing)
            .cloned()
            .collect()
    }

    async fn closed_cycles(&self, org_id: i64) -> Vec<BillingCycle> {
        self.cycles
            .read()
            .await
            .values()
            .filter(|c| c.org_id == org_id && c.status == CycleStatus::Closed)
            .cloned()
            .collect()
    }
}
