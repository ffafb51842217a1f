//! In-memory usage event store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::types::UsageEvent;

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn insert(&self, event: UsageEvent);
    async fn get(&self, org_id: i64, id: i64) -> Option<UsageEvent>;
    async fn find_by_idempotency_key(&self, org_id: i64, key: &str) -> Option<UsageEvent>;

    /// Events for a `(subscription_id, meter_id)` pair within
    /// `[period_start, period_end)`, for rating aggregation.
    async fn in_range(
        &self,
        subscription_id: i64,
        meter_id: i64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Vec<UsageEvent>;
}

#[derive(Default)]
pub struct InMemoryUsageStore {
    events: RwLock<HashMap<i64, UsageEvent>>,
    by_idempotency_key: RwLock<HashMap<(i64, String), i64>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn insert(&self, event: UsageEvent) {
        if let Some(key) = &event.idempotency_key {
            self.by_idempotency_key
                .write()
                .await
                .insert((event.org_id, key.clone()), event.id);
        }
        self.events.write().await.insert(event.id, event);
    }

    async fn get(&self, org_id: i64, id: i64) -> Option<UsageEvent> {
        self.events
            .read()
            .await
            .get(&id)
            .filter(|e| e.org_id == org_id)
            .cloned()
    }

    async fn find_by_idempotency_key(&self, org_id: i64, key: &str) -> Option<UsageEvent> {
        let id = *self
            .by_idempotency_key
            .read()
            .await
            .get(&(org_id, key.to_string()))?;
        self.events.read().await.get(&id).cloned()
    }

    async fn in_range(
        &self,
        subscription_id: i64,
        meter_id: i64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Vec<UsageEvent> {
        self.events
            .read()
            .await
            .values()
            .filter(|e| {
                e.subscription_id == Some(subscription_id)
                    && e.meter_id == Some(meter_id)
                    && e.recorded_at >= period_start
                    && e.recorded_at < period_end
            })
            .cloned()
            .collect()
    }
}
