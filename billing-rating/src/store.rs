//! In-memory rating result store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::RatingResult;

#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Upserts keyed on `(billing_cycle_id, subscription_item_id)` so
    /// re-running rating for a cycle is idempotent.
    async fn upsert(&self, result: RatingResult);
    async fn for_cycle(&self, billing_cycle_id: i64) -> Vec<RatingResult>;
}

#[derive(Default)]
pub struct InMemoryRatingStore {
    results: RwLock<HashMap<(i64, i64), RatingResult>>,
}

impl InMemoryRatingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RatingStore for InMemoryRatingStore {
    async fn upsert(&self, result: RatingResult) {
        self.results
            .write()
            .await
            .insert((result.billing_cycle_id, result.subscription_item_id), result);
    }

    async fn for_cycle(&self, billing_cycle_id: i64) -> Vec<RatingResult> {
        self.results
            .read()
            .await
            .values()
            .filter(|r| r.billing_cycle_id == billing_cycle_id)
            .cloned()
            .collect()
    }
}
