//! In-memory subscription store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{Subscription, SubscriptionEntitlement, SubscriptionItem};

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn insert(&self, subscription: Subscription);
    async fn get(&self, org_id: i64, id: i64) -> Option<Subscription>;
    async fn list(&self, org_id: i64) -> Vec<Subscription>;
    async fn active_by_customer(&self, org_id: i64, customer_id: i64) -> Option<Subscription>;

    async fn replace_items(&self, subscription_id: i64, items: Vec<SubscriptionItem>);
    async fn items_for(&self, subscription_id: i64) -> Vec<SubscriptionItem>;

    async fn replace_entitlements(&self, subscription_id: i64, entitlements: Vec<SubscriptionEntitlement>);
    async fn close_entitlements(&self, subscription_id: i64, at: chrono::DateTime<chrono::Utc>);
    async fn entitlements_for(&self, subscription_id: i64) -> Vec<SubscriptionEntitlement>;

    async fn reserve_idempotency_key(&self, org_id: i64, key: &str, new_id: i64) -> Option<i64>;
}

#[derive(Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: RwLock<HashMap<i64, Subscription>>,
    items: RwLock<HashMap<i64, Vec<SubscriptionItem>>>,
    entitlements: RwLock<HashMap<i64, Vec<SubscriptionEntitlement>>>,
    idempotency: RwLock<HashMap<(i64, String), i64>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn insert(&self, subscription: Subscription) {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription);
    }

    async fn get(&self, org_id: i64, id: i64) -> Option<Subscription> {
        self.subscriptions
            .read()
            .await
            .get(&id)
            .filter(|s| s.org_id == org_id)
            .cloned()
    }

    async fn list(&self, org_id: i64) -> Vec<Subscription> {
        self.subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.org_id == org_id)
            .cloned()
            .collect()
    }

    async fn active_by_customer(&self, org_id: i64, customer_id: i64) -> Option<Subscription> {
        use crate::types::SubscriptionStatus;
        self.subscriptions
            .read()
            .await
            .values()
            .find(|s| {
                s.org_id == org_id
                    && s.customer_id == customer_id
                    && s.status == SubscriptionStatus::Active
            })
            .cloned()
    }

    async fn replace_items(&self, subscription_id: i64, items: Vec<SubscriptionItem>) {
        self.items.write().await.insert(subscription_id, items);
    }

    async fn items_for(&self, subscription_id: i64) -> Vec<SubscriptionItem> {
        self.items
            .read()
            .await
            .get(&subscription_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn replace_entitlements(&self, subscription_id: i64, entitlements: Vec<SubscriptionEntitlement>) {
        let mut map = self.entitlements.write().await;
        let existing = map.entry(subscription_id).or_default();
        existing.extend(entitlements);
    }

    async fn close_entitlements(&self, subscription_id: i64, at: chrono::DateTime<chrono::Utc>) {
        let mut map = self.entitlements.write().await;
        if let Some(entitlements) = map.get_mut(&subscription_id) {
            for e in entitlements.iter_mut() {
                if e.effective_to.is_none() {
                    e.effective_to = Some(at);
                }
            }
        }
    }

    async fn entitlements_for(&self, subscription_id: i64) -> Vec<SubscriptionEntitlement> {
        self.entitlements
            .read()
            .await
            .get(&subscription_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn reserve_idempotency_key(&self, org_id: i64, key: &str, new_id: i64) -> Option<i64> {
        let mut map = self.idempotency.write().await;
        let entry = map.entry((org_id, key.to_string())).or_insert(new_id);
        if *entry == new_id {
            None
        } else {
            Some(*entry)
        }
    }
}
