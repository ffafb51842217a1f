//! In-memory tenancy store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{Customer, Organization};

#[async_trait]
pub trait TenancyStore: Send + Sync {
    async fn insert_organization(&self, org: Organization);
    async fn get_organization(&self, id: i64) -> Option<Organization>;
    async fn list_organizations(&self) -> Vec<Organization>;

    async fn insert_customer(&self, customer: Customer);
    async fn get_customer(&self, org_id: i64, id: i64) -> Option<Customer>;
    async fn list_customers(&self, org_id: i64) -> Vec<Customer>;
}

#[derive(Default)]
pub struct InMemoryTenancyStore {
    organizations: RwLock<HashMap<i64, Organization>>,
    customers: RwLock<HashMap<i64, Customer>>,
}

impl InMemoryTenancyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TenancyStore for InMemoryTenancyStore {
    async fn insert_organization(&self, org: Organization) {
        self.organizations.write().await.insert(org.id, org);
    }

    async fn get_organization(&self, id: i64) -> Option<Organization> {
        self.organizations.read().await.get(&id).cloned()
    }

    async fn list_organizations(&self) -> Vec<Organization> {
        let mut v: Vec<_> = self.organizations.read().await.values().cloned().collect();
        v.sort_by_key(|o| o.id);
        v
    }

    async fn insert_customer(&self, customer: Customer) {
        self.customers.write().await.insert(customer.id, customer);
    }

    async fn get_customer(&self, org_id: i64, id: i64) -> Option<Customer> {
        self.customers
            .read()
            .await
            .get(&id)
            .filter(|c| c.org_id == org_id)
            .cloned()
    }

    async fn list_customers(&self, org_id: i64) -> Vec<Customer> {
        let mut v: Vec<_> = self
            .customers
            .read()
            .await
            .values()
            .filter(|c| c.org_id == org_id)
            .cloned()
            .collect();
        v.sort_by_key(|c| (c.created_at, c.id));
        v
    }
}
