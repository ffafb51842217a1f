use std::collections::HashMap;
use std::sync::Arc;

use billing_core::{Currency, IdMinter, RequestContext};
use chrono::Utc;

use crate::errors::{TenancyError, TenancyResult};
use crate::store::TenancyStore;
use crate::types::{Customer, Organization};

pub struct TenancyService {
    store: Arc<dyn TenancyStore>,
}

impl TenancyService {
    pub fn new(store: Arc<dyn TenancyStore>) -> Self {
        Self { store }
    }

    pub async fn create_organization(&self, name: String, currency: Currency) -> Organization {
        let org = Organization {
            id: IdMinter::global().next_id(),
            name,
            currency,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };
        self.store.insert_organization(org.clone()).await;
        org
    }

    pub async fn get_organization(&self, id: i64) -> TenancyResult<Organization> {
        self.store
            .get_organization(id)
            .await
            .ok_or(TenancyError::OrganizationNotFound(id))
    }

    pub async fn create_customer(
        &self,
        ctx: &RequestContext,
        name: String,
        email: Option<String>,
        currency: Option<Currency>,
    ) -> Customer {
        let customer = Customer {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            name,
            email,
            currency,
            provider_customer_id: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };
        self.store.insert_customer(customer.clone()).await;
        customer
    }

    pub async fn get_customer(&self, ctx: &RequestContext, id: i64) -> TenancyResult<Customer> {
        self.store
            .get_customer(ctx.org_id, id)
            .await
            .ok_or(TenancyError::CustomerNotFound(id))
    }

    pub async fn list_customers(&self, ctx: &RequestContext) -> Vec<Customer> {
        self.store.list_customers(ctx.org_id).await
    }

    /// Every known organization, used by the scheduler to fan out
    /// per-org job contexts for jobs that have no cross-org store query
    /// of their own.
    pub async fn list_organizations(&self) -> Vec<Organization> {
        self.store.list_organizations().await
    }

    /// Resolves the effective currency for a new subscription per
    /// `explicit → customer.currency → org.currency`.
    pub async fn resolve_currency(
        &self,
        ctx: &RequestContext,
        customer_id: i64,
        explicit: Option<Currency>,
    ) -> TenancyResult<Currency> {
        let customer = self.get_customer(ctx, customer_id).await?;
        let org = self.get_organization(ctx.org_id).await?;
        Ok(Customer::resolve_currency(explicit, &customer, &org))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTenancyStore;
    use billing_core::ActorType;

    fn service() -> TenancyService {
        TenancyService::new(InMemoryTenancyStore::new())
    }

    #[tokio::test]
    async fn currency_falls_back_to_customer_then_org() {
        let _ = IdMinter::install(1);
        let svc = service();
        let org = svc.create_organization("acme".into(), Currency::usd()).await;
        let ctx = RequestContext::new(org.id, ActorType::ApiKey);

        let eur = Currency::parse("EUR").unwrap();
        let customer = svc.create_customer(&ctx, "cust".into(), None, Some(eur)).await;

        let resolved = svc.resolve_currency(&ctx, customer.id, None).await.unwrap();
        assert_eq!(resolved, eur);

        let gbp = Currency::parse("GBP").unwrap();
        let explicit = svc.resolve_currency(&ctx, customer.id, Some(gbp)).await.unwrap();
        assert_eq!(explicit, gbp);
    }

    #[tokio::test]
    async fn currency_falls_back_to_org_when_customer_has_none() {
        let _ = IdMinter::install(2);
        let svc = service();
        let org = svc.create_organization("acme".into(), Currency::usd()).await;
        let ctx = RequestContext::new(org.id, ActorType::ApiKey);
        let customer = svc.create_customer(&ctx, "cust".into(), None, None).await;

        let resolved = svc.resolve_currency(&ctx, customer.id, None).await.unwrap();
        assert_eq!(resolved, Currency::usd());
    }
}
