use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use billing_catalog::CatalogService;
use billing_core::{IdMinter, RequestContext};
use billing_subscriptions::SubscriptionService;

use crate::errors::{UsageError, UsageResult};
use crate::store::UsageStore;
use crate::types::{CreateIngestRequest, UsageEvent, UsageEventStatus};

/// Org-scoped admission control for usage writes. The default
/// [`AlwaysAllowQuotaGate`] never denies; a deployment wires in whatever
/// rate/volume policy it enforces.
#[async_trait]
pub trait QuotaGate: Send + Sync {
    async fn check(&self, org_id: i64) -> bool;
}

pub struct AlwaysAllowQuotaGate;

#[async_trait]
impl QuotaGate for AlwaysAllowQuotaGate {
    async fn check(&self, _org_id: i64) -> bool {
        true
    }
}

pub struct UsageService {
    store: Arc<dyn UsageStore>,
    catalog: Arc<CatalogService>,
    subscriptions: Arc<SubscriptionService>,
    quota: Arc<dyn QuotaGate>,
}

impl UsageService {
    pub fn new(
        store: Arc<dyn UsageStore>,
        catalog: Arc<CatalogService>,
        subscriptions: Arc<SubscriptionService>,
        quota: Arc<dyn QuotaGate>,
    ) -> Self {
        Self { store, catalog, subscriptions, quota }
    }

    pub async fn get(&self, ctx: &RequestContext, id: i64) -> UsageResult<UsageEvent> {
        self.store
            .get(ctx.org_id, id)
            .await
            .ok_or(UsageError::EventNotFound(id))
    }

    /// Runs the ingestion pipeline from in order: quota check,
    /// idempotency fast path, subscription resolution, meter resolution,
    /// entitlement gate, persist.
    pub async fn ingest(&self, ctx: &RequestContext, req: CreateIngestRequest) -> UsageResult<UsageEvent> {
        if !self.quota.check(ctx.org_id).await {
            return Err(UsageError::QuotaExceeded(ctx.org_id));
        }

        if let Some(key) = &req.idempotency_key {
            if let Some(existing) = self.store.find_by_idempotency_key(ctx.org_id, key).await {
                return Ok(existing);
            }
        }

        let subscription = self.subscriptions.active_by_customer(ctx, req.customer_id).await;

        let Some(subscription) = subscription else {
            let event = UsageEvent {
                id: IdMinter::global().next_id(),
                org_id: ctx.org_id,
                customer_id: req.customer_id,
                subscription_id: None,
                subscription_item_id: None,
                meter_id: None,
                meter_code: req.meter_code.clone(),
                value: req.value,
                recorded_at: req.recorded_at,
                idempotency_key: req.idempotency_key.clone(),
                status: UsageEventStatus::UnmatchedSubscription,
                error: Some("no active subscription for customer".into()),
                metadata: req.metadata.clone(),
            };
            self.store.insert(event.clone()).await;
            return Ok(event);
        };

        let meter = self.catalog.get_meter_by_code(ctx, &req.meter_code).await.ok();

        let Some(meter) = meter else {
            let event = UsageEvent {
                id: IdMinter::global().next_id(),
                org_id: ctx.org_id,
                customer_id: req.customer_id,
                subscription_id: Some(subscription.id),
                subscription_item_id: None,
                meter_id: None,
                meter_code: req.meter_code.clone(),
                value: req.value,
                recorded_at: req.recorded_at,
                idempotency_key: req.idempotency_key.clone(),
                status: UsageEventStatus::UnmatchedMeter,
                error: Some("no meter matches this code".into()),
                metadata: req.metadata.clone(),
            };
            self.store.insert(event.clone()).await;
            return Ok(event);
        };

        let entitlements = self.subscriptions.entitlements(subscription.id).await;
        let entitled = entitlements
            .iter()
            .any(|e| e.meter_id == Some(meter.id) && e.is_active_at(req.recorded_at));
        if !entitled {
            return Err(UsageError::FeatureNotEntitled {
                subscription_id: subscription.id,
                meter_id: meter.id,
            });
        }

        let items = self.subscriptions.items(subscription.id).await;
        let subscription_item_id = items.iter().find(|i| i.meter_id == Some(meter.id)).map(|i| i.id);

        let event = UsageEvent {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            customer_id: req.customer_id,
            subscription_id: Some(subscription.id),
            subscription_item_id,
            meter_id: Some(meter.id),
            meter_code: req.meter_code,
            value: req.value,
            recorded_at: req.recorded_at,
            idempotency_key: req.idempotency_key,
            status: UsageEventStatus::Enriched,
            error: None,
            metadata: req.metadata,
        };
        self.store.insert(event.clone()).await;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_catalog::{
        Aggregation, BillingInterval, BillingMode, InMemoryCatalogStore, PricingModel,
    };
    use billing_core::{ActorType, Currency};
    use billing_subscriptions::{
        BillingCycleType, CollectionMode, InMemorySubscriptionStore, SubscriptionItemInput,
    };
    use billing_tenancy::{InMemoryTenancyStore, TenancyService};

    async fn fixtures() -> (UsageService, RequestContext, i64, i64) {
        let _ = IdMinter::install(1);
        let catalog = Arc::new(CatalogService::new(InMemoryCatalogStore::new()));
        let tenancy = Arc::new(TenancyService::new(InMemoryTenancyStore::new()));
        let sub_store = InMemorySubscriptionStore::new();
        let subscriptions =
            Arc::new(SubscriptionService::new(sub_store, catalog.clone(), tenancy.clone()));
        let usage_store = crate::store::InMemoryUsageStore::new();

        let org = tenancy.create_organization("acme".into(), Currency::usd()).await;
        let ctx = RequestContext::new(org.id, ActorType::ApiKey);
        let customer = tenancy.create_customer(&ctx, "cust".into(), None, None).await;

        let product = catalog
            .create_product(&ctx, "pro".into(), Default::default())
            .await
            .unwrap();
        let meter = catalog
            .create_meter(&ctx, "api_calls".into(), Aggregation::Sum, "calls".into())
            .await
            .unwrap();
        let feature = catalog
            .create_feature(
                &ctx,
                product.id,
                "api_calls".into(),
                "API calls".into(),
                billing_catalog::FeatureType::Metered,
                Some(meter.id),
            )
            .await
            .unwrap();
        let _ = feature;
        let price = catalog
            .create_price(
                &ctx,
                product.id,
                "per-call".into(),
                PricingModel::PerUnit,
                BillingMode::Metered,
                BillingInterval::Month,
                1,
                vec![],
            )
            .await
            .unwrap();

        let sub = subscriptions
            .create(
                &ctx,
                customer.id,
                CollectionMode::ChargeAutomatically,
                Some(BillingCycleType::Monthly),
                None,
                vec![SubscriptionItemInput { price_id: price.id, quantity: 1, billing_threshold: None }],
                None,
            )
            .await
            .unwrap();
        subscriptions.activate(&ctx, sub.id).await.unwrap();

        let quota = Arc::new(AlwaysAllowQuotaGate);
        let svc = UsageService::new(usage_store, catalog, subscriptions, quota);
        (svc, ctx, customer.id, meter.id)
    }

    #[tokio::test]
    async fn ingest_enriches_matched_event() {
        let (svc, ctx, customer_id, _meter_id) = fixtures().await;
        let event = svc
            .ingest(
                &ctx,
                CreateIngestRequest {
                    customer_id,
                    meter_code: "api_calls".into(),
                    value: 1.0,
                    recorded_at: chrono::Utc::now(),
                    idempotency_key: None,
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(event.status, UsageEventStatus::Enriched);
        assert!(event.subscription_id.is_some());
        assert!(event.meter_id.is_some());
    }

    #[tokio::test]
    async fn ingest_marks_unmatched_subscription() {
        let (svc, ctx, _customer_id, _meter_id) = fixtures().await;
        let event = svc
            .ingest(
                &ctx,
                CreateIngestRequest {
                    customer_id: 999_999,
                    meter_code: "api_calls".into(),
                    value: 1.0,
                    recorded_at: chrono::Utc::now(),
                    idempotency_key: None,
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(event.status, UsageEventStatus::UnmatchedSubscription);
    }

    #[tokio::test]
    async fn ingest_marks_unmatched_meter() {
        let (svc, ctx, customer_id, _meter_id) = fixtures().await;
        let event = svc
            .ingest(
                &ctx,
                CreateIngestRequest {
                    customer_id,
                    meter_code: "does_not_exist".into(),
                    value: 1.0,
                    recorded_at: chrono::Utc::now(),
                    idempotency_key: None,
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(event.status, UsageEventStatus::UnmatchedMeter);
    }

    #[tokio::test]
    async fn idempotency_key_replay_skips_downstream() {
        let (svc, ctx, customer_id, _meter_id) = fixtures().await;
        let req = CreateIngestRequest {
            customer_id,
            meter_code: "api_calls".into(),
            value: 1.0,
            recorded_at: chrono::Utc::now(),
            idempotency_key: Some("key-1".into()),
            metadata: HashMap::new(),
        };
        let first = svc.ingest(&ctx, req.clone()).await.unwrap();
        let second = svc.ingest(&ctx, req).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn quota_denial_short_circuits_ingest() {
        let (svc, ctx, customer_id, _meter_id) = fixtures().await;
        struct DenyAll;
        #[async_trait::async_trait]
        impl QuotaGate for DenyAll {
            async fn check(&self, _org_id: i64) -> bool {
                false
            }
        }
        let svc = UsageService { quota: Arc::new(DenyAll), ..svc };
        let err = svc
            .ingest(
                &ctx,
                CreateIngestRequest {
                    customer_id,
                    meter_code: "api_calls".into(),
                    value: 1.0,
                    recorded_at: chrono::Utc::now(),
                    idempotency_key: None,
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UsageError::QuotaExceeded(_)));
    }
}
