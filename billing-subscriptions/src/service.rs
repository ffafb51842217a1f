use std::collections::HashSet;
use std::sync::Arc;

use billing_catalog::{BillingMode, CatalogService, PricingModel};
use billing_core::{Currency, IdMinter, RequestContext};
use billing_tenancy::TenancyService;
use chrono::Utc;

use crate::errors::{SubscriptionError, SubscriptionResult};
use crate::store::SubscriptionStore;
use crate::types::{
    BillingCycleType, CollectionMode, Subscription, SubscriptionEntitlement, SubscriptionItem,
    SubscriptionItemInput, SubscriptionStatus,
};

pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    catalog: Arc<CatalogService>,
    tenancy: Arc<TenancyService>,
}

/// Allowed lifecycle transitions. Repeated transitions to the current
/// state are no-ops, handled by the caller before reaching here.
fn allowed_transition(from: SubscriptionStatus, to: SubscriptionStatus) -> bool {
    use SubscriptionStatus::*;
    matches!(
        (from, to),
        (Draft, Active)
            | (Active, Paused)
            | (Active, Canceled)
            | (Paused, Active)
            | (Paused, Canceled)
            | (Canceled, Ended)
    )
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        catalog: Arc<CatalogService>,
        tenancy: Arc<TenancyService>,
    ) -> Self {
        Self { store, catalog, tenancy }
    }

    pub async fn get(&self, ctx: &RequestContext, id: i64) -> SubscriptionResult<Subscription> {
        self.store
            .get(ctx.org_id, id)
            .await
            .ok_or(SubscriptionError::SubscriptionNotFound(id))
    }

    pub async fn list(&self, ctx: &RequestContext) -> Vec<Subscription> {
        self.store.list(ctx.org_id).await
    }

    pub async fn items(&self, subscription_id: i64) -> Vec<SubscriptionItem> {
        self.store.items_for(subscription_id).await
    }

    pub async fn entitlements(&self, subscription_id: i64) -> Vec<SubscriptionEntitlement> {
        self.store.entitlements_for(subscription_id).await
    }

    pub async fn active_by_customer(
        &self,
        ctx: &RequestContext,
        customer_id: i64,
    ) -> Option<Subscription> {
        self.store.active_by_customer(ctx.org_id, customer_id).await
    }

    /// Creates a DRAFT subscription with its items and entitlements,
    /// resolving `org_id` exclusively from `ctx`.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        customer_id: i64,
        collection_mode: CollectionMode,
        billing_cycle_type: Option<BillingCycleType>,
        explicit_currency: Option<Currency>,
        item_inputs: Vec<SubscriptionItemInput>,
        idempotency_key: Option<String>,
    ) -> SubscriptionResult<Subscription> {
        let reserved_id = IdMinter::global().next_id();
        if let Some(key) = &idempotency_key {
            if let Some(existing_id) = self
                .store
                .reserve_idempotency_key(ctx.org_id, key, reserved_id)
                .await
            {
                return self.get(ctx, existing_id).await;
            }
        }

        self.tenancy
            .get_customer(ctx, customer_id)
            .await
            .map_err(|_| SubscriptionError::MissingCustomer(customer_id))?;

        let billing_cycle_type =
            billing_cycle_type.ok_or(SubscriptionError::InvalidBillingCycleType)?;

        let currency = self
            .tenancy
            .resolve_currency(ctx, customer_id, explicit_currency)
            .await
            .map_err(|_| SubscriptionError::MissingCustomer(customer_id))?;

        if item_inputs.is_empty() {
            return Err(SubscriptionError::MissingSubscriptionItems);
        }

        let now = Utc::now();
        let mut items = Vec::with_capacity(item_inputs.len());
        let mut flat_price_count = 0usize;
        let mut product_ids = Vec::new();

        for input in &item_inputs {
            let (item, product_id, is_flat) =
                self.build_item(ctx, reserved_id, currency, now, input).await?;
            if is_flat {
                flat_price_count += 1;
            }
            product_ids.push(product_id);
            items.push(item);
        }

        if flat_price_count > 1 {
            return Err(SubscriptionError::MultipleFlatPriceItems);
        }

        let subscription = Subscription {
            id: reserved_id,
            org_id: ctx.org_id,
            customer_id,
            status: SubscriptionStatus::Draft,
            collection_mode,
            billing_cycle_type,
            default_currency: currency,
            start_at: now,
            activated_at: None,
            paused_at: None,
            canceled_at: None,
            ended_at: None,
            idempotency_key: idempotency_key.clone(),
        };

        let entitlements = self.build_entitlements(subscription.id, &product_ids, now).await;

        self.store.insert(subscription.clone()).await;
        self.store.replace_items(subscription.id, items).await;
        self.store.replace_entitlements(subscription.id, entitlements).await;

        Ok(subscription)
    }

    /// Expands each product's features into one entitlement row per
    /// feature code, deduplicated across items referencing the same
    /// product.
    async fn build_entitlements(
        &self,
        subscription_id: i64,
        product_ids: &[i64],
        at: chrono::DateTime<Utc>,
    ) -> Vec<SubscriptionEntitlement> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for &product_id in product_ids {
            for feature in self.catalog.features_for_product(product_id).await {
                if !seen.insert(feature.code.clone()) {
                    continue;
                }
                out.push(SubscriptionEntitlement {
                    id: IdMinter::global().next_id(),
                    subscription_id,
                    product_id,
                    feature_code: feature.code,
                    feature_type: feature.feature_type,
                    meter_id: feature.meter_id,
                    effective_from: at,
                    effective_to: None,
                });
            }
        }
        out
    }

    /// Validates one item input against its price and resolves the
    /// meter snapshot (`meter_id`/`meter_code`) for metered/per-unit/
    /// tiered prices from the `PriceAmount` in force at `now`, so a
    /// licensed price carries no meter and a metered price carries the
    /// meter that rating aggregates usage against. Returns the built
    /// item, its product id, and whether its price is `Flat`.
    async fn build_item(
        &self,
        ctx: &RequestContext,
        subscription_id: i64,
        currency: Currency,
        now: chrono::DateTime<Utc>,
        input: &SubscriptionItemInput,
    ) -> SubscriptionResult<(SubscriptionItem, i64, bool)> {
        let price = self
            .catalog
            .get_price(ctx, input.price_id)
            .await
            .map_err(|_| SubscriptionError::MissingPricing(input.price_id))?;
        if !price.active {
            return Err(SubscriptionError::MissingPricing(input.price_id));
        }
        if price.billing_mode == BillingMode::Licensed && input.quantity < 1 {
            return Err(SubscriptionError::InvalidLicensedQuantity(input.price_id));
        }
        if price.pricing_model.is_tiered() && price.tiers.is_empty() {
            return Err(SubscriptionError::MissingTiers(input.price_id));
        }

        let (meter_id, meter_code) = if price.pricing_model.requires_meter() {
            let amounts = self.catalog.price_amounts_for(price.id).await;
            match amounts.iter().find(|a| a.currency == currency && a.covers(now)) {
                Some(amount) => match amount.meter_id {
                    Some(meter_id) => {
                        let meter = self
                            .catalog
                            .get_meter(ctx, meter_id)
                            .await
                            .map_err(|_| SubscriptionError::InvalidMeterId(meter_id))?;
                        (Some(meter_id), Some(meter.code))
                    }
                    None => (None, None),
                },
                None => (None, None),
            }
        } else {
            (None, None)
        };

        let item = SubscriptionItem {
            id: IdMinter::global().next_id(),
            subscription_id,
            price_id: price.id,
            price_code: price.code.clone(),
            meter_id,
            meter_code,
            quantity: input.quantity,
            billing_mode: price.billing_mode,
            billing_threshold: input.billing_threshold,
        };
        Ok((item, price.product_id, price.pricing_model == PricingModel::Flat))
    }

    /// Replaces the item set of an ACTIVE subscription: closes current
    /// entitlements, installs the new items, and rebuilds entitlements.
    pub async fn replace_items(
        &self,
        ctx: &RequestContext,
        subscription_id: i64,
        item_inputs: Vec<SubscriptionItemInput>,
    ) -> SubscriptionResult<Vec<SubscriptionItem>> {
        let subscription = self.get(ctx, subscription_id).await?;
        if subscription.status != SubscriptionStatus::Active {
            return Err(SubscriptionError::InvalidTransition {
                from: subscription.status,
                to: SubscriptionStatus::Active,
            });
        }

        let now = Utc::now();
        let mut items = Vec::with_capacity(item_inputs.len());
        let mut product_ids = Vec::new();
        let mut flat_price_count = 0usize;

        for input in &item_inputs {
            let (item, product_id, is_flat) = self
                .build_item(ctx, subscription_id, subscription.default_currency, now, input)
                .await?;
            if is_flat {
                flat_price_count += 1;
            }
            product_ids.push(product_id);
            items.push(item);
        }
        if flat_price_count > 1 {
            return Err(SubscriptionError::MultipleFlatPriceItems);
        }

        self.store.close_entitlements(subscription_id, now).await;
        self.store.replace_items(subscription_id, items.clone()).await;
        let entitlements = self.build_entitlements(subscription_id, &product_ids, now).await;
        self.store.replace_entitlements(subscription_id, entitlements).await;

        Ok(items)
    }

    /// DRAFT -> ACTIVE. Re-validates activation preconditions under the
    /// assumption the caller holds whatever row lock their storage layer
    /// provides.
    pub async fn activate(&self, ctx: &RequestContext, subscription_id: i64) -> SubscriptionResult<Subscription> {
        let mut subscription = self.get(ctx, subscription_id).await?;
        if subscription.status == SubscriptionStatus::Active {
            return Ok(subscription);
        }
        if !allowed_transition(subscription.status, SubscriptionStatus::Active) {
            return Err(SubscriptionError::InvalidTransition {
                from: subscription.status,
                to: SubscriptionStatus::Active,
            });
        }

        let items = self.store.items_for(subscription_id).await;
        if items.is_empty() {
            return Err(SubscriptionError::MissingSubscriptionItems);
        }
        for item in &items {
            let price = self
                .catalog
                .get_price(ctx, item.price_id)
                .await
                .map_err(|_| SubscriptionError::MissingPricing(item.price_id))?;
            if !price.active {
                return Err(SubscriptionError::MissingPricing(item.price_id));
            }
            if let Some(meter_id) = item.meter_id {
                self.catalog
                    .get_meter(ctx, meter_id)
                    .await
                    .map_err(|_| SubscriptionError::InvalidMeterId(meter_id))?;
            }
        }
        self.tenancy
            .get_customer(ctx, subscription.customer_id)
            .await
            .map_err(|_| SubscriptionError::MissingCustomer(subscription.customer_id))?;

        subscription.status = SubscriptionStatus::Active;
        subscription.activated_at = Some(Utc::now());
        self.store.insert(subscription.clone()).await;
        Ok(subscription)
    }

    pub async fn pause(&self, ctx: &RequestContext, subscription_id: i64) -> SubscriptionResult<Subscription> {
        self.transition(ctx, subscription_id, SubscriptionStatus::Paused, |s| {
            s.paused_at = Some(Utc::now());
        })
        .await
    }

    pub async fn resume(&self, ctx: &RequestContext, subscription_id: i64) -> SubscriptionResult<Subscription> {
        self.transition(ctx, subscription_id, SubscriptionStatus::Active, |s| {
            s.activated_at = Some(Utc::now());
        })
        .await
    }

    pub async fn cancel(&self, ctx: &RequestContext, subscription_id: i64) -> SubscriptionResult<Subscription> {
        self.transition(ctx, subscription_id, SubscriptionStatus::Canceled, |s| {
            s.canceled_at = Some(Utc::now());
        })
        .await
    }

    /// CANCELED -> ENDED. The caller (composition root) is responsible
    /// for resolving whether open cycles or unfinalized invoices remain,
    /// since that spans the cycle/invoice crates ("End
    /// preconditions").
    pub async fn end(
        &self,
        ctx: &RequestContext,
        subscription_id: i64,
        has_open_cycles: bool,
        has_unfinalized_invoices: bool,
    ) -> SubscriptionResult<Subscription> {
        if has_open_cycles || has_unfinalized_invoices {
            return Err(SubscriptionError::OpenObligationsRemain(subscription_id));
        }
        self.transition(ctx, subscription_id, SubscriptionStatus::Ended, |s| {
            s.ended_at = Some(Utc::now());
        })
        .await
    }

    async fn transition(
        &self,
        ctx: &RequestContext,
        subscription_id: i64,
        to: SubscriptionStatus,
        apply: impl FnOnce(&mut Subscription),
    ) -> SubscriptionResult<Subscription> {
        let mut subscription = self.get(ctx, subscription_id).await?;
        if subscription.status == to {
            return Ok(subscription);
        }
        if !allowed_transition(subscription.status, to) {
            return Err(SubscriptionError::InvalidTransition { from: subscription.status, to });
        }
        subscription.status = to;
        apply(&mut subscription);
        self.store.insert(subscription.clone()).await;
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_catalog::{BillingInterval, CatalogService, InMemoryCatalogStore, PricingModel};
    use billing_core::ActorType;
    use billing_tenancy::{InMemoryTenancyStore, TenancyService};

    async fn fixtures() -> (SubscriptionService, RequestContext, i64) {
        let _ = IdMinter::install(1);
        let catalog = Arc::new(CatalogService::new(InMemoryCatalogStore::new()));
        let tenancy = Arc::new(TenancyService::new(InMemoryTenancyStore::new()));
        let store = crate::store::InMemorySubscriptionStore::new();

        let org = tenancy.create_organization("acme".into(), Currency::usd()).await;
        let ctx = RequestContext::new(org.id, ActorType::ApiKey);
        let customer = tenancy.create_customer(&ctx, "cust".into(), None, None).await;

        let product = catalog
            .create_product(&ctx, "pro".into(), Default::default())
            .await
            .unwrap();
        let price = catalog
            .create_price(
                &ctx,
                product.id,
                "flat".into(),
                PricingModel::Flat,
                BillingMode::Licensed,
                BillingInterval::Month,
                1,
                vec![],
            )
            .await
            .unwrap();

        let svc = SubscriptionService::new(store, catalog, tenancy);
        (svc, ctx, price.id)
    }

    #[tokio::test]
    async fn create_then_activate_happy_path() {
        let (svc, ctx, price_id) = fixtures().await;
        let customer = svc.tenancy.list_customers(&ctx).await;
        let customer_id = customer[0].id;

        let sub = svc
            .create(
                &ctx,
                customer_id,
                CollectionMode::ChargeAutomatically,
                Some(BillingCycleType::Monthly),
                None,
                vec![SubscriptionItemInput { price_id, quantity: 1, billing_threshold: None }],
                None,
            )
            .await
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Draft);

        let activated = svc.activate(&ctx, sub.id).await.unwrap();
        assert_eq!(activated.status, SubscriptionStatus::Active);
        assert!(activated.activated_at.is_some());
    }

    #[tokio::test]
    async fn create_rejects_empty_items() {
        let (svc, ctx, _price_id) = fixtures().await;
        let customers = svc.tenancy.list_customers(&ctx).await;
        let err = svc
            .create(
                &ctx,
                customers[0].id,
                CollectionMode::SendInvoice,
                Some(BillingCycleType::Monthly),
                None,
                vec![],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::MissingSubscriptionItems));
    }

    #[tokio::test]
    async fn idempotency_key_replay_returns_original() {
        let (svc, ctx, price_id) = fixtures().await;
        let customers = svc.tenancy.list_customers(&ctx).await;
        let input = vec![SubscriptionItemInput { price_id, quantity: 1, billing_threshold: None }];

        let first = svc
            .create(
                &ctx,
                customers[0].id,
                CollectionMode::SendInvoice,
                Some(BillingCycleType::Monthly),
                None,
                input.clone(),
                Some("key-1".into()),
            )
            .await
            .unwrap();
        let second = svc
            .create(
                &ctx,
                customers[0].id,
                CollectionMode::SendInvoice,
                Some(BillingCycleType::Monthly),
                None,
                input,
                Some("key-1".into()),
            )
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let (svc, ctx, price_id) = fixtures().await;
        let customers = svc.tenancy.list_customers(&ctx).await;
        let sub = svc
            .create(
                &ctx,
                customers[0].id,
                CollectionMode::SendInvoice,
                Some(BillingCycleType::Monthly),
                None,
                vec![SubscriptionItemInput { price_id, quantity: 1, billing_threshold: None }],
                None,
            )
            .await
            .unwrap();

        let err = svc.cancel(&ctx, sub.id).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn end_requires_no_open_obligations() {
        let (svc, ctx, price_id) = fixtures().await;
        let customers = svc.tenancy.list_customers(&ctx).await;
        let sub = svc
            .create(
                &ctx,
                customers[0].id,
                CollectionMode::SendInvoice,
                Some(BillingCycleType::Monthly),
                None,
                vec![SubscriptionItemInput { price_id, quantity: 1, billing_threshold: None }],
                None,
            )
            .await
            .unwrap();
        svc.activate(&ctx, sub.id).await.unwrap();
        svc.cancel(&ctx, sub.id).await.unwrap();

        let err = svc.end(&ctx, sub.id, true, false).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::OpenObligationsRemain(_)));

        let ended = svc.end(&ctx, sub.id, false, false).await.unwrap();
        assert_eq!(ended.status, SubscriptionStatus::Ended);
    }
}
