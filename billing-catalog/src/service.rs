//! Catalog service: validated writes over the read-mostly catalog store.

use std::collections::HashMap;
use std::sync::Arc;

use billing_core::{Currency, IdMinter, RequestContext};
use chrono::Utc;

use crate::errors::{CatalogError, CatalogResult};
use crate::store::{find_overlap, CatalogStore};
use crate::types::*;

pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub async fn create_product(
        &self,
        ctx: &RequestContext,
        code: String,
        metadata: HashMap<String, serde_json::Value>,
    ) -> CatalogResult<Product> {
        let product = Product {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            code,
            active: true,
            metadata,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.store.insert_product(product.clone()).await;
        Ok(product)
    }

    pub async fn get_product(&self, ctx: &RequestContext, id: i64) -> CatalogResult<Product> {
        self.store
            .get_product(ctx.org_id, id)
            .await
            .ok_or(CatalogError::ProductNotFound(id))
    }

    pub async fn list_products(&self, ctx: &RequestContext) -> Vec<Product> {
        self.store.list_products(ctx.org_id).await
    }

    /// Creates a feature and links it to `product_id`. Metered features
    /// must reference an existing meter.
    pub async fn create_feature(
        &self,
        ctx: &RequestContext,
        product_id: i64,
        code: String,
        name: String,
        feature_type: FeatureType,
        meter_id: Option<i64>,
    ) -> CatalogResult<Feature> {
        if feature_type == FeatureType::Metered {
            let meter_id = meter_id.ok_or_else(|| CatalogError::MeteredFeatureMissingMeter {
                code: code.clone(),
            })?;
            self.store
                .get_meter(ctx.org_id, meter_id)
                .await
                .ok_or(CatalogError::MeterNotFound(meter_id))?;
        }
        let feature = Feature {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            code,
            name,
            feature_type,
            meter_id,
            created_at: Utc::now(),
        };
        self.store.insert_feature(feature.clone()).await;
        self.store
            .link_product_feature(ProductFeature {
                product_id,
                feature_id: feature.id,
            })
            .await;
        Ok(feature)
    }

    pub async fn features_for_product(&self, product_id: i64) -> Vec<Feature> {
        self.store.features_for_product(product_id).await
    }

    pub async fn create_meter(
        &self,
        ctx: &RequestContext,
        code: String,
        aggregation: Aggregation,
        unit: String,
    ) -> CatalogResult<Meter> {
        let meter = Meter {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            code,
            aggregation,
            unit,
            active: true,
            created_at: Utc::now(),
        };
        self.store.insert_meter(meter.clone()).await;
        Ok(meter)
    }

    pub async fn get_meter(&self, ctx: &RequestContext, id: i64) -> CatalogResult<Meter> {
        self.store
            .get_meter(ctx.org_id, id)
            .await
            .ok_or(CatalogError::MeterNotFound(id))
    }

    pub async fn get_meter_by_code(&self, ctx: &RequestContext, code: &str) -> CatalogResult<Meter> {
        self.store
            .get_meter_by_code(ctx.org_id, code)
            .await
            .ok_or_else(|| CatalogError::MeterNotFound(0))
    }

    /// Validates pricing-model/billing-mode coherence and version
    /// monotonicity, then creates a new, unreferenced price.
    /// `tiers` must be non-empty for tiered models and every tier must
    /// carry at least one amount field.
    pub async fn create_price(
        &self,
        ctx: &RequestContext,
        product_id: i64,
        code: String,
        pricing_model: PricingModel,
        billing_mode: BillingMode,
        billing_interval: BillingInterval,
        version: i64,
        tiers: Vec<PriceTier>,
    ) -> CatalogResult<Price> {
        if pricing_model.is_tiered() && tiers.is_empty() {
            return Err(CatalogError::TieredPriceRequiresTiers { price_id: 0 });
        }
        for tier in &tiers {
            if !tier.has_amount() {
                return Err(CatalogError::TierMissingAmount { price_id: 0 });
            }
        }
        if let Some(current) = self.store.latest_version(ctx.org_id, &code).await {
            if version <= current {
                return Err(CatalogError::VersionNotMonotonic {
                    code,
                    current,
                    new: version,
                });
            }
        }

        let price = Price {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            product_id,
            code,
            pricing_model,
            billing_mode,
            billing_interval,
            version,
            active: true,
            retired_at: None,
            tiers,
            created_at: Utc::now(),
        };
        self.store.insert_price(price.clone()).await;
        Ok(price)
    }

    pub async fn get_price(&self, ctx: &RequestContext, id: i64) -> CatalogResult<Price> {
        self.store
            .get_price(ctx.org_id, id)
            .await
            .ok_or(CatalogError::PriceNotFound(id))
    }

    pub async fn list_prices(&self, ctx: &RequestContext) -> Vec<Price> {
        self.store.list_prices(ctx.org_id).await
    }

    pub async fn add_price_tier(
        &self,
        ctx: &RequestContext,
        price_id: i64,
        tier: PriceTier,
    ) -> CatalogResult<Price> {
        if !tier.has_amount() {
            return Err(CatalogError::TierMissingAmount { price_id });
        }
        self.store
            .add_price_tier(ctx.org_id, price_id, tier)
            .await
            .ok_or(CatalogError::PriceNotFound(price_id))
    }

    /// Marks `price_id` non-selectable for new subscriptions without
    /// invalidating cycles that already reference it.
    pub async fn retire_price(&self, ctx: &RequestContext, price_id: i64) -> CatalogResult<Price> {
        let mut price = self.get_price(ctx, price_id).await?;
        price.retired_at = Some(Utc::now());
        price.active = false;
        self.store.insert_price(price.clone()).await;
        Ok(price)
    }

    /// Creates a time-sliced price amount, rejecting ranges that overlap
    /// an existing `(price_id, currency)` range, and enforcing that
    /// non-flat pricing models carry a meter.
    pub async fn create_price_amount(
        &self,
        ctx: &RequestContext,
        price_id: i64,
        currency: Currency,
        unit_amount_cents: i64,
        minimum_amount_cents: Option<i64>,
        maximum_amount_cents: Option<i64>,
        meter_id: Option<i64>,
        effective_from: chrono::DateTime<Utc>,
        effective_to: Option<chrono::DateTime<Utc>>,
    ) -> CatalogResult<PriceAmount> {
        let price = self.get_price(ctx, price_id).await?;

        if price.pricing_model.requires_meter() && meter_id.is_none() {
            return Err(CatalogError::PricingModelRequiresMeter {
                price_id,
                model: price.pricing_model,
            });
        }
        if price.pricing_model == PricingModel::Flat && meter_id.is_some() {
            return Err(CatalogError::FlatPriceMustNotReferenceMeter { price_id });
        }

        let candidate = PriceAmount {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            price_id,
            currency,
            unit_amount_cents,
            minimum_amount_cents,
            maximum_amount_cents,
            meter_id,
            effective_from,
            effective_to,
            created_at: Utc::now(),
        };

        let existing = self.store.price_amounts_for(price_id).await;
        if find_overlap(&existing, &candidate).is_some() {
            return Err(CatalogError::OverlappingPriceAmountRange {
                price_id,
                currency: currency.to_string(),
            });
        }

        self.store.insert_price_amount(candidate.clone()).await;
        Ok(candidate)
    }

    pub async fn price_amounts_for(&self, price_id: i64) -> Vec<PriceAmount> {
        self.store.price_amounts_for(price_id).await
    }

    /// Idempotency-key guard for create-shaped catalog endpoints (spec
    /// §5 family (a)). Returns `Ok(Some(existing_id))` when the key was
    /// already used for this entity kind.
    pub async fn check_idempotency(
        &self,
        ctx: &RequestContext,
        kind: &'static str,
        key: Option<&str>,
        candidate_id: i64,
    ) -> Option<i64> {
        let key = key?;
        self.store
            .reserve_idempotency_key(ctx.org_id, kind, key, candidate_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCatalogStore;
    use billing_core::ActorType;

    fn ctx() -> RequestContext {
        RequestContext::new(1, ActorType::ApiKey)
    }

    fn service() -> CatalogService {
        let _ = IdMinter::install(1);
        CatalogService::new(InMemoryCatalogStore::new())
    }

    #[tokio::test]
    async fn flat_price_rejects_meter_reference() {
        let svc = service();
        let ctx = ctx();
        let product = svc
            .create_product(&ctx, "pro".into(), Default::default())
            .await
            .unwrap();
        let price = svc
            .create_price(
                &ctx,
                product.id,
                "flat-free".into(),
                PricingModel::Flat,
                BillingMode::Licensed,
                BillingInterval::Month,
                1,
                vec![],
            )
            .await
            .unwrap();

        let meter = svc
            .create_meter(&ctx, "calls".into(), Aggregation::Sum, "calls".into())
            .await
            .unwrap();

        let err = svc
            .create_price_amount(
                &ctx,
                price.id,
                Currency::usd(),
                0,
                None,
                None,
                Some(meter.id),
                Utc::now(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::FlatPriceMustNotReferenceMeter { .. }));
    }

    #[tokio::test]
    async fn per_unit_price_requires_meter() {
        let svc = service();
        let ctx = ctx();
        let product = svc
            .create_product(&ctx, "pro".into(), Default::default())
            .await
            .unwrap();
        let price = svc
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

        let err = svc
            .create_price_amount(&ctx, price.id, Currency::usd(), 5, None, None, None, Utc::now(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PricingModelRequiresMeter { .. }));
    }

    #[tokio::test]
    async fn overlapping_price_amount_ranges_are_rejected() {
        let svc = service();
        let ctx = ctx();
        let product = svc
            .create_product(&ctx, "pro".into(), Default::default())
            .await
            .unwrap();
        let price = svc
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

        let t0 = Utc::now();
        svc.create_price_amount(&ctx, price.id, Currency::usd(), 100, None, None, None, t0, None)
            .await
            .unwrap();

        let err = svc
            .create_price_amount(
                &ctx,
                price.id,
                Currency::usd(),
                200,
                None,
                None,
                None,
                t0 + chrono::Duration::days(1),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::OverlappingPriceAmountRange { .. }));
    }

    #[tokio::test]
    async fn version_must_increase_for_same_code() {
        let svc = service();
        let ctx = ctx();
        let product = svc
            .create_product(&ctx, "pro".into(), Default::default())
            .await
            .unwrap();
        svc.create_price(
            &ctx,
            product.id,
            "plan".into(),
            PricingModel::Flat,
            BillingMode::Licensed,
            BillingInterval::Month,
            2,
            vec![],
        )
        .await
        .unwrap();

        let err = svc
            .create_price(
                &ctx,
                product.id,
                "plan".into(),
                PricingModel::Flat,
                BillingMode::Licensed,
                BillingInterval::Month,
                2,
                vec![],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::VersionNotMonotonic { .. }));
    }

    #[tokio::test]
    async fn tiered_price_without_tiers_is_rejected() {
        let svc = service();
        let ctx = ctx();
        let product = svc
            .create_product(&ctx, "pro".into(), Default::default())
            .await
            .unwrap();
        let err = svc
            .create_price(
                &ctx,
                product.id,
                "tiered".into(),
                PricingModel::TieredVolume,
                BillingMode::Metered,
                BillingInterval::Month,
                1,
                vec![],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::TieredPriceRequiresTiers { .. }));
    }
}
