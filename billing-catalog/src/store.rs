//! In-memory catalog store.
//!
//! The catalog is read-mostly, so a single `RwLock`-guarded store is
//! enough; a process that wants a durable catalog swaps this for a
//! `sqlx`-backed implementation behind the same [`CatalogStore`] trait
//! without touching `CatalogService`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::types::*;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_product(&self, product: Product);
    async fn get_product(&self, org_id: i64, id: i64) -> Option<Product>;
    async fn list_products(&self, org_id: i64) -> Vec<Product>;

    async fn insert_feature(&self, feature: Feature);
    async fn get_feature(&self, org_id: i64, id: i64) -> Option<Feature>;
    async fn link_product_feature(&self, link: ProductFeature);
    async fn features_for_product(&self, product_id: i64) -> Vec<Feature>;

    async fn insert_meter(&self, meter: Meter);
    async fn get_meter(&self, org_id: i64, id: i64) -> Option<Meter>;
    async fn get_meter_by_code(&self, org_id: i64, code: &str) -> Option<Meter>;

    async fn insert_price(&self, price: Price);
    async fn get_price(&self, org_id: i64, id: i64) -> Option<Price>;
    async fn list_prices(&self, org_id: i64) -> Vec<Price>;
    async fn latest_version(&self, org_id: i64, code: &str) -> Option<i64>;

    async fn insert_price_amount(&self, amount: PriceAmount);
    async fn price_amounts_for(&self, price_id: i64) -> Vec<PriceAmount>;

    async fn add_price_tier(&self, org_id: i64, price_id: i64, tier: PriceTier) -> Option<Price>;

    /// Returns the previously created entity id if `(org_id, key)` was
    /// already used for this `kind`, recording the new mapping
    /// otherwise. First writer for a given key wins.
    async fn reserve_idempotency_key(
        &self,
        org_id: i64,
        kind: &'static str,
        key: &str,
        new_id: i64,
    ) -> Option<i64>;
}

#[derive(Default)]
pub struct InMemoryCatalogStore {
    products: RwLock<HashMap<i64, Product>>,
    features: RwLock<HashMap<i64, Feature>>,
    product_features: RwLock<Vec<ProductFeature>>,
    meters: RwLock<HashMap<i64, Meter>>,
    prices: RwLock<HashMap<i64, Price>>,
    price_amounts: RwLock<HashMap<i64, Vec<PriceAmount>>>,
    idempotency: RwLock<HashMap<(i64, &'static str, String), i64>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn insert_product(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    async fn get_product(&self, org_id: i64, id: i64) -> Option<Product> {
        self.products
            .read()
            .await
            .get(&id)
            .filter(|p| p.org_id == org_id)
            .cloned()
    }

    async fn list_products(&self, org_id: i64) -> Vec<Product> {
        let mut v: Vec<_> = self
            .products
            .read()
            .await
            .values()
            .filter(|p| p.org_id == org_id)
            .cloned()
            .collect();
        v.sort_by_key(|p| (p.created_at, p.id));
        v
    }

    async fn insert_feature(&self, feature: Feature) {
        self.features.write().await.insert(feature.id, feature);
    }

    async fn get_feature(&self, org_id: i64, id: i64) -> Option<Feature> {
        self.features
            .read()
            .await
            .get(&id)
            .filter(|f| f.org_id == org_id)
            .cloned()
    }

    async fn link_product_feature(&self, link: ProductFeature) {
        self.product_features.write().await.push(link);
    }

    async fn features_for_product(&self, product_id: i64) -> Vec<Feature> {
        let links = self.product_features.read().await;
        let features = self.features.read().await;
        links
            .iter()
            .filter(|l| l.product_id == product_id)
            .filter_map(|l| features.get(&l.feature_id).cloned())
            .collect()
    }

    async fn insert_meter(&self, meter: Meter) {
        self.meters.write().await.insert(meter.id, meter);
    }

    async fn get_meter(&self, org_id: i64, id: i64) -> Option<Meter> {
        self.meters
            .read()
            .await
            .get(&id)
            .filter(|m| m.org_id == org_id)
            .cloned()
    }

    async fn get_meter_by_code(&self, org_id: i64, code: &str) -> Option<Meter> {
        self.meters
            .read()
            .await
            .values()
            .find(|m| m.org_id == org_id && m.code == code)
            .cloned()
    }

    async fn insert_price(&self, price: Price) {
        self.prices.write().await.insert(price.id, price);
    }

    async fn get_price(&self, org_id: i64, id: i64) -> Option<Price> {
        self.prices
            .read()
            .await
            .get(&id)
            .filter(|p| p.org_id == org_id)
            .cloned()
    }

    async fn list_prices(&self, org_id: i64) -> Vec<Price> {
        let mut v: Vec<_> = self
            .prices
            .read()
            .await
            .values()
            .filter(|p| p.org_id == org_id)
            .cloned()
            .collect();
        v.sort_by_key(|p| (p.created_at, p.id));
        v
    }

    async fn latest_version(&self, org_id: i64, code: &str) -> Option<i64> {
        self.prices
            .read()
            .await
            .values()
            .filter(|p| p.org_id == org_id && p.code == code)
            .map(|p| p.version)
            .max()
    }

    async fn insert_price_amount(&self, amount: PriceAmount) {
        self.price_amounts
            .write()
            .await
            .entry(amount.price_id)
            .or_default()
            .push(amount);
    }

    async fn add_price_tier(&self, org_id: i64, price_id: i64, tier: PriceTier) -> Option<Price> {
        let mut prices = self.prices.write().await;
        let price = prices.get_mut(&price_id)?;
        if price.org_id != org_id {
            return None;
        }
        price.tiers.push(tier);
        Some(price.clone())
    }

    async fn price_amounts_for(&self, price_id: i64) -> Vec<PriceAmount> {
        self.price_amounts
            .read()
            .await
            .get(&price_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn reserve_idempotency_key(
        &self,
        org_id: i64,
        kind: &'static str,
        key: &str,
        new_id: i64,
    ) -> Option<i64> {
        let mut map = self.idempotency.write().await;
        let entry = map
            .entry((org_id, kind, key.to_string()))
            .or_insert(new_id);
        if *entry == new_id {
            None
        } else {
            Some(*entry)
        }
    }
}

/// Helper shared by services that need "does this range overlap any
/// existing range for this price+currency" without exposing storage
/// internals.
pub fn find_overlap<'a>(
    existing: &'a [PriceAmount],
    candidate: &PriceAmount,
) -> Option<&'a PriceAmount> {
    existing
        .iter()
        .filter(|a| a.currency == candidate.currency)
        .find(|a| a.overlaps(candidate))
}

/// Select the `PriceAmount` effective at `at` among `amounts`, breaking
/// ties by the latest `effective_from`.
pub fn select_effective<'a>(amounts: &'a [PriceAmount], at: DateTime<Utc>) -> Option<&'a PriceAmount> {
    amounts
        .iter()
        .filter(|a| a.covers(at))
        .max_by_key(|a| a.effective_from)
}
