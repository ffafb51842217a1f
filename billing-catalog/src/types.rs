//! Catalog entity types (: Product, Feature, Meter, Price,
//! PriceAmount, PriceTier).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub org_id: i64,
    pub code: String,
    pub active: bool,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureType {
    Boolean,
    Metered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: i64,
    pub org_id: i64,
    pub code: String,
    pub name: String,
    pub feature_type: FeatureType,
    /// Required when `feature_type == Metered`.
    pub meter_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Many-to-many linkage between a product and the features it grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductFeature {
    pub product_id: i64,
    pub feature_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    Sum,
    Max,
    Last,
    Count,
    Unique,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meter {
    pub id: i64,
    pub org_id: i64,
    pub code: String,
    pub aggregation: Aggregation,
    pub unit: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingModel {
    Flat,
    PerUnit,
    TieredVolume,
    TieredGraduated,
}

impl PricingModel {
    pub fn is_tiered(self) -> bool {
        matches!(self, PricingModel::TieredVolume | PricingModel::TieredGraduated)
    }

    /// Flat pricing never reads usage; every other model does.
    pub fn requires_meter(self) -> bool {
        !matches!(self, PricingModel::Flat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingMode {
    Licensed,
    Metered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingInterval {
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierMode {
    Volume,
    Graduated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTier {
    pub tier_mode: TierMode,
    pub start_quantity: i64,
    /// `None` means this tier extends to infinity — the top tier.
    pub end_quantity: Option<i64>,
    pub unit_amount_cents: Option<i64>,
    pub flat_amount_cents: Option<i64>,
    pub unit: String,
}

impl PriceTier {
    pub fn has_amount(&self) -> bool {
        self.unit_amount_cents.is_some() || self.flat_amount_cents.is_some()
    }

    pub fn contains(&self, quantity: i64) -> bool {
        quantity >= self.start_quantity && self.end_quantity.map_or(true, |end| quantity < end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub id: i64,
    pub org_id: i64,
    pub product_id: i64,
    pub code: String,
    pub pricing_model: PricingModel,
    pub billing_mode: BillingMode,
    pub billing_interval: BillingInterval,
    pub version: i64,
    pub active: bool,
    pub retired_at: Option<DateTime<Utc>>,
    pub tiers: Vec<PriceTier>,
    pub created_at: DateTime<Utc>,
}

impl Price {
    /// A price is selectable for new subscriptions only while active and
    /// not retired; a retired price stays usable for historical cycles
    /// already referencing it.
    pub fn selectable_for_new_subscriptions(&self) -> bool {
        self.active && self.retired_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAmount {
    pub id: i64,
    pub org_id: i64,
    pub price_id: i64,
    pub currency: billing_core::Currency,
    pub unit_amount_cents: i64,
    pub minimum_amount_cents: Option<i64>,
    pub maximum_amount_cents: Option<i64>,
    pub meter_id: Option<i64>,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PriceAmount {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.effective_from <= at && self.effective_to.map_or(true, |to| at < to)
    }

    pub fn overlaps(&self, other: &PriceAmount) -> bool {
        match (self.effective_to, other.effective_to) {
            (None, None) => true,
            (None, Some(other_end)) => self.effective_from < other_end,
            (Some(self_end), None) => other.effective_from < self_end,
            (Some(self_end), Some(other_end)) => {
                self.effective_from < other_end && other.effective_from < self_end
            }
        }
    }
}

/// Opaque pagination cursor: `(id, created_at)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageCursor {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

pub struct Page<T> {
    pub data: Vec<T>,
    pub next_page_token: Option<PageCursor>,
    pub has_more: bool,
}
