//! Subscription entity types (: Subscription, SubscriptionItem,
//! SubscriptionEntitlement).

use billing_catalog::BillingMode;
use billing_core::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Draft,
    Active,
    Paused,
    Canceled,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionMode {
    SendInvoice,
    ChargeAutomatically,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingCycleType {
    Daily,
    Weekly,
    Monthly,
}

impl BillingCycleType {
    pub fn next_period_end(self, period_start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            BillingCycleType::Daily => period_start + chrono::Duration::days(1),
            BillingCycleType::Weekly => period_start + chrono::Duration::weeks(1),
            BillingCycleType::Monthly => add_one_month(period_start),
        }
    }
}

/// Calendar-month addition that clamps the day-of-month rather than
/// overflowing (e.g. Jan 31 + 1 month -> Feb 28/29).
fn add_one_month(at: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::Datelike;
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    let mut day = at.day();
    loop {
        if let Some(naive) = chrono::NaiveDate::from_ymd_opt(year, month, day) {
            return naive.and_time(at.time()).and_utc();
        }
        day -= 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub org_id: i64,
    pub customer_id: i64,
    pub status: SubscriptionStatus,
    pub collection_mode: CollectionMode,
    pub billing_cycle_type: BillingCycleType,
    pub default_currency: Currency,
    pub start_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionItem {
    pub id: i64,
    pub subscription_id: i64,
    pub price_id: i64,
    /// Snapshot of the price's code at the time the item was created, so
    /// price renames/versioning never rewrite historical items.
    pub price_code: String,
    pub meter_id: Option<i64>,
    pub meter_code: Option<String>,
    pub quantity: i64,
    pub billing_mode: BillingMode,
    pub billing_threshold: Option<i64>,
}

/// Request-side description of an item to create, before it is resolved
/// against the catalog.
#[derive(Debug, Clone)]
pub struct SubscriptionItemInput {
    pub price_id: i64,
    pub quantity: i64,
    pub billing_threshold: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEntitlement {
    pub id: i64,
    pub subscription_id: i64,
    pub product_id: i64,
    pub feature_code: String,
    pub feature_type: billing_catalog::FeatureType,
    pub meter_id: Option<i64>,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
}

impl SubscriptionEntitlement {
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.effective_from <= at && self.effective_to.map_or(true, |to| at < to)
    }
}
