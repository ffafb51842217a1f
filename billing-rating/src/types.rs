//! RatingResult entity.

use billing_core::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingResult {
    pub id: i64,
    pub org_id: i64,
    pub billing_cycle_id: i64,
    pub subscription_item_id: i64,
    pub price_id: i64,
    pub meter_id: Option<i64>,
    pub feature_code: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub amount_cents: i64,
    pub currency: Currency,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}
