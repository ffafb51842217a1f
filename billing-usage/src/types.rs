//! UsageEvent entity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageEventStatus {
    Accepted,
    Enriched,
    Rated,
    Invalid,
    UnmatchedMeter,
    UnmatchedSubscription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: i64,
    pub org_id: i64,
    pub customer_id: i64,
    pub subscription_id: Option<i64>,
    pub subscription_item_id: Option<i64>,
    pub meter_id: Option<i64>,
    pub meter_code: String,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
    pub status: UsageEventStatus,
    pub error: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct CreateIngestRequest {
    pub customer_id: i64,
    pub meter_code: String,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}
