//! Tenancy entity types.

use std::collections::HashMap;

use billing_core::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub currency: Currency,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// End recipient of invoices, exclusively owned by one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub org_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub currency: Option<Currency>,
    pub provider_customer_id: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// `explicit → customer.currency → org.currency → "USD"`.
    pub fn resolve_currency(explicit: Option<Currency>, customer: &Customer, org: &Organization) -> Currency {
        explicit
            .or(customer.currency)
            .unwrap_or(org.currency)
    }
}
