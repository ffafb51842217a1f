//! Invoice entity types.

use std::collections::HashMap;

use billing_core::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Draft,
    Finalized,
    Paid,
    Void,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: i64,
    pub invoice_id: i64,
    pub rating_result_id: i64,
    pub feature_code: String,
    pub meter_id: Option<i64>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceTaxLine {
    pub id: i64,
    pub invoice_id: i64,
    pub jurisdiction: String,
    pub tax_code: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub org_id: i64,
    pub subscription_id: i64,
    pub customer_id: i64,
    pub billing_cycle_id: i64,
    /// Human-readable, monotonic per org.
    pub invoice_number: i64,
    pub currency: Currency,
    pub status: InvoiceStatus,
    pub subtotal_amount_cents: i64,
    pub total_amount_cents: i64,
    pub paid_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn is_mutable(&self) -> bool {
        self.status == InvoiceStatus::Draft
    }
}
