//! Payment entity types: payment methods, webhook event
//! records, and checkout sessions.

use std::collections::HashMap;

use billing_core::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethodType {
    Card,
    BankAccount,
    Wallet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: i64,
    pub org_id: i64,
    pub customer_id: i64,
    pub provider: String,
    pub provider_payment_method_id: String,
    pub method_type: PaymentMethodType,
    pub last4: Option<String>,
    pub brand: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentWebhookEventType {
    PaymentSucceeded,
    PaymentFailed,
    Refunded,
    CheckoutSessionCompleted,
    DisputeWithdrawn,
    DisputeReinstated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEventRecord {
    pub id: i64,
    pub org_id: i64,
    pub provider: String,
    pub provider_event_id: String,
    pub event_type: PaymentWebhookEventType,
    pub customer_id: Option<i64>,
    /// PCI-like keys (card numbers, CVC, raw tokens) stripped before
    /// persistence by [`crate::provider::mask_payload`].
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutSessionStatus {
    Open,
    Complete,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: i64,
    pub org_id: i64,
    pub customer_id: i64,
    pub provider: String,
    pub provider_session_id: String,
    pub status: CheckoutSessionStatus,
    pub payment_status: String,
    pub line_items: Vec<String>,
    pub amount_total_cents: i64,
    pub currency: Currency,
    pub expires_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// The result of parsing an inbound webhook payload against a specific
/// provider adapter (step 3: dispute parse attempted first,
/// then payment parse; no match is `EventIgnored`, a success).
#[derive(Debug, Clone)]
pub enum ParsedWebhookEvent {
    Payment {
        provider_event_id: String,
        event_type: PaymentWebhookEventType,
        customer_id: Option<i64>,
        invoice_reference: Option<String>,
        amount_cents: i64,
        currency: Currency,
    },
    Dispute {
        provider_event_id: String,
        event_type: PaymentWebhookEventType,
        customer_id: Option<i64>,
        amount_cents: i64,
        currency: Currency,
    },
    Ignored,
}
