//! Provider adapter registry. Each payment provider (at
//! least `stripe`, `xendit`, `adyen`, `braintree`) registers an adapter
//! conforming to a shared capability set: a trait object registry
//! keyed by provider name rather than a hand-rolled enum dispatch.

use std::collections::HashMap;

use async_trait::async_trait;
use billing_core::Currency;
use serde_json::Value;

use crate::errors::{PaymentError, PaymentResult};
use crate::types::{CheckoutSessionStatus, ParsedWebhookEvent};

/// Decrypted per-org provider configuration, opaque to the registry
/// itself; each adapter interprets the fields it needs (API keys,
/// webhook signing secrets).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub org_id: i64,
    pub provider: String,
    pub webhook_secret: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct AttachedPaymentMethod {
    pub provider_payment_method_id: String,
    pub last4: Option<String>,
    pub brand: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CreatedCheckoutSession {
    pub provider_session_id: String,
    pub status: CheckoutSessionStatus,
    pub amount_total_cents: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone)]
pub struct ChargeOutcome {
    pub payment_intent_id: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Capability set every provider adapter conforms to (/// "Adapter registry").
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Verifies a webhook payload against `config` using the provider's
    /// signature scheme (e.g. an HMAC over the raw body using a header
    /// value from `headers`). Used both to authenticate a webhook and,
    /// per step 2, to discover which org a webhook belongs to
    /// by trying every active config for the provider.
    fn verify(&self, config: &ProviderConfig, payload: &[u8], headers: &HashMap<String, String>) -> bool;

    fn parse_dispute(&self, payload: &Value) -> Option<ParsedWebhookEvent>;
    fn parse_payment(&self, payload: &Value) -> Option<ParsedWebhookEvent>;

    async fn attach_payment_method(
        &self,
        config: &ProviderConfig,
        provider_customer_id: &str,
        token: &str,
    ) -> PaymentResult<AttachedPaymentMethod>;

    async fn create_checkout_session(
        &self,
        config: &ProviderConfig,
        amount_cents: i64,
        currency: Currency,
    ) -> PaymentResult<CreatedCheckoutSession>;

    async fn charge(
        &self,
        config: &ProviderConfig,
        provider_payment_method_id: &str,
        amount_cents: i64,
        currency: Currency,
        idempotency_key: &str,
    ) -> PaymentResult<ChargeOutcome>;
}

/// Coordinates multiple provider adapters, keyed by provider name.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Box<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Box<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, provider: &str) -> PaymentResult<&dyn ProviderAdapter> {
        self.adapters
            .get(provider)
            .map(|a| a.as_ref())
            .ok_or_else(|| PaymentError::ProviderNotFound(provider.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.keys().map(|s| s.as_str()).collect()
    }
}

/// Strips PCI-like keys from a webhook payload before it is persisted as
/// a `PaymentEventRecord`.
const SENSITIVE_KEYS: &[&str] = &["card_number", "cvc", "cvv", "account_number", "routing_number"];

pub fn mask_payload(mut payload: Value) -> Value {
    if let Value::Object(ref mut map) = payload {
        for key in SENSITIVE_KEYS {
            if map.contains_key(*key) {
                map.insert(key.to_string(), Value::String("***".to_string()));
            }
        }
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_payload_redacts_card_number_but_keeps_other_fields() {
        let payload = serde_json::json!({
            "card_number": "4242424242424242",
            "amount": 500,
        });
        let masked = mask_payload(payload);
        assert_eq!(masked["card_number"], "***");
        assert_eq!(masked["amount"], 500);
    }
}
