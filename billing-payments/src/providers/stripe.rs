//! Stripe adapter. Webhooks are signed per Stripe's `Stripe-Signature`
//! scheme: `t=<unix-seconds>,v1=<hex hmac-sha256 of "t.payload">`.
//! https://docs.stripe.com/webhooks#verify-official-libraries is the
//! shape this mirrors; we verify by hand rather than pull in the
//! `async-stripe` crate, since this adapter only needs a slice of it.

use std::collections::HashMap;

use async_trait::async_trait;
use billing_core::Currency;
use serde_json::Value;

use crate::errors::{PaymentError, PaymentResult};
use crate::provider::{
    AttachedPaymentMethod, ChargeOutcome, CreatedCheckoutSession, ProviderAdapter, ProviderConfig,
};
use crate::types::{CheckoutSessionStatus, ParsedWebhookEvent, PaymentWebhookEventType};

use super::hmac_sha256_verify;
#[cfg(test)]
use super::hmac_sha256_hex;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe's own libraries default to a 5 minute replay tolerance on the
/// `t=` timestamp; a signature older than this is rejected even if the
/// HMAC itself still matches.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub struct StripeAdapter {
    http: reqwest::Client,
}

impl StripeAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn parse_event_type(raw: &str) -> Option<PaymentWebhookEventType> {
        match raw {
            "payment_intent.succeeded" => Some(PaymentWebhookEventType::PaymentSucceeded),
            "payment_intent.payment_failed" => Some(PaymentWebhookEventType::PaymentFailed),
            "charge.refunded" => Some(PaymentWebhookEventType::Refunded),
            "checkout.session.completed" => Some(PaymentWebhookEventType::CheckoutSessionCompleted),
            "charge.dispute.funds_withdrawn" => Some(PaymentWebhookEventType::DisputeWithdrawn),
            "charge.dispute.funds_reinstated" => Some(PaymentWebhookEventType::DisputeReinstated),
            _ => None,
        }
    }
}

#[async_trait]
impl ProviderAdapter for StripeAdapter {
    fn name(&self) -> &'static str {
        "stripe"
    }

    fn verify(&self, config: &ProviderConfig, payload: &[u8], headers: &HashMap<String, String>) -> bool {
        let Some(header) = headers.get("stripe-signature") else { return false };
        let mut timestamp = None;
        let mut signature = None;
        for part in header.split(',') {
            if let Some(v) = part.strip_prefix("t=") {
                timestamp = Some(v);
            } else if let Some(v) = part.strip_prefix("v1=") {
                signature = Some(v);
            }
        }
        let (Some(timestamp), Some(signature)) = (timestamp, signature) else { return false };
        let Ok(timestamp_secs) = timestamp.parse::<i64>() else { return false };
        if (chrono::Utc::now().timestamp() - timestamp_secs).abs() > SIGNATURE_TOLERANCE_SECS {
            return false;
        }
        let signed_payload = format!("{timestamp}.{}", String::from_utf8_lossy(payload));
        hmac_sha256_verify(&config.webhook_secret, signed_payload.as_bytes(), signature)
    }

    fn parse_dispute(&self, payload: &Value) -> Option<ParsedWebhookEvent> {
        let event_type = Self::parse_event_type(payload.get("type")?.as_str()?)?;
        if !matches!(event_type, PaymentWebhookEventType::DisputeWithdrawn | PaymentWebhookEventType::DisputeReinstated) {
            return None;
        }
        let object = payload.get("data")?.get("object")?;
        Some(ParsedWebhookEvent::Dispute {
            provider_event_id: payload.get("id")?.as_str()?.to_string(),
            event_type,
            customer_id: None,
            amount_cents: object.get("amount")?.as_i64().unwrap_or(0),
            currency: object
                .get("currency")
                .and_then(Value::as_str)
                .and_then(|c| Currency::parse(&c.to_uppercase()).ok())
                .unwrap_or_else(Currency::usd),
        })
    }

    fn parse_payment(&self, payload: &Value) -> Option<ParsedWebhookEvent> {
        let event_type = Self::parse_event_type(payload.get("type")?.as_str()?)?;
        if matches!(event_type, PaymentWebhookEventType::DisputeWithdrawn | PaymentWebhookEventType::DisputeReinstated) {
            return None;
        }
        let object = payload.get("data")?.get("object")?;
        Some(ParsedWebhookEvent::Payment {
            provider_event_id: payload.get("id")?.as_str()?.to_string(),
            event_type,
            customer_id: None,
            invoice_reference: object.get("metadata").and_then(|m| m.get("invoice_id")).and_then(Value::as_str).map(str::to_string),
            amount_cents: object.get("amount")?.as_i64().unwrap_or(0),
            currency: object
                .get("currency")
                .and_then(Value::as_str)
                .and_then(|c| Currency::parse(&c.to_uppercase()).ok())
                .unwrap_or_else(Currency::usd),
        })
    }

    async fn attach_payment_method(
        &self,
        config: &ProviderConfig,
        provider_customer_id: &str,
        token: &str,
    ) -> PaymentResult<AttachedPaymentMethod> {
        let resp = self
            .http
            .post(format!("{API_BASE}/payment_methods/{token}/attach"))
            .bearer_auth(&config.api_key)
            .form(&[("customer", provider_customer_id)])
            .send()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "stripe".into(), message: e.to_string() })?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "stripe".into(), message: e.to_string() })?;
        let card = body.get("card").cloned().unwrap_or(Value::Null);
        Ok(AttachedPaymentMethod {
            provider_payment_method_id: body.get("id").and_then(Value::as_str).unwrap_or(token).to_string(),
            last4: card.get("last4").and_then(Value::as_str).map(str::to_string),
            brand: card.get("brand").and_then(Value::as_str).map(str::to_string),
            exp_month: card.get("exp_month").and_then(Value::as_u64).map(|v| v as u32),
            exp_year: card.get("exp_year").and_then(Value::as_u64).map(|v| v as u32),
        })
    }

    async fn create_checkout_session(
        &self,
        config: &ProviderConfig,
        amount_cents: i64,
        currency: Currency,
    ) -> PaymentResult<CreatedCheckoutSession> {
        let resp = self
            .http
            .post(format!("{API_BASE}/checkout/sessions"))
            .bearer_auth(&config.api_key)
            .form(&[
                ("mode", "payment"),
                ("line_items[0][price_data][currency]", currency.as_str()),
                ("line_items[0][price_data][unit_amount]", &amount_cents.to_string()),
                ("line_items[0][quantity]", "1"),
            ])
            .send()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "stripe".into(), message: e.to_string() })?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "stripe".into(), message: e.to_string() })?;
        Ok(CreatedCheckoutSession {
            provider_session_id: body.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            status: CheckoutSessionStatus::Open,
            amount_total_cents: amount_cents,
            currency,
        })
    }

    async fn charge(
        &self,
        config: &ProviderConfig,
        provider_payment_method_id: &str,
        amount_cents: i64,
        currency: Currency,
        idempotency_key: &str,
    ) -> PaymentResult<ChargeOutcome> {
        let resp = self
            .http
            .post(format!("{API_BASE}/payment_intents"))
            .bearer_auth(&config.api_key)
            .header("Idempotency-Key", idempotency_key)
            .form(&[
                ("amount", amount_cents.to_string()),
                ("currency", currency.as_str().to_lowercase()),
                ("payment_method", provider_payment_method_id.to_string()),
                ("confirm", "true".to_string()),
                ("off_session", "true".to_string()),
            ])
            .send()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "stripe".into(), message: e.to_string() })?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "stripe".into(), message: e.to_string() })?;
        let status = body.get("status").and_then(Value::as_str).unwrap_or("");
        Ok(ChargeOutcome {
            payment_intent_id: body.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            succeeded: status == "succeeded",
            error: body.get("last_payment_error").and_then(|e| e.get("message")).and_then(Value::as_str).map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            org_id: 1,
            provider: "stripe".into(),
            webhook_secret: "whsec_test".into(),
            api_key: "sk_test".into(),
        }
    }

    #[test]
    fn verify_accepts_a_correctly_signed_payload() {
        let adapter = StripeAdapter::new(reqwest::Client::new());
        let config = config();
        let payload = br#"{"id":"evt_1"}"#;
        let now = chrono::Utc::now().timestamp();
        let signed = format!("{now}.{}", String::from_utf8_lossy(payload));
        let sig = hmac_sha256_hex(&config.webhook_secret, signed.as_bytes()).unwrap();
        let mut headers = HashMap::new();
        headers.insert("stripe-signature".to_string(), format!("t={now},v1={sig}"));
        assert!(adapter.verify(&config, payload, &headers));
    }

    #[test]
    fn verify_rejects_a_tampered_payload() {
        let adapter = StripeAdapter::new(reqwest::Client::new());
        let config = config();
        let now = chrono::Utc::now().timestamp();
        let mut headers = HashMap::new();
        headers.insert("stripe-signature".to_string(), format!("t={now},v1=deadbeef"));
        assert!(!adapter.verify(&config, b"{}", &headers));
    }

    #[test]
    fn verify_rejects_a_stale_timestamp_outside_the_replay_tolerance() {
        let adapter = StripeAdapter::new(reqwest::Client::new());
        let config = config();
        let payload = br#"{"id":"evt_1"}"#;
        let stale = chrono::Utc::now().timestamp() - SIGNATURE_TOLERANCE_SECS - 60;
        let signed = format!("{stale}.{}", String::from_utf8_lossy(payload));
        let sig = hmac_sha256_hex(&config.webhook_secret, signed.as_bytes()).unwrap();
        let mut headers = HashMap::new();
        headers.insert("stripe-signature".to_string(), format!("t={stale},v1={sig}"));
        assert!(!adapter.verify(&config, payload, &headers));
    }

    #[test]
    fn parse_payment_recognizes_payment_intent_succeeded() {
        let adapter = StripeAdapter::new(reqwest::Client::new());
        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {"amount": 1000, "currency": "usd", "metadata": {}}}
        });
        let parsed = adapter.parse_payment(&payload).unwrap();
        match parsed {
            ParsedWebhookEvent::Payment { amount_cents, .. } => assert_eq!(amount_cents, 1000),
            _ => panic!("expected a payment event"),
        }
    }
}
