//! Adyen adapter. Webhooks carry an `additionalData.hmacSignature`
//! field per notification item; we key on the simpler `adyen-signature`
//! header variant Adyen also supports for standard webhooks, an
//! HMAC-SHA256 over the raw body, hex-encoded.

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

const API_BASE: &str = "https://checkout-test.adyen.com/v71";

pub struct AdyenAdapter {
    http: reqwest::Client,
}

impl AdyenAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ProviderAdapter for AdyenAdapter {
    fn name(&self) -> &'static str {
        "adyen"
    }

    fn verify(&self, config: &ProviderConfig, payload: &[u8], headers: &HashMap<String, String>) -> bool {
        let Some(signature) = headers.get("adyen-signature") else { return false };
        hmac_sha256_verify(&config.webhook_secret, payload, signature)
    }

    fn parse_dispute(&self, payload: &Value) -> Option<ParsedWebhookEvent> {
        let items = payload.get("notificationItems")?.as_array()?;
        let item = items.first()?.get("NotificationRequestItem")?;
        let event_code = item.get("eventCode")?.as_str()?;
        let event_type = match event_code {
            "NOTIFICATION_OF_CHARGEBACK" | "CHARGEBACK" => PaymentWebhookEventType::DisputeWithdrawn,
            "CHARGEBACK_REVERSED" => PaymentWebhookEventType::DisputeReinstated,
            _ => return None,
        };
        let amount = item.get("amount")?;
        Some(ParsedWebhookEvent::Dispute {
            provider_event_id: item.get("pspReference")?.as_str()?.to_string(),
            event_type,
            customer_id: None,
            amount_cents: amount.get("value")?.as_i64().unwrap_or(0),
            currency: amount
                .get("currency")
                .and_then(Value::as_str)
                .and_then(|c| Currency::parse(c).ok())
                .unwrap_or_else(Currency::usd),
        })
    }

    fn parse_payment(&self, payload: &Value) -> Option<ParsedWebhookEvent> {
        let items = payload.get("notificationItems")?.as_array()?;
        let item = items.first()?.get("NotificationRequestItem")?;
        let event_code = item.get("eventCode")?.as_str()?;
        if event_code.starts_with("CHARGEBACK") || event_code == "NOTIFICATION_OF_CHARGEBACK" {
            return None;
        }
        let success = item.get("success").and_then(Value::as_str) == Some("true");
        let event_type = match event_code {
            "AUTHORISATION" if success => PaymentWebhookEventType::PaymentSucceeded,
            "AUTHORISATION" => PaymentWebhookEventType::PaymentFailed,
            "REFUND" => PaymentWebhookEventType::Refunded,
            _ => return None,
        };
        let amount = item.get("amount")?;
        Some(ParsedWebhookEvent::Payment {
            provider_event_id: item.get("pspReference")?.as_str()?.to_string(),
            event_type,
            customer_id: None,
            invoice_reference: item.get("merchantReference").and_then(Value::as_str).map(str::to_string),
            amount_cents: amount.get("value")?.as_i64().unwrap_or(0),
            currency: amount
                .get("currency")
                .and_then(Value::as_str)
                .and_then(|c| Currency::parse(c).ok())
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
            .post(format!("{API_BASE}/storedPaymentMethods"))
            .header("X-API-Key", &config.api_key)
            .json(&serde_json::json!({"shopperReference": provider_customer_id, "storedPaymentMethodId": token}))
            .send()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "adyen".into(), message: e.to_string() })?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "adyen".into(), message: e.to_string() })?;
        Ok(AttachedPaymentMethod {
            provider_payment_method_id: body.get("storedPaymentMethodId").and_then(Value::as_str).unwrap_or(token).to_string(),
            last4: body.get("lastFour").and_then(Value::as_str).map(str::to_string),
            brand: body.get("brand").and_then(Value::as_str).map(str::to_string),
            exp_month: body.get("expiryMonth").and_then(Value::as_str).and_then(|v| v.parse().ok()),
            exp_year: body.get("expiryYear").and_then(Value::as_str).and_then(|v| v.parse().ok()),
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
            .post(format!("{API_BASE}/sessions"))
            .header("X-API-Key", &config.api_key)
            .json(&serde_json::json!({"amount": {"value": amount_cents, "currency": currency.as_str()}}))
            .send()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "adyen".into(), message: e.to_string() })?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "adyen".into(), message: e.to_string() })?;
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
            .post(format!("{API_BASE}/payments"))
            .header("X-API-Key", &config.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(&serde_json::json!({
                "amount": {"value": amount_cents, "currency": currency.as_str()},
                "paymentMethod": {"storedPaymentMethodId": provider_payment_method_id},
                "shopperInteraction": "ContAuth",
            }))
            .send()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "adyen".into(), message: e.to_string() })?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "adyen".into(), message: e.to_string() })?;
        let result_code = body.get("resultCode").and_then(Value::as_str).unwrap_or("");
        Ok(ChargeOutcome {
            payment_intent_id: body.get("pspReference").and_then(Value::as_str).unwrap_or_default().to_string(),
            succeeded: result_code == "Authorised",
            error: (result_code != "Authorised").then(|| result_code.to_string()),
        })
    }
}
