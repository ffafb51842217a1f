//! Braintree adapter. Webhooks arrive as form fields `bt_signature` and
//! `bt_payload`; `bt_signature` is `"<public_key>|<hex hmac-sha256 of
//! bt_payload>"`. We treat `config.api_key` as the public key and
//! `config.webhook_secret` as the private key used to compute the HMAC.

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

const API_BASE: &str = "https://payments.sandbox.braintree-api.com/graphql";

pub struct BraintreeAdapter {
    http: reqwest::Client,
}

impl BraintreeAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ProviderAdapter for BraintreeAdapter {
    fn name(&self) -> &'static str {
        "braintree"
    }

    fn verify(&self, config: &ProviderConfig, payload: &[u8], headers: &HashMap<String, String>) -> bool {
        let Some(signature_field) = headers.get("bt_signature") else { return false };
        let Some((public_key, hash)) = signature_field.split_once('|') else { return false };
        if public_key != config.api_key {
            return false;
        }
        hmac_sha256_verify(&config.webhook_secret, payload, hash)
    }

    fn parse_dispute(&self, payload: &Value) -> Option<ParsedWebhookEvent> {
        let kind = payload.get("kind")?.as_str()?;
        let event_type = match kind {
            "dispute_lost" | "dispute_opened" => PaymentWebhookEventType::DisputeWithdrawn,
            "dispute_won" => PaymentWebhookEventType::DisputeReinstated,
            _ => return None,
        };
        let dispute = payload.get("dispute")?;
        Some(ParsedWebhookEvent::Dispute {
            provider_event_id: dispute.get("id")?.as_str()?.to_string(),
            event_type,
            customer_id: None,
            amount_cents: dispute
                .get("amountDisputed")
                .and_then(Value::as_str)
                .and_then(|a| a.parse::<f64>().ok())
                .map(|a| (a * 100.0).round() as i64)
                .unwrap_or(0),
            currency: dispute
                .get("currencyIsoCode")
                .and_then(Value::as_str)
                .and_then(|c| Currency::parse(c).ok())
                .unwrap_or_else(Currency::usd),
        })
    }

    fn parse_payment(&self, payload: &Value) -> Option<ParsedWebhookEvent> {
        let kind = payload.get("kind")?.as_str()?;
        let event_type = match kind {
            "transaction_settled" => PaymentWebhookEventType::PaymentSucceeded,
            "transaction_settlement_declined" => PaymentWebhookEventType::PaymentFailed,
            "transaction_refunded" => PaymentWebhookEventType::Refunded,
            _ => return None,
        };
        let transaction = payload.get("transaction")?;
        Some(ParsedWebhookEvent::Payment {
            provider_event_id: transaction.get("id")?.as_str()?.to_string(),
            event_type,
            customer_id: None,
            invoice_reference: transaction.get("orderId").and_then(Value::as_str).map(str::to_string),
            amount_cents: transaction
                .get("amount")
                .and_then(Value::as_str)
                .and_then(|a| a.parse::<f64>().ok())
                .map(|a| (a * 100.0).round() as i64)
                .unwrap_or(0),
            currency: transaction
                .get("currencyIsoCode")
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
            .post(API_BASE)
            .basic_auth(&config.api_key, Some(&config.webhook_secret))
            .json(&serde_json::json!({
                "query": "mutation VaultPaymentMethod($input: VaultPaymentMethodInput!) { vaultPaymentMethod(input: $input) { paymentMethod { id details { ... on CreditCardDetails { last4 brandCode expirationMonth expirationYear } } } } }",
                "variables": {"input": {"customerId": provider_customer_id, "paymentMethodId": token}},
            }))
            .send()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "braintree".into(), message: e.to_string() })?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "braintree".into(), message: e.to_string() })?;
        let method = &body["data"]["vaultPaymentMethod"]["paymentMethod"];
        let details = &method["details"];
        Ok(AttachedPaymentMethod {
            provider_payment_method_id: method.get("id").and_then(Value::as_str).unwrap_or(token).to_string(),
            last4: details.get("last4").and_then(Value::as_str).map(str::to_string),
            brand: details.get("brandCode").and_then(Value::as_str).map(str::to_string),
            exp_month: details.get("expirationMonth").and_then(Value::as_str).and_then(|v| v.parse().ok()),
            exp_year: details.get("expirationYear").and_then(Value::as_str).and_then(|v| v.parse().ok()),
        })
    }

    async fn create_checkout_session(
        &self,
        _config: &ProviderConfig,
        amount_cents: i64,
        currency: Currency,
    ) -> PaymentResult<CreatedCheckoutSession> {
        // Braintree has no hosted checkout-session concept equivalent to
        // Stripe/Xendit's; callers use drop-in UI client tokens instead.
        // We represent that as an already-open session with no remote id.
        Ok(CreatedCheckoutSession {
            provider_session_id: String::new(),
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
        let amount = format!("{}.{:02}", amount_cents / 100, amount_cents % 100);
        let resp = self
            .http
            .post(API_BASE)
            .basic_auth(&config.api_key, Some(&config.webhook_secret))
            .header("Braintree-Idempotency-Key", idempotency_key)
            .json(&serde_json::json!({
                "query": "mutation ChargePaymentMethod($input: ChargePaymentMethodInput!) { chargePaymentMethod(input: $input) { transaction { id status } } }",
                "variables": {"input": {"paymentMethodId": provider_payment_method_id, "transaction": {"amount": amount, "currencyIsoCode": currency.as_str()}}},
            }))
            .send()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "braintree".into(), message: e.to_string() })?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::ProviderRequestFailed { provider: "braintree".into(), message: e.to_string() })?;
        let transaction = &body["data"]["chargePaymentMethod"]["transaction"];
        let status = transaction.get("status").and_then(Value::as_str).unwrap_or("");
        Ok(ChargeOutcome {
            payment_intent_id: transaction.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            succeeded: matches!(status, "SETTLED" | "SETTLING" | "SUBMITTED_FOR_SETTLEMENT"),
            error: (!matches!(status, "SETTLED" | "SETTLING" | "SUBMITTED_FOR_SETTLEMENT")).then(|| status.to_string()),
        })
    }
}
