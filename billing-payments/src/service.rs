//! Payment orchestrator: webhook ingest, payment methods, checkout
//! sessions.

use std::collections::HashMap;
use std::sync::Arc;

use billing_core::{Currency, IdMinter, RequestContext};
use billing_invoicing::{Invoice, InvoiceService};
use billing_ledger::LedgerService;
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use crate::errors::{PaymentError, PaymentResult};
use crate::provider::{mask_payload, ProviderRegistry};
use crate::store::PaymentStore;
use crate::types::{
    CheckoutSession, CheckoutSessionStatus, ParsedWebhookEvent, PaymentEventRecord, PaymentMethod,
    PaymentMethodType, PaymentWebhookEventType,
};

/// Stable machine-readable code for `auto_charge_error_code`, distinct
/// from the free-text `auto_charge_error_message`.
fn auto_charge_error_code(err: &PaymentError) -> &'static str {
    match err {
        PaymentError::PaymentMethodNotFound(_) => "missing_payment_method",
        PaymentError::ProviderNotFound(_) => "provider_not_configured",
        PaymentError::ProviderRequestFailed { .. } => "provider_request_failed",
        _ => "provider_error",
    }
}

pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    providers: Arc<ProviderRegistry>,
    invoices: Arc<InvoiceService>,
    ledger: Arc<LedgerService>,
}

/// Outcome of `ingest_webhook`, reported to the caller for logging and
/// metrics without leaking the full parsed event shape.
#[derive(Debug, Clone)]
pub struct WebhookIngestOutcome {
    pub org_id: i64,
    pub event_id: i64,
    pub event_type: PaymentWebhookEventType,
    pub already_processed: bool,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        providers: Arc<ProviderRegistry>,
        invoices: Arc<InvoiceService>,
        ledger: Arc<LedgerService>,
    ) -> Self {
        Self { store, providers, invoices, ledger }
    }

    /// Implements "Webhook ingest": reject malformed
    /// JSON/unknown providers, resolve the owning org by first-match
    /// signature verification, parse the event (dispute first, then
    /// payment), dedup, persist, and route downstream effects.
    pub async fn ingest_webhook(
        &self,
        provider: &str,
        raw_payload: &[u8],
        headers: std::collections::HashMap<String, String>,
    ) -> PaymentResult<WebhookIngestOutcome> {
        let adapter = self.providers.get(provider)?;

        let payload: serde_json::Value = serde_json::from_slice(raw_payload)
            .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;

        let configs = self.store.active_configs_for_provider(provider).await;
        let config = configs
            .iter()
            .find(|c| adapter.verify(c, raw_payload, &headers))
            .ok_or(PaymentError::InvalidSignature)?;

        let parsed = adapter
            .parse_dispute(&payload)
            .or_else(|| adapter.parse_payment(&payload))
            .unwrap_or(ParsedWebhookEvent::Ignored);

        let (provider_event_id, event_type, customer_id, amount_cents, currency) = match parsed {
            ParsedWebhookEvent::Ignored => return Err(PaymentError::EventIgnored),
            ParsedWebhookEvent::Payment {
                provider_event_id,
                event_type,
                customer_id,
                amount_cents,
                currency,
                ..
            } => (provider_event_id, event_type, customer_id, amount_cents, currency),
            ParsedWebhookEvent::Dispute {
                provider_event_id,
                event_type,
                customer_id,
                amount_cents,
                currency,
            } => (provider_event_id, event_type, customer_id, amount_cents, currency),
        };

        let candidate_id = IdMinter::global().next_id();
        let record = PaymentEventRecord {
            id: candidate_id,
            org_id: config.org_id,
            provider: provider.to_string(),
            provider_event_id: provider_event_id.clone(),
            event_type,
            customer_id,
            payload: mask_payload(payload),
            received_at: Utc::now(),
            processed_at: None,
        };
        let owning_id = self.store.reserve_event(record).await;
        if owning_id != candidate_id {
            return Err(PaymentError::EventAlreadyProcessed {
                provider: provider.to_string(),
                provider_event_id,
            });
        }

        let ctx = RequestContext::system(config.org_id);
        self.route_downstream(&ctx, owning_id, event_type, amount_cents, currency).await;
        self.store.mark_event_processed(owning_id, Utc::now()).await;

        Ok(WebhookIngestOutcome {
            org_id: config.org_id,
            event_id: owning_id,
            event_type,
            already_processed: false,
        })
    }

    /// Routes a parsed event to the invoice and ledger services (spec
    /// §4.K step 5). `amount_cents`/`currency` identify the payment's
    /// own amount; which invoice it settles is out of this crate's
    /// scope to resolve from the raw webhook shape alone, so the
    /// composition root supplies an invoice id via `mark_paid` calls
    /// driven by the returned [`WebhookIngestOutcome`] when richer
    /// provider metadata is available. Here we post the ledger effect,
    /// which never needs an invoice id.
    async fn route_downstream(
        &self,
        ctx: &RequestContext,
        event_id: i64,
        event_type: PaymentWebhookEventType,
        amount_cents: i64,
        currency: Currency,
    ) {
        let result = match event_type {
            PaymentWebhookEventType::PaymentSucceeded => {
                self.ledger.post_payment_succeeded(ctx, event_id, currency, amount_cents).await
            }
            PaymentWebhookEventType::Refunded => {
                self.ledger.post_refund(ctx, event_id, currency, amount_cents).await
            }
            PaymentWebhookEventType::DisputeWithdrawn => {
                self.ledger.post_dispute_withdrawn(ctx, event_id, currency, amount_cents).await
            }
            PaymentWebhookEventType::DisputeReinstated => {
                self.ledger.post_dispute_reinstated(ctx, event_id, currency, amount_cents).await
            }
            PaymentWebhookEventType::PaymentFailed
            | PaymentWebhookEventType::CheckoutSessionCompleted => return,
        };
        if let Err(err) = result {
            warn!(?err, event_id, "ledger posting failed for payment webhook event");
        }
    }

    /// Marks the invoice tied to a successful payment PAID. Exposed
    /// separately from `ingest_webhook` since resolving "which invoice"
    /// from a raw provider payload depends on what the provider embeds
    /// (e.g. Stripe's `metadata.invoice_id`); the composition root reads
    /// that field and calls this once it knows the invoice id.
    pub async fn settle_invoice(
        &self,
        ctx: &RequestContext,
        invoice_id: i64,
    ) -> PaymentResult<()> {
        self.invoices
            .mark_paid(ctx, invoice_id, Utc::now())
            .await
            .map_err(|e| PaymentError::InvalidRequest(e.to_string()))?;
        Ok(())
    }

    /// AttachPaymentMethod: calls the provider to attach by multi-use
    /// token, persists the tokenized record, and makes it the default if
    /// it is the customer's first.
    pub async fn attach_payment_method(
        &self,
        ctx: &RequestContext,
        customer_id: i64,
        provider: &str,
        provider_customer_id: &str,
        token: &str,
    ) -> PaymentResult<PaymentMethod> {
        let config = self
            .store
            .active_configs_for_provider(provider)
            .await
            .into_iter()
            .find(|c| c.org_id == ctx.org_id)
            .ok_or_else(|| PaymentError::ProviderNotFound(provider.to_string()))?;
        let adapter = self.providers.get(provider)?;
        let attached = adapter.attach_payment_method(&config, provider_customer_id, token).await?;

        let existing = self.store.payment_methods_for_customer(customer_id).await;
        let method = PaymentMethod {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            customer_id,
            provider: provider.to_string(),
            provider_payment_method_id: attached.provider_payment_method_id,
            method_type: PaymentMethodType::Card,
            last4: attached.last4,
            brand: attached.brand,
            exp_month: attached.exp_month,
            exp_year: attached.exp_year,
            is_default: existing.is_empty(),
            created_at: Utc::now(),
        };
        self.store.insert_payment_method(method.clone()).await;
        Ok(method)
    }

    /// SetDefault is mutually exclusive within a customer:
    /// unsets every other method first.
    pub async fn set_default_payment_method(
        &self,
        ctx: &RequestContext,
        customer_id: i64,
        payment_method_id: i64,
    ) -> PaymentResult<PaymentMethod> {
        let mut method = self
            .store
            .get_payment_method(ctx.org_id, payment_method_id)
            .await
            .ok_or(PaymentError::PaymentMethodNotFound(payment_method_id))?;
        self.store.unset_default_for_customer(customer_id).await;
        method.is_default = true;
        self.store.insert_payment_method(method.clone()).await;
        Ok(method)
    }

    pub async fn create_checkout_session(
        &self,
        ctx: &RequestContext,
        customer_id: i64,
        provider: &str,
        amount_cents: i64,
        currency: Currency,
        line_items: Vec<String>,
    ) -> PaymentResult<CheckoutSession> {
        let config = self
            .store
            .active_configs_for_provider(provider)
            .await
            .into_iter()
            .find(|c| c.org_id == ctx.org_id)
            .ok_or_else(|| PaymentError::ProviderNotFound(provider.to_string()))?;
        let adapter = self.providers.get(provider)?;
        let created = adapter.create_checkout_session(&config, amount_cents, currency).await?;

        let session = CheckoutSession {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            customer_id,
            provider: provider.to_string(),
            provider_session_id: created.provider_session_id,
            status: created.status,
            payment_status: "unpaid".to_string(),
            line_items,
            amount_total_cents: created.amount_total_cents,
            currency: created.currency,
            expires_at: None,
            completed_at: None,
            metadata: Default::default(),
        };
        self.store.insert_checkout_session(session.clone()).await;
        Ok(session)
    }

    pub async fn get_checkout_session(
        &self,
        ctx: &RequestContext,
        id: i64,
    ) -> PaymentResult<CheckoutSession> {
        self.store.get_checkout_session(ctx.org_id, id).await.ok_or(PaymentError::CheckoutSessionNotFound(id))
    }

    pub async fn mark_checkout_completed(&self, ctx: &RequestContext, id: i64) -> PaymentResult<CheckoutSession> {
        let mut session = self.get_checkout_session(ctx, id).await?;
        session.status = CheckoutSessionStatus::Complete;
        session.payment_status = "paid".to_string();
        session.completed_at = Some(Utc::now());
        self.store.insert_checkout_session(session.clone()).await;
        Ok(session)
    }

    /// Auto-charge: on finalization of an invoice whose subscription is
    /// CHARGE_AUTOMATICALLY and whose total is positive, attempts a
    /// charge against the customer's default payment method using
    /// `idempotency_key = "auto_charge:<invoice_id>"`, then merges the
    /// outcome into the invoice's metadata under the `auto_charge_*`
    /// keys. Failure is recorded, not retried here — the
    /// scheduler's `auto_charge_retry` job re-invokes this for invoices
    /// still unpaid past their retry window.
    pub async fn auto_charge_invoice(&self, ctx: &RequestContext, invoice: &Invoice) -> PaymentResult<()> {
        let now = Utc::now();

        let resolved = async {
            let method = self
                .store
                .default_payment_method(invoice.customer_id)
                .await
                .ok_or(PaymentError::PaymentMethodNotFound(invoice.customer_id))?;
            let config = self
                .store
                .active_configs_for_provider(&method.provider)
                .await
                .into_iter()
                .find(|c| c.org_id == ctx.org_id)
                .ok_or_else(|| PaymentError::ProviderNotFound(method.provider.clone()))?;
            let adapter = self.providers.get(&method.provider)?;
            Ok::<_, PaymentError>((method, config, adapter))
        }
        .await;

        let (method, config, adapter) = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                let mut fields = HashMap::new();
                fields.insert("auto_charge_status".to_string(), json!("failed"));
                fields.insert("auto_charge_error_code".to_string(), json!(auto_charge_error_code(&err)));
                fields.insert("auto_charge_error_message".to_string(), json!(err.to_string()));
                fields.insert("auto_charge_attempted_at".to_string(), json!(now.to_rfc3339()));
                if let Err(merge_err) = self.invoices.merge_metadata(ctx, invoice.id, fields).await {
                    warn!(?merge_err, invoice_id = invoice.id, "failed to record auto-charge outcome on invoice");
                }
                return Err(err);
            }
        };
        let idempotency_key = format!("auto_charge:{}", invoice.id);

        let mut fields = HashMap::new();
        fields.insert("auto_charge_attempted_at".to_string(), json!(now.to_rfc3339()));
        fields.insert("auto_charge_provider".to_string(), json!(method.provider.clone()));

        let outcome = adapter
            .charge(
                &config,
                &method.provider_payment_method_id,
                invoice.total_amount_cents,
                invoice.currency,
                &idempotency_key,
            )
            .await;

        match &outcome {
            Ok(charge) => {
                fields.insert("auto_charge_payment_intent_id".to_string(), json!(charge.payment_intent_id.clone()));
                fields.insert(
                    "auto_charge_status".to_string(),
                    json!(if charge.succeeded { "succeeded" } else { "failed" }),
                );
                if let Some(err) = &charge.error {
                    fields.insert("auto_charge_error_message".to_string(), json!(err.clone()));
                    fields.insert("auto_charge_error_code".to_string(), json!("provider_declined"));
                }
            }
            Err(err) => {
                fields.insert("auto_charge_status".to_string(), json!("failed"));
                fields.insert("auto_charge_error_message".to_string(), json!(err.to_string()));
                fields.insert("auto_charge_error_code".to_string(), json!(auto_charge_error_code(err)));
            }
        }

        if let Err(err) = self.invoices.merge_metadata(ctx, invoice.id, fields).await {
            warn!(?err, invoice_id = invoice.id, "failed to record auto-charge outcome on invoice");
        }

        match outcome {
            Ok(charge) if charge.succeeded => {
                self.invoices.mark_paid(ctx, invoice.id, now).await.ok();
                if let Err(err) = self
                    .ledger
                    .post_payment_succeeded(ctx, invoice.id, invoice.currency, invoice.total_amount_cents)
                    .await
                {
                    warn!(?err, invoice_id = invoice.id, "ledger posting failed for auto-charge");
                }
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// `cleanup_webhook_logs` job support: deletes `PaymentEventRecord`
    /// rows older than `retention_days`.
    pub async fn cleanup_events_older_than(&self, retention_days: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let stale = self.store.events_older_than(cutoff).await;
        for event in &stale {
            self.store.delete_event(event.id).await;
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{AttachedPaymentMethod, ChargeOutcome, CreatedCheckoutSession, ProviderAdapter};
    use crate::store::InMemoryPaymentStore;
    use async_trait::async_trait;
    use billing_catalog::{CatalogService, InMemoryCatalogStore};
    use billing_core::Clock;
    use billing_cycles::{CycleService, InMemoryCycleStore};
    use billing_invoicing::{InMemoryInvoiceStore, NoTaxCalculator};
    use billing_ledger::InMemoryLedgerStore;
    use billing_rating::InMemoryRatingStore;
    use billing_subscriptions::{InMemorySubscriptionStore, SubscriptionService};
    use billing_tenancy::{InMemoryTenancyStore, TenancyService};
    use std::collections::HashMap as StdHashMap;

    struct FakeAdapter;

    #[async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn verify(&self, _config: &crate::provider::ProviderConfig, _payload: &[u8], _headers: &StdHashMap<String, String>) -> bool {
            true
        }

        fn parse_dispute(&self, _payload: &serde_json::Value) -> Option<ParsedWebhookEvent> {
            None
        }

        fn parse_payment(&self, payload: &serde_json::Value) -> Option<ParsedWebhookEvent> {
            let provider_event_id = payload.get("id")?.as_str()?.to_string();
            Some(ParsedWebhookEvent::Payment {
                provider_event_id,
                event_type: PaymentWebhookEventType::PaymentSucceeded,
                customer_id: None,
                invoice_reference: None,
                amount_cents: 500,
                currency: Currency::usd(),
            })
        }

        async fn attach_payment_method(
            &self,
            _config: &crate::provider::ProviderConfig,
            _provider_customer_id: &str,
            _token: &str,
        ) -> PaymentResult<AttachedPaymentMethod> {
            Ok(AttachedPaymentMethod {
                provider_payment_method_id: "pm_1".into(),
                last4: Some("4242".into()),
                brand: Some("visa".into()),
                exp_month: Some(12),
                exp_year: Some(2030),
            })
        }

        async fn create_checkout_session(
            &self,
            _config: &crate::provider::ProviderConfig,
            amount_cents: i64,
            currency: Currency,
        ) -> PaymentResult<CreatedCheckoutSession> {
            Ok(CreatedCheckoutSession {
                provider_session_id: "cs_1".into(),
                status: CheckoutSessionStatus::Open,
                amount_total_cents: amount_cents,
                currency,
            })
        }

        async fn charge(
            &self,
            _config: &crate::provider::ProviderConfig,
            _provider_payment_method_id: &str,
            _amount_cents: i64,
            _currency: Currency,
            _idempotency_key: &str,
        ) -> PaymentResult<ChargeOutcome> {
            Ok(ChargeOutcome { payment_intent_id: "pi_1".into(), succeeded: true, error: None })
        }
    }

    async fn fixture() -> PaymentService {
        let _ = IdMinter::install(1);
        let catalog = Arc::new(CatalogService::new(InMemoryCatalogStore::new()));
        let tenancy = Arc::new(TenancyService::new(InMemoryTenancyStore::new()));
        let subscriptions = Arc::new(SubscriptionService::new(
            InMemorySubscriptionStore::new(),
            catalog,
            tenancy,
        ));
        let clock = Arc::new(Clock::default());
        let cycles = Arc::new(CycleService::new(InMemoryCycleStore::new(), clock.clone()));
        let invoices = Arc::new(InvoiceService::new(
            InMemoryInvoiceStore::new(),
            cycles,
            InMemoryRatingStore::new(),
            subscriptions,
            Arc::new(NoTaxCalculator),
            clock,
        ));
        let ledger = Arc::new(LedgerService::new(InMemoryLedgerStore::new(), Arc::new(Clock::default())));

        let store = InMemoryPaymentStore::new();
        store
            .upsert_provider_config(crate::provider::ProviderConfig {
                org_id: 1,
                provider: "fake".into(),
                webhook_secret: "whsec".into(),
                api_key: "sk_test".into(),
            })
            .await;

        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(FakeAdapter));

        PaymentService::new(store, Arc::new(registry), invoices, ledger)
    }

    #[tokio::test]
    async fn ingest_webhook_posts_ledger_entry_and_dedups() {
        let svc = fixture().await;
        let payload = serde_json::json!({"id": "evt_1"}).to_string();

        let first = svc
            .ingest_webhook("fake", payload.as_bytes(), StdHashMap::new())
            .await
            .unwrap();
        assert_eq!(first.org_id, 1);

        let err = svc.ingest_webhook("fake", payload.as_bytes(), StdHashMap::new()).await.unwrap_err();
        assert!(matches!(err, PaymentError::EventAlreadyProcessed { .. }));
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let svc = fixture().await;
        let err = svc.ingest_webhook("nope", b"{}", StdHashMap::new()).await.unwrap_err();
        assert!(matches!(err, PaymentError::ProviderNotFound(_)));
    }

    #[tokio::test]
    async fn attach_payment_method_defaults_first_method() {
        let svc = fixture().await;
        let ctx = RequestContext::system(1);
        let method = svc.attach_payment_method(&ctx, 1, "fake", "cus_1", "tok_1").await.unwrap();
        assert!(method.is_default);
    }
}
