//! Invoice generation: turns a CLOSED billing cycle (rated,
//! with its ledger accrual already posted by the scheduler's
//! `rate_cycles` job) into a finalized invoice.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use billing_core::{Clock, IdMinter, Money, RequestContext};
use billing_cycles::{CycleService, CycleStatus};
use billing_rating::RatingStore;
use billing_subscriptions::{CollectionMode, SubscriptionService};
use chrono::{DateTime, Utc};

use crate::errors::{InvoiceError, InvoiceOpResult};
use crate::store::InvoiceStore;
use crate::types::{Invoice, InvoiceItem, InvoiceStatus, InvoiceTaxLine};

/// Jurisdictional tax computation is out of scope for this engine (spec
/// Non-goals); invoices still carry a `tax_lines` collection so a real
/// calculator can be plugged in without a schema change. The default
/// implementation assesses no tax.
#[async_trait]
pub trait TaxCalculator: Send + Sync {
    async fn assess(
        &self,
        ctx: &RequestContext,
        invoice: &Invoice,
        items: &[InvoiceItem],
    ) -> Vec<InvoiceTaxLine>;
}

pub struct NoTaxCalculator;

#[async_trait]
impl TaxCalculator for NoTaxCalculator {
    async fn assess(
        &self,
        _ctx: &RequestContext,
        _invoice: &Invoice,
        _items: &[InvoiceItem],
    ) -> Vec<InvoiceTaxLine> {
        Vec::new()
    }
}

/// Emitted after an invoice is finalized so the composition root can
/// decide whether to dispatch a charge through `billing-payments`
/// without `billing-invoicing` depending on it directly.
#[derive(Debug, Clone)]
pub struct InvoiceFinalized {
    pub invoice: Invoice,
    pub collection_mode: CollectionMode,
}

pub struct InvoiceService {
    store: Arc<dyn InvoiceStore>,
    cycles: Arc<CycleService>,
    rating: Arc<dyn RatingStore>,
    subscriptions: Arc<SubscriptionService>,
    tax: Arc<dyn TaxCalculator>,
    clock: Arc<Clock>,
}

impl InvoiceService {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        cycles: Arc<CycleService>,
        rating: Arc<dyn RatingStore>,
        subscriptions: Arc<SubscriptionService>,
        tax: Arc<dyn TaxCalculator>,
        clock: Arc<Clock>,
    ) -> Self {
        Self { store, cycles, rating, subscriptions, tax, clock }
    }

    pub async fn get(&self, ctx: &RequestContext, id: i64) -> InvoiceOpResult<Invoice> {
        self.store.get(ctx.org_id, id).await.ok_or(InvoiceError::InvoiceNotFound(id))
    }

    pub async fn items_for(&self, invoice_id: i64) -> Vec<InvoiceItem> {
        self.store.items_for(invoice_id).await
    }

    pub async fn tax_lines_for(&self, invoice_id: i64) -> Vec<InvoiceTaxLine> {
        self.store.tax_lines_for(invoice_id).await
    }

    /// Invoices for a subscription that have not reached a terminal
    /// state (PAID/VOID), used by the composition root to evaluate the
    /// `end()` precondition `has_unfinalized_invoices`.
    pub async fn unfinalized_for_subscription(&self, subscription_id: i64) -> Vec<Invoice> {
        self.store.unfinalized_for_subscription(subscription_id).await
    }

    /// Every outstanding (FINALIZED, unpaid) invoice for an org, used by
    /// the scheduler's `auto_charge_retry` and `dunning` jobs.
    pub async fn finalized_for_org(&self, ctx: &RequestContext) -> Vec<Invoice> {
        self.store.finalized_for_org(ctx.org_id).await
    }

    /// Merges entries into an invoice's metadata map, used to record
    /// auto-charge attempt outcomes under the `auto_charge_*` keys
    /// without disturbing the rest of the invoice.
    pub async fn merge_metadata(
        &self,
        ctx: &RequestContext,
        invoice_id: i64,
        entries: HashMap<String, serde_json::Value>,
    ) -> InvoiceOpResult<Invoice> {
        let mut invoice = self.get(ctx, invoice_id).await?;
        invoice.metadata.extend(entries);
        self.store.insert(invoice.clone()).await;
        Ok(invoice)
    }

    /// Builds, finalizes and returns the invoice for a CLOSED billing
    /// cycle. Idempotent: a second call for the same cycle rejects with
    /// [`InvoiceError::AlreadyGenerated`] rather than doubling it (spec
    /// §4.I "invoice generation is idempotent per cycle").
    pub async fn generate_invoice(
        &self,
        ctx: &RequestContext,
        billing_cycle_id: i64,
    ) -> InvoiceOpResult<(Invoice, InvoiceFinalized)> {
        if let Some(existing) = self.store.for_cycle(billing_cycle_id).await {
            return Err(InvoiceError::AlreadyGenerated(existing.id));
        }

        let cycle = self
            .cycles
            .get(ctx, billing_cycle_id)
            .await
            .map_err(|_| InvoiceError::CycleNotClosed(billing_cycle_id))?;
        if cycle.status != CycleStatus::Closed {
            return Err(InvoiceError::CycleNotClosed(billing_cycle_id));
        }

        let subscription = self
            .subscriptions
            .get(ctx, cycle.subscription_id)
            .await
            .map_err(|e| InvoiceError::InvalidRequest(e.to_string()))?;

        let results = self.rating.for_cycle(billing_cycle_id).await;
        let currency = results.first().map(|r| r.currency).unwrap_or(subscription.default_currency);

        let now = self.clock.now(ctx);
        let invoice_id = IdMinter::global().next_id();
        let invoice_number = self.store.next_invoice_number(ctx.org_id).await;

        let items: Vec<InvoiceItem> = results
            .iter()
            .map(|r| InvoiceItem {
                id: IdMinter::global().next_id(),
                invoice_id,
                rating_result_id: r.id,
                feature_code: r.feature_code.clone(),
                meter_id: r.meter_id,
                quantity: r.quantity,
                unit_price_cents: r.unit_price_cents,
                amount_cents: r.amount_cents,
            })
            .collect();

        let subtotal = items
            .iter()
            .fold(Money::zero(currency), |acc, item| acc + Money::new(item.amount_cents, currency));

        let mut invoice = Invoice {
            id: invoice_id,
            org_id: ctx.org_id,
            subscription_id: subscription.id,
            customer_id: subscription.customer_id,
            billing_cycle_id,
            invoice_number,
            currency,
            status: InvoiceStatus::Draft,
            subtotal_amount_cents: subtotal.cents,
            total_amount_cents: subtotal.cents,
            paid_at: None,
            due_at: None,
            metadata: HashMap::new(),
            created_at: now,
        };

        let tax_lines = self.tax.assess(ctx, &invoice, &items).await;
        let tax_total: i64 = tax_lines.iter().map(|t| t.amount_cents).sum();
        invoice.total_amount_cents = invoice.subtotal_amount_cents + tax_total;

        invoice.status = InvoiceStatus::Finalized;
        invoice.due_at = Some(due_at_for(&subscription.collection_mode, now));

        self.store.insert(invoice.clone()).await;
        self.store.insert_items(invoice_id, items).await;
        self.store.insert_tax_lines(invoice_id, tax_lines).await;

        let finalized = InvoiceFinalized {
            invoice: invoice.clone(),
            collection_mode: subscription.collection_mode,
        };
        Ok((invoice, finalized))
    }

    /// Marks an invoice PAID, typically driven by a successful payment
    /// event from `billing-payments`.
    pub async fn mark_paid(
        &self,
        ctx: &RequestContext,
        invoice_id: i64,
        paid_at: DateTime<Utc>,
    ) -> InvoiceOpResult<Invoice> {
        let mut invoice = self.get(ctx, invoice_id).await?;
        if invoice.status != InvoiceStatus::Finalized {
            return Err(InvoiceError::NotDraft(invoice_id));
        }
        invoice.status = InvoiceStatus::Paid;
        invoice.paid_at = Some(paid_at);
        self.store.insert(invoice.clone()).await;
        Ok(invoice)
    }

    pub async fn void(&self, ctx: &RequestContext, invoice_id: i64) -> InvoiceOpResult<Invoice> {
        let mut invoice = self.get(ctx, invoice_id).await?;
        if invoice.status == InvoiceStatus::Paid {
            return Err(InvoiceError::NotDraft(invoice_id));
        }
        invoice.status = InvoiceStatus::Void;
        self.store.insert(invoice.clone()).await;
        Ok(invoice)
    }
}

fn due_at_for(mode: &CollectionMode, now: DateTime<Utc>) -> DateTime<Utc> {
    match mode {
        CollectionMode::ChargeAutomatically => now,
        CollectionMode::SendInvoice => now + chrono::Duration::days(30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_catalog::{BillingInterval, CatalogService, InMemoryCatalogStore, PricingModel};
    use billing_core::{ActorType, Currency};
    use billing_cycles::InMemoryCycleStore;
    use billing_rating::{InMemoryRatingStore, RatingResult};
    use billing_subscriptions::{
        BillingCycleType, CollectionMode as SubCollectionMode, InMemorySubscriptionStore,
        SubscriptionItemInput,
    };
    use billing_tenancy::{InMemoryTenancyStore, TenancyService};

    fn ctx(org: i64) -> RequestContext {
        RequestContext::new(org, ActorType::System)
    }

    async fn fixture() -> (InvoiceService, Arc<CycleService>, i64, i64) {
        let catalog = Arc::new(CatalogService::new(InMemoryCatalogStore::new()));
        let tenancy = Arc::new(TenancyService::new(InMemoryTenancyStore::new()));
        let subs_store = InMemorySubscriptionStore::new();
        let subscriptions = Arc::new(SubscriptionService::new(subs_store, catalog.clone(), tenancy.clone()));
        let clock = Arc::new(Clock::default());
        let cycles = Arc::new(CycleService::new(InMemoryCycleStore::new(), clock.clone()));
        let rating_store = InMemoryRatingStore::new();
        let invoice_store = crate::store::InMemoryInvoiceStore::new();
        let svc = InvoiceService::new(
            invoice_store,
            cycles.clone(),
            rating_store.clone(),
            subscriptions.clone(),
            Arc::new(NoTaxCalculator),
            clock,
        );

        let org = tenancy.create_organization("Acme".into(), Currency::usd()).await;
        let c = ctx(org.id);
        let customer = tenancy.create_customer(&c, "Dev".into(), None, None).await;

        let product = catalog.create_product(&c, "platform".into(), Default::default()).await.unwrap();
        let price = catalog
            .create_price(
                &c,
                product.id,
                "flat-monthly".into(),
                PricingModel::Flat,
                BillingMode::Licensed,
                BillingInterval::Month,
                1,
                vec![],
            )
            .await
            .unwrap();
        catalog
            .create_price_amount(&c, price.id, Currency::usd(), 500, None, None, None, Utc::now(), None)
            .await
            .unwrap();

        let subscription = subscriptions
            .create(
                &c,
                customer.id,
                SubCollectionMode::ChargeAutomatically,
                Some(BillingCycleType::Monthly),
                None,
                vec![SubscriptionItemInput { price_id: price.id, quantity: 1, billing_threshold: None }],
                None,
            )
            .await
            .unwrap();

        let cycle = cycles
            .open_initial_cycle(&c, subscription.id, BillingCycleType::Monthly, Utc::now())
            .await;
        let (closing, _next) =
            cycles.close_and_reopen(&c, &cycle, BillingCycleType::Monthly).await.unwrap();

        rating_store
            .upsert(RatingResult {
                id: IdMinter::global().next_id(),
                org_id: org.id,
                billing_cycle_id: closing.id,
                subscription_item_id: 1,
                price_id: price.id,
                meter_id: None,
                feature_code: "flat-monthly".to_string(),
                quantity: 1,
                unit_price_cents: 500,
                amount_cents: 500,
                currency: Currency::usd(),
                period_start: closing.period_start,
                period_end: closing.period_end,
            })
            .await;
        cycles.mark_rated(&c, closing.id).await.unwrap();
        cycles.mark_closed(&c, closing.id).await.unwrap();

        (svc, cycles, closing.id, org.id)
    }

    #[tokio::test]
    async fn generate_invoice_requires_closed_cycle() {
        let _ = IdMinter::install(1);
        let (svc, _cycles, cycle_id, org_id) = fixture().await;
        let c = ctx(org_id);
        let (invoice, finalized) = svc.generate_invoice(&c, cycle_id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Finalized);
        assert_eq!(invoice.total_amount_cents, 500);
        assert_eq!(finalized.collection_mode, SubCollectionMode::ChargeAutomatically);
    }

    #[tokio::test]
    async fn generate_invoice_rejects_cycle_still_closing() {
        let _ = IdMinter::install(2);
        let catalog = Arc::new(CatalogService::new(InMemoryCatalogStore::new()));
        let tenancy = Arc::new(TenancyService::new(InMemoryTenancyStore::new()));
        let subs_store = InMemorySubscriptionStore::new();
        let subscriptions = Arc::new(SubscriptionService::new(subs_store, catalog.clone(), tenancy.clone()));
        let clock = Arc::new(Clock::default());
        let cycles = Arc::new(CycleService::new(InMemoryCycleStore::new(), clock.clone()));
        let svc = InvoiceService::new(
            crate::store::InMemoryInvoiceStore::new(),
            cycles.clone(),
            InMemoryRatingStore::new(),
            subscriptions.clone(),
            Arc::new(NoTaxCalculator),
            clock,
        );
        let org = tenancy.create_organization("Acme".into(), Currency::usd()).await;
        let c = ctx(org.id);
        let customer = tenancy.create_customer(&c, "Dev".into(), None, None).await;
        let product = catalog.create_product(&c, "platform".into(), Default::default()).await.unwrap();
        let price = catalog
            .create_price(
                &c,
                product.id,
                "flat-monthly".into(),
                PricingModel::Flat,
                BillingMode::Licensed,
                BillingInterval::Month,
                1,
                vec![],
            )
            .await
            .unwrap();
        let subscription = subscriptions
            .create(
                &c,
                customer.id,
                SubCollectionMode::ChargeAutomatically,
                Some(BillingCycleType::Monthly),
                None,
                vec![SubscriptionItemInput { price_id: price.id, quantity: 1, billing_threshold: None }],
                None,
            )
            .await
            .unwrap();
        let cycle = cycles
            .open_initial_cycle(&c, subscription.id, BillingCycleType::Monthly, Utc::now())
            .await;
        let (closing, _next) = cycles.close_and_reopen(&c, &cycle, BillingCycleType::Monthly).await.unwrap();

        let err = svc.generate_invoice(&c, closing.id).await.unwrap_err();
        assert!(matches!(err, InvoiceError::CycleNotClosed(_)));
    }

    #[tokio::test]
    async fn generate_invoice_is_idempotent_per_cycle() {
        let _ = IdMinter::install(3);
        let (svc, _cycles, cycle_id, org_id) = fixture().await;
        let c = ctx(org_id);
        svc.generate_invoice(&c, cycle_id).await.unwrap();
        let err = svc.generate_invoice(&c, cycle_id).await.unwrap_err();
        assert!(matches!(err, InvoiceError::AlreadyGenerated(_)));
    }
}
