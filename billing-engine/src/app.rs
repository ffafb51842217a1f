//! Composition root: builds every `billing-*` service and owns the
//! scheduler loop that drives them.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use billing_catalog::{CatalogService, InMemoryCatalogStore};
use billing_core::{Clock, IdMinter};
use billing_cycles::{CycleService, InMemoryCycleStore};
use billing_invoicing::{InMemoryInvoiceStore, InvoiceService, InvoiceStore, NoTaxCalculator, PostgresInvoiceStore};
use billing_ledger::{InMemoryLedgerStore, LedgerService, LedgerStore, PostgresLedgerStore};
use billing_ops::{InMemoryOpsStore, OpsService};
use billing_payments::{
    AdyenAdapter, BraintreeAdapter, InMemoryPaymentStore, PaymentService, PaymentStore,
    PostgresPaymentEventStore, ProviderRegistry, StripeAdapter, XenditAdapter,
};
use billing_rating::{InMemoryRatingStore, RatingService};
use billing_scheduler::{InMemoryJobRunStore, JobRunStore, PostgresJobRunStore, SchedulerService};
use billing_subscriptions::{InMemorySubscriptionStore, SubscriptionService};
use billing_tenancy::{InMemoryTenancyStore, TenancyService};
use billing_usage::{AlwaysAllowQuotaGate, InMemoryUsageStore, UsageService};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::EngineConfig;

/// Every service the engine wires up, held behind `Arc` the way the
/// teacher holds each subsystem so request handlers and the scheduler
/// loop can share them without cloning state.
pub struct BillingEngine {
    pub catalog: Arc<CatalogService>,
    pub tenancy: Arc<TenancyService>,
    pub subscriptions: Arc<SubscriptionService>,
    pub usage: Arc<UsageService>,
    pub cycles: Arc<CycleService>,
    pub rating: Arc<RatingService>,
    pub invoices: Arc<InvoiceService>,
    pub ledger: Arc<LedgerService>,
    pub payments: Arc<PaymentService>,
    pub ops: Arc<OpsService>,
    pub scheduler: Arc<SchedulerService>,
    pub clock: Arc<Clock>,
    config: EngineConfig,
    cron: Option<JobScheduler>,
}

impl BillingEngine {
    /// Builds the full service graph. Append-only aggregates (invoices,
    /// ledger, webhook events, job runs) use Postgres when
    /// `config.database_url` is set; every other aggregate is
    /// deliberately in-memory only, per spec (no Postgres variant
    /// exists for subscriptions, catalog, tenancy, or billing-ops).
    pub async fn build(config: EngineConfig) -> anyhow::Result<Self> {
        IdMinter::install(config.node_id)
            .map_err(|e| anyhow::anyhow!("failed to install id minter: {e}"))?;

        let clock = Arc::new(Clock::new());

        let tenancy_store = InMemoryTenancyStore::new();
        let catalog_store = InMemoryCatalogStore::new();
        let subscriptions_store = InMemorySubscriptionStore::new();
        let usage_store = InMemoryUsageStore::new();
        let cycles_store = InMemoryCycleStore::new();
        let rating_store = InMemoryRatingStore::new();
        let ops_store = InMemoryOpsStore::new();

        let (invoices_store, ledger_store, payments_store, job_runs_store): (
            Arc<dyn InvoiceStore>,
            Arc<dyn LedgerStore>,
            Arc<dyn PaymentStore>,
            Arc<dyn JobRunStore>,
        ) = match &config.database_url {
            Some(url) => {
                info!("connecting append-only stores to Postgres");
                (
                    PostgresInvoiceStore::connect(url).await?,
                    PostgresLedgerStore::connect(url).await?,
                    PostgresPaymentEventStore::connect(url).await?,
                    PostgresJobRunStore::connect(url).await?,
                )
            }
            None => {
                warn!("no database_url configured; running append-only aggregates in-memory");
                (
                    InMemoryInvoiceStore::new(),
                    InMemoryLedgerStore::new(),
                    InMemoryPaymentStore::new(),
                    InMemoryJobRunStore::new(),
                )
            }
        };

        let tenancy = Arc::new(TenancyService::new(tenancy_store));
        let catalog = Arc::new(CatalogService::new(catalog_store));
        let subscriptions = Arc::new(SubscriptionService::new(
            subscriptions_store,
            catalog.clone(),
            tenancy.clone(),
        ));
        let usage = Arc::new(UsageService::new(
            usage_store.clone(),
            catalog.clone(),
            subscriptions.clone(),
            Arc::new(AlwaysAllowQuotaGate),
        ));
        let cycles = Arc::new(CycleService::new(cycles_store, clock.clone()));
        let rating = Arc::new(RatingService::new(
            rating_store.clone(),
            catalog.clone(),
            subscriptions.clone(),
            cycles.clone(),
            usage_store,
        ));
        let ledger = Arc::new(LedgerService::new(ledger_store, clock.clone()));
        let invoices = Arc::new(InvoiceService::new(
            invoices_store,
            cycles.clone(),
            rating_store,
            subscriptions.clone(),
            Arc::new(NoTaxCalculator),
            clock.clone(),
        ));

        let mut registry = ProviderRegistry::new();
        let http = reqwest::Client::new();
        registry.register(Box::new(StripeAdapter::new(http.clone())));
        registry.register(Box::new(XenditAdapter::new(http.clone())));
        registry.register(Box::new(AdyenAdapter::new(http.clone())));
        registry.register(Box::new(BraintreeAdapter::new(http)));

        let payments = Arc::new(PaymentService::new(
            payments_store,
            Arc::new(registry),
            invoices.clone(),
            ledger.clone(),
        ));
        let ops = Arc::new(OpsService::new(ops_store, clock.clone()));

        let scheduler = Arc::new(SchedulerService::new(
            tenancy.clone(),
            subscriptions.clone(),
            cycles.clone(),
            rating.clone(),
            ledger.clone(),
            invoices.clone(),
            payments.clone(),
            ops.clone(),
            clock.clone(),
            job_runs_store,
        ));

        Ok(Self {
            catalog,
            tenancy,
            subscriptions,
            usage,
            cycles,
            rating,
            invoices,
            ledger,
            payments,
            ops,
            scheduler,
            clock,
            config,
            cron: None,
        })
    }

    /// Registers every scheduled job against `tokio-cron-scheduler`'s
    /// tick loop and starts it. Production runs always pass
    /// `test_clock_id: None`; nothing in this engine advances a test
    /// clock outside the simulation harness used by integration tests.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        let mut cron = JobScheduler::new().await?;
        let cfg = &self.config.scheduler;

        let scheduler = self.scheduler.clone();
        cron.add(interval_job(cfg.pipeline_interval_secs, move || {
            let scheduler = scheduler.clone();
            Box::pin(async move {
                run_named(&scheduler.close_cycles(None).await, "close_cycles");
            })
        })?)
        .await?;

        let scheduler = self.scheduler.clone();
        cron.add(interval_job(cfg.pipeline_interval_secs, move || {
            let scheduler = scheduler.clone();
            Box::pin(async move {
                run_named(&scheduler.rate_cycles(None).await, "rate_cycles");
            })
        })?)
        .await?;

        let scheduler = self.scheduler.clone();
        cron.add(interval_job(cfg.pipeline_interval_secs, move || {
            let scheduler = scheduler.clone();
            Box::pin(async move {
                run_named(&scheduler.generate_invoices(None).await, "generate_invoices");
            })
        })?)
        .await?;

        let scheduler = self.scheduler.clone();
        cron.add(interval_job(cfg.pipeline_interval_secs, move || {
            let scheduler = scheduler.clone();
            Box::pin(async move {
                run_named(&scheduler.auto_charge_retry(None).await, "auto_charge_retry");
            })
        })?)
        .await?;

        let scheduler = self.scheduler.clone();
        cron.add(interval_job(cfg.pipeline_interval_secs, move || {
            let scheduler = scheduler.clone();
            Box::pin(async move {
                run_named(&scheduler.dunning(None).await, "dunning");
            })
        })?)
        .await?;

        let scheduler = self.scheduler.clone();
        cron.add(interval_job(cfg.sla_interval_secs, move || {
            let scheduler = scheduler.clone();
            Box::pin(async move {
                run_named(&scheduler.evaluate_slas().await, "evaluate_slas");
            })
        })?)
        .await?;

        let scheduler = self.scheduler.clone();
        cron.add(interval_job(cfg.performance_interval_secs, move || {
            let scheduler = scheduler.clone();
            Box::pin(async move {
                run_named(&scheduler.aggregate_performance().await, "aggregate_performance");
            })
        })?)
        .await?;

        let retention_days = cfg.webhook_retention_days;
        let scheduler = self.scheduler.clone();
        cron.add(interval_job(cfg.cleanup_interval_secs, move || {
            let scheduler = scheduler.clone();
            Box::pin(async move {
                run_named(&scheduler.cleanup_webhook_logs(retention_days).await, "cleanup_webhook_logs");
            })
        })?)
        .await?;

        cron.start().await?;
        self.cron = Some(cron);
        info!("scheduler started");
        Ok(())
    }

    pub async fn stop(&mut self) -> anyhow::Result<()> {
        if let Some(mut cron) = self.cron.take() {
            cron.shutdown().await?;
        }
        info!("scheduler stopped");
        Ok(())
    }
}

fn run_named<T>(result: &Result<T, impl std::fmt::Display>, job_name: &str) {
    if let Err(err) = result {
        error!(job = job_name, %err, "scheduled job failed");
    }
}

/// Builds a fixed-interval `tokio-cron-scheduler` job, since our jobs
/// tick on "every N seconds" rather than a calendar cron expression.
fn interval_job<F>(interval_secs: u64, mut action: F) -> Result<Job, tokio_cron_scheduler::JobSchedulerError>
where
    F: FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync + 'static,
{
    Job::new_repeated_async(StdDuration::from_secs(interval_secs), move |_uuid, _lock| action())
}
