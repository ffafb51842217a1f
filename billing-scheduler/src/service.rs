//! Named job runner: each public method below is one row of
//! the jobs table, wrapped by [`SchedulerService::run_job`] so every run
//! gets a `JobRun` record and is serialized against concurrent instances
//! of the same job name.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use billing_core::{Clock, IdMinter, RequestContext};
use billing_cycles::CycleService;
use billing_invoicing::{InvoiceError, InvoiceService};
use billing_ledger::{LedgerAccountCode, LedgerService};
use billing_ops::OpsService;
use billing_payments::PaymentService;
use billing_rating::RatingService;
use billing_subscriptions::{CollectionMode, SubscriptionService};
use billing_tenancy::TenancyService;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::warn;

use crate::errors::{SchedulerError, SchedulerResult};
use crate::store::JobRunStore;
use crate::types::{JobName, JobRun};

/// Auto-charge is retried at most this many times before an invoice is
/// left to the `dunning` job instead.
const AUTO_CHARGE_MAX_ATTEMPTS: i64 = 5;
/// Backoff doubles per attempt starting from this base, bounded by
/// `AUTO_CHARGE_BACKOFF_CAP_HOURS` ("exponential backoff
/// bounded by 24h").
const AUTO_CHARGE_BACKOFF_BASE_MINUTES: i64 = 30;
const AUTO_CHARGE_BACKOFF_CAP_HOURS: i64 = 24;

/// Reminder cadence, in days overdue, that advances an invoice's dunning
/// stage. An assignment is opened for a
/// collections operator once an invoice first reaches this stage.
const DUNNING_REMINDER_DAYS: [i64; 4] = [3, 7, 14, 30];
const ASSIGNMENT_DUNNING_STAGE: i64 = 2;

/// An opened assignment's deadline for a first operator response.
const ASSIGNMENT_SLA_HOURS: i64 = 24;
/// `evaluate_slas` escalates an assignment idle longer than this...
const SLA_IDLE_THRESHOLD_HOURS: i64 = 48;
/// ...or with no first response this long past its `sla_due_at`.
const SLA_INITIAL_RESPONSE_GRACE_HOURS: i64 = 24;

pub struct SchedulerService {
    tenancy: Arc<TenancyService>,
    subscriptions: Arc<SubscriptionService>,
    cycles: Arc<CycleService>,
    rating: Arc<RatingService>,
    ledger: Arc<LedgerService>,
    invoices: Arc<InvoiceService>,
    payments: Arc<PaymentService>,
    ops: Arc<OpsService>,
    clock: Arc<Clock>,
    job_runs: Arc<dyn JobRunStore>,
    locks: HashMap<JobName, Arc<Mutex<()>>>,
}

impl SchedulerService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenancy: Arc<TenancyService>,
        subscriptions: Arc<SubscriptionService>,
        cycles: Arc<CycleService>,
        rating: Arc<RatingService>,
        ledger: Arc<LedgerService>,
        invoices: Arc<InvoiceService>,
        payments: Arc<PaymentService>,
        ops: Arc<OpsService>,
        clock: Arc<Clock>,
        job_runs: Arc<dyn JobRunStore>,
    ) -> Self {
        let locks = JobName::ALL.into_iter().map(|n| (n, Arc::new(Mutex::new(())))).collect();
        Self {
            tenancy,
            subscriptions,
            cycles,
            rating,
            ledger,
            invoices,
            payments,
            ops,
            clock,
            job_runs,
            locks,
        }
    }

    fn scoped_ctx(&self, org_id: i64, test_clock_id: Option<i64>) -> RequestContext {
        let ctx = RequestContext::system(org_id);
        match test_clock_id {
            Some(id) => ctx.with_test_clock(id),
            None => ctx,
        }
    }

    /// Acquires the advisory lock for `name`, records the run, awaits
    /// `fut`, then closes out the run record. The lock is an in-process
    /// `tokio::sync::Mutex` rather than a real `pg_advisory_lock`: spec
    /// §4.L already assumes "a single process per deployment
    /// (lease-enforced by the control plane) runs the scheduler", so
    /// cross-process serialization is handled above this component and
    /// all that remains here is serializing concurrent ticks of the same
    /// job within that one process.
    async fn run_job<Fut>(
        &self,
        name: JobName,
        test_clock_id: Option<i64>,
        fut: Fut,
    ) -> SchedulerResult<JobRun>
    where
        Fut: Future<Output = (i64, Option<String>)>,
    {
        let lock = self
            .locks
            .get(&name)
            .cloned()
            .expect("every JobName is registered in the lock map");
        let _guard = lock.try_lock().map_err(|_| SchedulerError::AlreadyRunning(name.as_str()))?;

        let id = IdMinter::global().next_id();
        let started_at = Utc::now();
        self.job_runs.insert(JobRun::started(id, name, test_clock_id, started_at)).await;

        let (processed_count, error) = fut.await;

        let finished_at = Utc::now();
        self.job_runs.finish(id, finished_at, processed_count, error.clone()).await;
        self.job_runs.get(id).await.ok_or(SchedulerError::JobRunNotFound(id))
    }

    // ---- close_cycles ----------------------------------------------

    async fn close_cycles_body(&self, test_clock_id: Option<i64>) -> (i64, Option<String>) {
        let probe = self.scoped_ctx(0, test_clock_id);
        let due = self.cycles.due_for_close(&probe).await;
        let mut processed = 0i64;
        let mut error = None;
        for cycle in due {
            let ctx = self.scoped_ctx(cycle.org_id, test_clock_id);
            let subscription = match self.subscriptions.get(&ctx, cycle.subscription_id).await {
                Ok(s) => s,
                Err(e) => {
                    if error.is_none() {
                        error = Some(e.to_string());
                    }
                    continue;
                }
            };
            match self.cycles.close_and_reopen(&ctx, &cycle, subscription.billing_cycle_type).await {
                Ok(_) => processed += 1,
                Err(e) => {
                    if error.is_none() {
                        error = Some(e.to_string());
                    }
                }
            }
        }
        (processed, error)
    }

    /// Advances every OPEN cycle whose `period_end` has passed to
    /// CLOSING and opens the subscription's next cycle.
    pub async fn close_cycles(&self, test_clock_id: Option<i64>) -> SchedulerResult<JobRun> {
        self.run_job(JobName::CloseCycles, test_clock_id, self.close_cycles_body(test_clock_id)).await
    }

    // ---- rate_cycles -------------------------------------------------

    async fn rate_one_cycle(&self, ctx: &RequestContext, cycle_id: i64) -> Result<(), String> {
        let results = self.rating.run_rating(ctx, cycle_id).await.map_err(|e| e.to_string())?;

        let mut flat_total = 0i64;
        let mut usage_total = 0i64;
        let mut currency = None;
        for r in &results {
            currency.get_or_insert(r.currency);
            if r.meter_id.is_none() {
                flat_total += r.amount_cents;
            } else {
                usage_total += r.amount_cents;
            }
        }

        if let Some(currency) = currency {
            if flat_total != 0 {
                self.ledger
                    .post_usage_accrual(ctx, cycle_id, currency, flat_total, LedgerAccountCode::RevenueFlat)
                    .await
                    .map_err(|e| e.to_string())?;
            }
            if usage_total != 0 {
                self.ledger
                    .post_usage_accrual(ctx, cycle_id, currency, usage_total, LedgerAccountCode::RevenueUsage)
                    .await
                    .map_err(|e| e.to_string())?;
            }
        }

        self.cycles.mark_closed(ctx, cycle_id).await.map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn rate_cycles_body(&self, test_clock_id: Option<i64>) -> (i64, Option<String>) {
        let mut processed = 0i64;
        let mut error = None;
        for org in self.tenancy.list_organizations().await {
            let ctx = self.scoped_ctx(org.id, test_clock_id);
            let closing = self.cycles.closing_cycles(&ctx).await;
            for cycle in closing.into_iter().filter(|c| c.rating_completed_at.is_none()) {
                match self.rate_one_cycle(&ctx, cycle.id).await {
                    Ok(()) => processed += 1,
                    Err(e) => {
                        if error.is_none() {
                            error = Some(e);
                        }
                    }
                }
            }
        }
        (processed, error)
    }

    /// Rates every CLOSING cycle not yet rated, posts its usage accrual
    /// to the ledger split by flat vs. metered revenue, then marks it
    /// CLOSED (: "rate CLOSING cycles; post usage accrual to
    /// ledger; transition to CLOSED" — this three-step sequence is the
    /// scheduler's responsibility, not `billing-rating`'s or
    /// `billing-invoicing`'s).
    pub async fn rate_cycles(&self, test_clock_id: Option<i64>) -> SchedulerResult<JobRun> {
        self.run_job(JobName::RateCycles, test_clock_id, self.rate_cycles_body(test_clock_id)).await
    }

    // ---- generate_invoices --------------------------------------------

    async fn generate_invoices_body(&self, test_clock_id: Option<i64>) -> (i64, Option<String>) {
        let mut processed = 0i64;
        let mut error = None;
        for org in self.tenancy.list_organizations().await {
            let ctx = self.scoped_ctx(org.id, test_clock_id);
            for cycle in self.cycles.closed_cycles(&ctx).await {
                match self.invoices.generate_invoice(&ctx, cycle.id).await {
                    Ok((invoice, finalized)) => {
                        processed += 1;
                        if finalized.collection_mode == CollectionMode::ChargeAutomatically
                            && invoice.total_amount_cents > 0
                        {
                            if let Err(err) = self.payments.auto_charge_invoice(&ctx, &invoice).await {
                                warn!(?err, invoice_id = invoice.id, "initial auto-charge attempt failed");
                            }
                        }
                    }
                    Err(InvoiceError::AlreadyGenerated(_)) => {}
                    Err(e) => {
                        if error.is_none() {
                            error = Some(e.to_string());
                        }
                    }
                }
            }
        }
        (processed, error)
    }

    /// Generates a FINALIZED invoice for every CLOSED cycle that doesn't
    /// have one yet, then dispatches an initial auto-charge attempt for
    /// `CHARGE_AUTOMATICALLY` subscriptions.
    pub async fn generate_invoices(&self, test_clock_id: Option<i64>) -> SchedulerResult<JobRun> {
        self.run_job(JobName::GenerateInvoices, test_clock_id, self.generate_invoices_body(test_clock_id))
            .await
    }

    // ---- auto_charge_retry ---------------------------------------------

    async fn auto_charge_retry_body(&self, test_clock_id: Option<i64>) -> (i64, Option<String>) {
        let mut processed = 0i64;
        let mut error = None;
        for org in self.tenancy.list_organizations().await {
            let ctx = self.scoped_ctx(org.id, test_clock_id);
            let now = self.clock.now(&ctx);
            for invoice in self.invoices.finalized_for_org(&ctx).await {
                let subscription = match self.subscriptions.get(&ctx, invoice.subscription_id).await {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                if subscription.collection_mode != CollectionMode::ChargeAutomatically {
                    continue;
                }
                let status = invoice.metadata.get("auto_charge_status").and_then(|v| v.as_str());
                if status == Some("succeeded") {
                    continue;
                }
                let attempts =
                    invoice.metadata.get("auto_charge_attempt_count").and_then(|v| v.as_i64()).unwrap_or(0);
                if attempts >= AUTO_CHARGE_MAX_ATTEMPTS {
                    continue;
                }
                if !due_for_retry(&invoice.metadata, now) {
                    continue;
                }

                match self.payments.auto_charge_invoice(&ctx, &invoice).await {
                    Ok(()) => processed += 1,
                    Err(e) => {
                        if error.is_none() {
                            error = Some(e.to_string());
                        }
                    }
                }
                let mut fields = HashMap::new();
                fields.insert("auto_charge_attempt_count".to_string(), json!(attempts + 1));
                let _ = self.invoices.merge_metadata(&ctx, invoice.id, fields).await;
            }
        }
        (processed, error)
    }

    /// Re-invokes [`PaymentService::auto_charge_invoice`] for invoices
    /// whose most recent attempt failed and whose backoff window has
    /// elapsed, up to `AUTO_CHARGE_MAX_ATTEMPTS`.
    pub async fn auto_charge_retry(&self, test_clock_id: Option<i64>) -> SchedulerResult<JobRun> {
        self.run_job(JobName::AutoChargeRetry, test_clock_id, self.auto_charge_retry_body(test_clock_id))
            .await
    }

    // ---- dunning -------------------------------------------------------

    async fn dunning_body(&self, test_clock_id: Option<i64>) -> (i64, Option<String>) {
        let mut processed = 0i64;
        for org in self.tenancy.list_organizations().await {
            let ctx = self.scoped_ctx(org.id, test_clock_id);
            let now = self.clock.now(&ctx);
            for invoice in self.invoices.finalized_for_org(&ctx).await {
                let due_at = match invoice.due_at {
                    Some(d) => d,
                    None => continue,
                };
                if now < due_at {
                    continue;
                }
                let overdue_days = (now - due_at).num_days();
                let stage = invoice.metadata.get("dunning_stage").and_then(|v| v.as_i64()).unwrap_or(0);
                let next_stage = DUNNING_REMINDER_DAYS.iter().filter(|&&d| overdue_days >= d).count() as i64;
                if next_stage <= stage {
                    continue;
                }
                let mut fields = HashMap::new();
                fields.insert("dunning_stage".to_string(), json!(next_stage));
                fields.insert("dunning_last_reminder_at".to_string(), json!(now.to_rfc3339()));
                if self.invoices.merge_metadata(&ctx, invoice.id, fields).await.is_ok() {
                    processed += 1;
                }
                if next_stage >= ASSIGNMENT_DUNNING_STAGE && stage < ASSIGNMENT_DUNNING_STAGE {
                    self.ops
                        .open_assignment(&ctx, invoice.id, None, now + Duration::hours(ASSIGNMENT_SLA_HOURS))
                        .await;
                }
            }
        }
        (processed, None)
    }

    /// Advances overdue FINALIZED invoices through the reminder cadence
    /// in [`DUNNING_REMINDER_DAYS`]. Dispatching the actual
    /// reminder (email, in-app notice) is outside this engine's scope;
    /// this job only owns the cadence state recorded on the invoice.
    pub async fn dunning(&self, test_clock_id: Option<i64>) -> SchedulerResult<JobRun> {
        self.run_job(JobName::Dunning, test_clock_id, self.dunning_body(test_clock_id)).await
    }

    // ---- evaluate_slas --------------------------------------------------

    async fn evaluate_slas_body(&self) -> (i64, Option<String>) {
        let mut processed = 0i64;
        for org in self.tenancy.list_organizations().await {
            let ctx = self.scoped_ctx(org.id, None);
            let escalated = self
                .ops
                .evaluate_slas(
                    &ctx,
                    Duration::hours(SLA_IDLE_THRESHOLD_HOURS),
                    Duration::hours(SLA_INITIAL_RESPONSE_GRACE_HOURS),
                )
                .await;
            processed += escalated.len() as i64;
        }
        (processed, None)
    }

    /// Scans open collections assignments and escalates the idle or
    /// unresponded ones. Not test-clock scoped:
    /// collections follow-up runs on wall-clock time even while a
    /// simulated billing pipeline is exercised under a test clock.
    pub async fn evaluate_slas(&self) -> SchedulerResult<JobRun> {
        self.run_job(JobName::EvaluateSlas, None, self.evaluate_slas_body()).await
    }

    // ---- aggregate_performance -------------------------------------------

    async fn aggregate_performance_body(&self) -> (i64, Option<String>) {
        let yesterday = (Utc::now() - Duration::days(1)).date_naive();
        let mut processed = 0i64;
        for org in self.tenancy.list_organizations().await {
            let ctx = self.scoped_ctx(org.id, None);
            let snapshots = self.ops.aggregate_performance(&ctx, yesterday).await;
            processed += snapshots.len() as i64;
        }
        (processed, None)
    }

    /// Rolls up yesterday's per-operator collections activity into
    /// `FinOpsSnapshot` rows.
    pub async fn aggregate_performance(&self) -> SchedulerResult<JobRun> {
        self.run_job(JobName::AggregatePerformance, None, self.aggregate_performance_body()).await
    }

    // ---- cleanup_webhook_logs ------------------------------------------

    async fn cleanup_webhook_logs_body(&self, retention_days: i64) -> (i64, Option<String>) {
        let count = self.payments.cleanup_events_older_than(retention_days).await;
        (count as i64, None)
    }

    /// Deletes `PaymentEventRecord` rows older than `retention_days`
    ///. Not test-clock scoped: webhook log retention is a
    /// storage concern independent of simulated time.
    pub async fn cleanup_webhook_logs(&self, retention_days: i64) -> SchedulerResult<JobRun> {
        self.run_job(JobName::CleanupWebhookLogs, None, self.cleanup_webhook_logs_body(retention_days))
            .await
    }

    // ---- simulation_step ------------------------------------------------

    /// When a test clock advances, runs the billing pipeline (cycle
    /// close through dunning) bounded to that clock's scope in one shot
    ///. `evaluate_slas` and `aggregate_performance` are
    /// scheduled independently since they aren't part of the billing
    /// pipeline proper.
    pub async fn simulation_step(&self, test_clock_id: i64) -> SchedulerResult<JobRun> {
        let scope = Some(test_clock_id);
        self.run_job(JobName::SimulationStep, scope, async {
            let mut processed = 0i64;
            let mut error: Option<String> = None;
            for (p, e) in [
                self.close_cycles_body(scope).await,
                self.rate_cycles_body(scope).await,
                self.generate_invoices_body(scope).await,
                self.auto_charge_retry_body(scope).await,
                self.dunning_body(scope).await,
            ] {
                processed += p;
                if error.is_none() {
                    error = e;
                }
            }
            (processed, error)
        })
        .await
    }
}

/// Computes the next eligible retry instant from the invoice's recorded
/// attempt count and last-attempt timestamp, doubling the base backoff
/// per attempt and capping at `AUTO_CHARGE_BACKOFF_CAP_HOURS`.
fn due_for_retry(metadata: &HashMap<String, serde_json::Value>, now: DateTime<Utc>) -> bool {
    let attempts = metadata.get("auto_charge_attempt_count").and_then(|v| v.as_i64()).unwrap_or(0);
    let attempted_at = metadata
        .get("auto_charge_attempted_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let Some(attempted_at) = attempted_at else {
        return true;
    };
    let backoff_minutes = AUTO_CHARGE_BACKOFF_BASE_MINUTES
        .saturating_mul(1i64 << attempts.min(16))
        .min(AUTO_CHARGE_BACKOFF_CAP_HOURS * 60);
    now >= attempted_at + Duration::minutes(backoff_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_catalog::{BillingInterval, BillingMode, CatalogService, InMemoryCatalogStore, PricingModel};
    use billing_core::{ActorType, Currency};
    use billing_cycles::InMemoryCycleStore;
    use billing_invoicing::{InMemoryInvoiceStore, NoTaxCalculator};
    use billing_ledger::InMemoryLedgerStore;
    use billing_ops::InMemoryOpsStore;
    use billing_payments::{InMemoryPaymentStore, ProviderRegistry};
    use billing_rating::InMemoryRatingStore;
    use billing_subscriptions::{BillingCycleType, InMemorySubscriptionStore, SubscriptionItemInput};
    use billing_tenancy::InMemoryTenancyStore;
    use billing_usage::InMemoryUsageStore;

    fn ctx(org_id: i64) -> RequestContext {
        RequestContext::new(org_id, ActorType::System)
    }

    async fn harness() -> (SchedulerService, RequestContext, i64) {
        let clock = Arc::new(Clock::default());
        let tenancy = Arc::new(TenancyService::new(InMemoryTenancyStore::new()));
        let catalog = Arc::new(CatalogService::new(InMemoryCatalogStore::new()));
        let subscriptions =
            Arc::new(SubscriptionService::new(InMemorySubscriptionStore::new(), catalog.clone(), tenancy.clone()));
        let cycles = Arc::new(CycleService::new(InMemoryCycleStore::new(), clock.clone()));
        let usage: Arc<dyn billing_usage::UsageStore> = InMemoryUsageStore::new();
        let rating_store: Arc<dyn billing_rating::RatingStore> = InMemoryRatingStore::new();
        let rating = Arc::new(RatingService::new(
            rating_store.clone(),
            catalog.clone(),
            subscriptions.clone(),
            cycles.clone(),
            usage,
        ));
        let ledger = Arc::new(LedgerService::new(InMemoryLedgerStore::new(), clock.clone()));
        let invoices = Arc::new(InvoiceService::new(
            InMemoryInvoiceStore::new(),
            cycles.clone(),
            rating_store,
            subscriptions.clone(),
            Arc::new(NoTaxCalculator),
            clock.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            InMemoryPaymentStore::new(),
            Arc::new(ProviderRegistry::new()),
            invoices.clone(),
            ledger.clone(),
        ));
        let ops = Arc::new(OpsService::new(InMemoryOpsStore::new(), clock.clone()));
        let job_runs = crate::store::InMemoryJobRunStore::new();

        let org = tenancy.create_organization("acme".into(), Currency::usd()).await;
        let ctx = ctx(org.id);
        let customer = tenancy.create_customer(&ctx, "cust".into(), None, None).await;
        let product = catalog.create_product(&ctx, "pro".into(), Default::default()).await.unwrap();
        let price = catalog
            .create_price(
                &ctx,
                product.id,
                "flat".into(),
                PricingModel::Flat,
                BillingMode::Licensed,
                BillingInterval::Month,
                1,
                vec![],
            )
            .await
            .unwrap();
        let t0 = Utc::now() - chrono::Duration::days(32);
        catalog
            .create_price_amount(&ctx, price.id, Currency::usd(), 500, None, None, None, t0 - chrono::Duration::days(1), None)
            .await
            .unwrap();
        let sub = subscriptions
            .create(
                &ctx,
                customer.id,
                CollectionMode::SendInvoice,
                Some(BillingCycleType::Monthly),
                None,
                vec![SubscriptionItemInput { price_id: price.id, quantity: 1, billing_threshold: None }],
                None,
            )
            .await
            .unwrap();
        subscriptions.activate(&ctx, sub.id).await.unwrap();
        cycles.open_initial_cycle(&ctx, sub.id, BillingCycleType::Monthly, t0).await;

        let scheduler = SchedulerService::new(
            tenancy, subscriptions, cycles, rating, ledger, invoices, payments, ops, clock, job_runs,
        );
        (scheduler, ctx, org.id)
    }

    #[tokio::test]
    async fn pipeline_closes_rates_and_invoices_a_due_cycle() {
        let _ = IdMinter::install(1);
        let (scheduler, _ctx, _org_id) = harness().await;

        let close_run = scheduler.close_cycles(None).await.unwrap();
        assert_eq!(close_run.processed_count, 1);
        assert!(close_run.error.is_none());

        let rate_run = scheduler.rate_cycles(None).await.unwrap();
        assert_eq!(rate_run.processed_count, 1);

        let invoice_run = scheduler.generate_invoices(None).await.unwrap();
        assert_eq!(invoice_run.processed_count, 1);

        // Idempotent: a second pass over the same state finds nothing new.
        let again = scheduler.generate_invoices(None).await.unwrap();
        assert_eq!(again.processed_count, 0);
    }

    #[tokio::test]
    async fn concurrent_runs_of_the_same_job_are_serialized() {
        let _ = IdMinter::install(2);
        let (scheduler, _ctx, _org_id) = harness().await;
        let scheduler = Arc::new(scheduler);

        let a = scheduler.clone();
        let b = scheduler.clone();
        let (ra, rb) = tokio::join!(
            async move { a.run_job(JobName::CloseCycles, None, slow_noop()).await },
            async move { b.run_job(JobName::CloseCycles, None, slow_noop()).await },
        );
        let outcomes = [ra, rb];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|r| matches!(r, Err(SchedulerError::AlreadyRunning(_)))));
    }

    async fn slow_noop() -> (i64, Option<String>) {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        (0, None)
    }

    #[tokio::test]
    async fn ops_jobs_run_cleanly_with_no_assignments() {
        let _ = IdMinter::install(3);
        let (scheduler, _ctx, _org_id) = harness().await;

        let sla_run = scheduler.evaluate_slas().await.unwrap();
        assert_eq!(sla_run.processed_count, 0);
        assert!(sla_run.error.is_none());

        let perf_run = scheduler.aggregate_performance().await.unwrap();
        assert_eq!(perf_run.processed_count, 0);
    }
}
