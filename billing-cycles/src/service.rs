use std::sync::Arc;

use billing_core::{Clock, IdMinter, RequestContext};
use billing_subscriptions::BillingCycleType;
use chrono::{DateTime, Utc};

use crate::errors::{CycleError, CycleResult};
use crate::store::CycleStore;
use crate::types::{BillingCycle, CycleStatus};

pub struct CycleService {
    store: Arc<dyn CycleStore>,
    clock: Arc<Clock>,
}

impl CycleService {
    pub fn new(store: Arc<dyn CycleStore>, clock: Arc<Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn get(&self, ctx: &RequestContext, id: i64) -> CycleResult<BillingCycle> {
        self.store.get(ctx.org_id, id).await.ok_or(CycleError::CycleNotFound(id))
    }

    pub async fn has_open_cycle(&self, subscription_id: i64) -> bool {
        self.store.has_open_cycle(subscription_id).await
    }

    /// Opens the first cycle for a subscription, e.g. right after
    /// activation.
    pub async fn open_initial_cycle(
        &self,
        ctx: &RequestContext,
        subscription_id: i64,
        interval: BillingCycleType,
        period_start: DateTime<Utc>,
    ) -> BillingCycle {
        let period_end = interval.next_period_end(period_start);
        let cycle = BillingCycle {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            subscription_id,
            test_clock_id: ctx.test_clock_id,
            period_start,
            period_end,
            status: CycleStatus::Open,
            rating_completed_at: None,
            closed_at: None,
            last_error: None,
        };
        self.store.insert(cycle.clone()).await;
        cycle
    }

    /// All OPEN cycles whose `period_end` has passed as of `ctx`'s clock
    /// reading, across every org (the scheduler fans this out per org).
    /// Scoped to `ctx.test_clock_id`: production and test-clock cycles
    /// never appear in the same result set.
    pub async fn due_for_close(&self, ctx: &RequestContext) -> Vec<BillingCycle> {
        let now = self.clock.now(ctx);
        self.store.due_for_close(now, ctx.test_clock_id).await
    }

    /// Transitions an OPEN cycle to CLOSING and opens the next cycle
    /// immediately; CLOSING means "owned by the rater", no further usage
    /// accrues to it.
    pub async fn close_and_reopen(
        &self,
        ctx: &RequestContext,
        cycle: &BillingCycle,
        interval: BillingCycleType,
    ) -> CycleResult<(BillingCycle, BillingCycle)> {
        let mut closing = cycle.clone();
        closing.status = CycleStatus::Closing;
        self.store.insert(closing.clone()).await;

        let next = self
            .open_initial_cycle(ctx, cycle.subscription_id, interval, cycle.period_end)
            .await;
        Ok((closing, next))
    }

    /// Marks a CLOSING cycle CLOSED once its invoice has been generated
    ///.
    pub async fn mark_closed(&self, ctx: &RequestContext, cycle_id: i64) -> CycleResult<BillingCycle> {
        let mut cycle = self.get(ctx, cycle_id).await?;
        if cycle.status != CycleStatus::Closing {
            return Err(CycleError::NotClosing(cycle_id));
        }
        cycle.status = CycleStatus::Closed;
        cycle.closed_at = Some(self.clock.now(ctx));
        self.store.insert(cycle.clone()).await;
        Ok(cycle)
    }

    pub async fn mark_rated(&self, ctx: &RequestContext, cycle_id: i64) -> CycleResult<BillingCycle> {
        let mut cycle = self.get(ctx, cycle_id).await?;
        cycle.rating_completed_at = Some(self.clock.now(ctx));
        self.store.insert(cycle.clone()).await;
        Ok(cycle)
    }

    pub async fn closing_cycles(&self, ctx: &RequestContext) -> Vec<BillingCycle> {
        self.store.closing_cycles(ctx.org_id).await
    }

    /// CLOSED cycles in this org, used by `generate_invoices` to find
    /// cycles that may still be lacking an invoice.
    pub async fn closed_cycles(&self, ctx: &RequestContext) -> Vec<BillingCycle> {
        self.store.closed_cycles(ctx.org_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::ActorType;

    fn ctx() -> RequestContext {
        RequestContext::new(1, ActorType::System)
    }

    #[tokio::test]
    async fn close_and_reopen_keeps_exactly_one_open_cycle() {
        let _ = IdMinter::install(1);
        let store = crate::store::InMemoryCycleStore::new();
        let clock = Arc::new(Clock::default());
        let svc = CycleService::new(store, clock);
        let ctx = ctx();

        let t0 = Utc::now();
        let first = svc.open_initial_cycle(&ctx, 42, BillingCycleType::Monthly, t0).await;
        assert_eq!(first.status, CycleStatus::Open);

        let (closed, next) = svc
            .close_and_reopen(&ctx, &first, BillingCycleType::Monthly)
            .await
            .unwrap();
        assert_eq!(closed.status, CycleStatus::Closing);
        assert_eq!(next.status, CycleStatus::Open);
        assert_eq!(next.period_start, first.period_end);
        assert!(svc.has_open_cycle(42).await);
    }

    #[tokio::test]
    async fn mark_closed_requires_closing_status() {
        let _ = IdMinter::install(2);
        let store = crate::store::InMemoryCycleStore::new();
        let clock = Arc::new(Clock::default());
        let svc = CycleService::new(store, clock);
        let ctx = ctx();

        let cycle = svc.open_initial_cycle(&ctx, 1, BillingCycleType::Monthly, Utc::now()).await;
        let err = svc.mark_closed(&ctx, cycle.id).await.unwrap_err();
        assert!(matches!(err, CycleError::NotClosing(_)));
    }
}
