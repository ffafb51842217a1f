//! Collections workflow service: assignment lifecycle, SLA escalation,
//! and daily per-operator performance rollups (`evaluate_slas`
//! / `aggregate_performance`).

use std::sync::Arc;

use billing_core::{Clock, IdMinter, RequestContext};
use chrono::{Duration, NaiveDate};

use crate::errors::{OpsError, OpsResult};
use crate::store::OpsStore;
use crate::types::{ActionType, AssignmentStatus, BillingAction, BillingAssignment, FinOpsSnapshot};

pub struct OpsService {
    store: Arc<dyn OpsStore>,
    clock: Arc<Clock>,
}

impl OpsService {
    pub fn new(store: Arc<dyn OpsStore>, clock: Arc<Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn get(&self, ctx: &RequestContext, id: i64) -> OpsResult<BillingAssignment> {
        self.store.get_assignment(ctx.org_id, id).await.ok_or(OpsError::AssignmentNotFound(id))
    }

    /// Opens a follow-up assignment for an overdue invoice, due for a
    /// first response by `sla_due_at`. Idempotent per invoice: a second
    /// call for an invoice that already has an open assignment returns
    /// the existing one.
    pub async fn open_assignment(
        &self,
        ctx: &RequestContext,
        invoice_id: i64,
        operator_id: Option<i64>,
        sla_due_at: chrono::DateTime<chrono::Utc>,
    ) -> BillingAssignment {
        if let Some(existing) = self.store.assignment_for_invoice(ctx.org_id, invoice_id).await {
            return existing;
        }
        let now = self.clock.now(ctx);
        let assignment = BillingAssignment {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            invoice_id,
            operator_id,
            status: AssignmentStatus::Open,
            opened_at: now,
            first_response_at: None,
            last_activity_at: now,
            sla_due_at,
            escalated_at: None,
            resolved_at: None,
        };
        self.store.insert_assignment(assignment.clone()).await;
        if operator_id.is_some() {
            self.record_action(ctx, assignment.id, operator_id, ActionType::Assigned, None).await;
        }
        assignment
    }

    /// Attributed to `operator_id` (the assignment's responsible
    /// operator), not `ctx.actor_id` (whoever issued the call) — a
    /// manager acting on an operator's behalf shouldn't shift that
    /// operator's `FinOpsSnapshot` numbers, and the scheduler's own
    /// `ctx` never carries an actor at all.
    async fn record_action(
        &self,
        ctx: &RequestContext,
        assignment_id: i64,
        operator_id: Option<i64>,
        action_type: ActionType,
        detail: Option<String>,
    ) {
        let action = BillingAction {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            assignment_id,
            actor_id: operator_id,
            action_type,
            detail,
            created_at: self.clock.now(ctx),
        };
        self.store.insert_action(action).await;
    }

    /// Logs operator activity on an assignment: the first call after
    /// opening sets `first_response_at`; every call bumps
    /// `last_activity_at` and moves OPEN assignments to IN_PROGRESS.
    pub async fn record_response(
        &self,
        ctx: &RequestContext,
        assignment_id: i64,
        note: Option<String>,
    ) -> OpsResult<BillingAssignment> {
        let mut assignment = self.get(ctx, assignment_id).await?;
        let now = self.clock.now(ctx);
        if assignment.first_response_at.is_none() {
            assignment.first_response_at = Some(now);
        }
        assignment.last_activity_at = now;
        if assignment.status == AssignmentStatus::Open {
            assignment.status = AssignmentStatus::InProgress;
        }
        self.store.insert_assignment(assignment.clone()).await;
        self.record_action(ctx, assignment_id, assignment.operator_id, ActionType::Note, note).await;
        Ok(assignment)
    }

    pub async fn resolve(&self, ctx: &RequestContext, assignment_id: i64) -> OpsResult<BillingAssignment> {
        let mut assignment = self.get(ctx, assignment_id).await?;
        if assignment.status == AssignmentStatus::Resolved {
            return Err(OpsError::AlreadyResolved(assignment_id));
        }
        let now = self.clock.now(ctx);
        assignment.status = AssignmentStatus::Resolved;
        assignment.resolved_at = Some(now);
        assignment.last_activity_at = now;
        self.store.insert_assignment(assignment.clone()).await;
        self.record_action(ctx, assignment_id, assignment.operator_id, ActionType::Resolved, None).await;
        Ok(assignment)
    }

    async fn escalate(
        &self,
        ctx: &RequestContext,
        assignment: &mut BillingAssignment,
        reason: &str,
    ) {
        let now = self.clock.now(ctx);
        assignment.status = AssignmentStatus::Escalated;
        assignment.escalated_at = Some(now);
        self.store.insert_assignment(assignment.clone()).await;
        self.record_action(ctx, assignment.id, assignment.operator_id, ActionType::Escalated, Some(reason.to_string()))
            .await;
    }

    /// Scans OPEN/IN_PROGRESS assignments for this org and escalates any
    /// that have gone idle longer than `idle_threshold` or never
    /// received a first response within `initial_response_threshold` of
    /// `sla_due_at` ("escalate on idle or initial-response
    /// breach"). Returns the assignments escalated this run.
    pub async fn evaluate_slas(
        &self,
        ctx: &RequestContext,
        idle_threshold: Duration,
        initial_response_grace: Duration,
    ) -> Vec<BillingAssignment> {
        let now = self.clock.now(ctx);
        let mut escalated = Vec::new();
        for mut assignment in self.store.open_assignments(ctx.org_id).await {
            let idle_for = now - assignment.last_activity_at;
            let missed_first_response =
                assignment.first_response_at.is_none() && now > assignment.sla_due_at + initial_response_grace;
            if idle_for > idle_threshold || missed_first_response {
                let reason = if missed_first_response { "initial_response_breach" } else { "idle_timeout" };
                self.escalate(ctx, &mut assignment, reason).await;
                escalated.push(assignment);
            }
        }
        escalated
    }

    /// Rolls up `date`'s [`BillingAction`] rows into one [`FinOpsSnapshot`]
    /// per operator.
    pub async fn aggregate_performance(&self, ctx: &RequestContext, date: NaiveDate) -> Vec<FinOpsSnapshot> {
        let actions = self.store.actions_on(ctx.org_id, date).await;

        let mut by_operator: std::collections::HashMap<i64, Vec<&BillingAction>> =
            std::collections::HashMap::new();
        for action in &actions {
            if let Some(actor_id) = action.actor_id {
                by_operator.entry(actor_id).or_default().push(action);
            }
        }

        let mut snapshots = Vec::with_capacity(by_operator.len());
        for (operator_id, ops_for_operator) in by_operator {
            let opened = ops_for_operator.iter().filter(|a| a.action_type == ActionType::Assigned).count() as i64;
            let resolved =
                ops_for_operator.iter().filter(|a| a.action_type == ActionType::Resolved).count() as i64;
            let escalated =
                ops_for_operator.iter().filter(|a| a.action_type == ActionType::Escalated).count() as i64;

            let snapshot = FinOpsSnapshot {
                id: IdMinter::global().next_id(),
                org_id: ctx.org_id,
                operator_id,
                snapshot_date: date,
                assignments_opened: opened,
                assignments_resolved: resolved,
                assignments_escalated: escalated,
                avg_first_response_minutes: None,
                avg_resolution_minutes: None,
            };
            self.store.insert_snapshot(snapshot.clone()).await;
            snapshots.push(snapshot);
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::ActorType;

    fn ctx(org_id: i64) -> RequestContext {
        RequestContext::new(org_id, ActorType::System)
    }

    #[tokio::test]
    async fn idle_assignment_gets_escalated() {
        let _ = IdMinter::install(1);
        let store = crate::store::InMemoryOpsStore::new();
        let clock = Arc::new(Clock::default());
        let svc = OpsService::new(store, clock);
        let ctx = ctx(1);

        let now = chrono::Utc::now();
        let assignment = svc
            .open_assignment(&ctx, 42, Some(7), now - Duration::days(2))
            .await;
        assert_eq!(assignment.status, AssignmentStatus::Open);

        let escalated = svc
            .evaluate_slas(&ctx, Duration::hours(1), Duration::hours(1))
            .await;
        assert_eq!(escalated.len(), 1);
        assert_eq!(escalated[0].status, AssignmentStatus::Escalated);
    }

    #[tokio::test]
    async fn responsive_assignment_is_not_escalated() {
        let _ = IdMinter::install(2);
        let store = crate::store::InMemoryOpsStore::new();
        let clock = Arc::new(Clock::default());
        let svc = OpsService::new(store, clock);
        let ctx = ctx(1);

        let now = chrono::Utc::now();
        let assignment = svc.open_assignment(&ctx, 42, Some(7), now + Duration::days(1)).await;
        svc.record_response(&ctx, assignment.id, Some("called customer".into())).await.unwrap();

        let escalated = svc.evaluate_slas(&ctx, Duration::hours(1), Duration::hours(1)).await;
        assert!(escalated.is_empty());
    }

    #[tokio::test]
    async fn aggregate_performance_counts_actions_per_operator() {
        let _ = IdMinter::install(3);
        let store = crate::store::InMemoryOpsStore::new();
        let clock = Arc::new(Clock::default());
        let svc = OpsService::new(store, clock);
        let ctx = ctx(1).with_actor(7);

        let assignment = svc.open_assignment(&ctx, 42, Some(7), chrono::Utc::now()).await;
        svc.resolve(&ctx, assignment.id).await.unwrap();

        let today = chrono::Utc::now().date_naive();
        let snapshots = svc.aggregate_performance(&ctx, today).await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].operator_id, 7);
        assert_eq!(snapshots[0].assignments_opened, 1);
        assert_eq!(snapshots[0].assignments_resolved, 1);
    }
}
