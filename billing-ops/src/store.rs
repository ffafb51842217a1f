//! In-memory collections workflow store. Unlike invoices, ledger
//! entries, and webhook records this state isn't append-only financial
//! history, so there's
//! no `Postgres*` counterpart here, matching the treatment of
//! `billing-subscriptions`/`billing-catalog`/`billing-tenancy`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::types::{AssignmentStatus, BillingAction, BillingAssignment, FinOpsSnapshot};

#[async_trait]
pub trait OpsStore: Send + Sync {
    async fn insert_assignment(&self, assignment: BillingAssignment);
    async fn get_assignment(&self, org_id: i64, id: i64) -> Option<BillingAssignment>;
    async fn assignment_for_invoice(&self, org_id: i64, invoice_id: i64) -> Option<BillingAssignment>;
    async fn open_assignments(&self, org_id: i64) -> Vec<BillingAssignment>;
    async fn insert_action(&self, action: BillingAction);
    async fn actions_for(&self, assignment_id: i64) -> Vec<BillingAction>;
    async fn actions_on(&self, org_id: i64, date: NaiveDate) -> Vec<BillingAction>;
    async fn insert_snapshot(&self, snapshot: FinOpsSnapshot);
    async fn snapshots_for(&self, org_id: i64, date: NaiveDate) -> Vec<FinOpsSnapshot>;
}

#[derive(Default)]
pub struct InMemoryOpsStore {
    assignments: RwLock<HashMap<i64, BillingAssignment>>,
    actions: RwLock<HashMap<i64, BillingAction>>,
    snapshots: RwLock<HashMap<i64, FinOpsSnapshot>>,
}

impl InMemoryOpsStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl OpsStore for InMemoryOpsStore {
    async fn insert_assignment(&self, assignment: BillingAssignment) {
        self.assignments.write().await.insert(assignment.id, assignment);
    }

    async fn get_assignment(&self, org_id: i64, id: i64) -> Option<BillingAssignment> {
        self.assignments.read().await.get(&id).filter(|a| a.org_id == org_id).cloned()
    }

    async fn assignment_for_invoice(&self, org_id: i64, invoice_id: i64) -> Option<BillingAssignment> {
        self.assignments
            .read()
            .await
            .values()
            .find(|a| a.org_id == org_id && a.invoice_id == invoice_id)
            .cloned()
    }

    async fn open_assignments(&self, org_id: i64) -> Vec<BillingAssignment> {
        self.assignments
            .read()
            .await
            .values()
            .filter(|a| {
                a.org_id == org_id
                    && matches!(a.status, AssignmentStatus::Open | AssignmentStatus::InProgress)
            })
            .cloned()
            .collect()
    }

    async fn insert_action(&self, action: BillingAction) {
        self.actions.write().await.insert(action.id, action);
    }

    async fn actions_for(&self, assignment_id: i64) -> Vec<BillingAction> {
        let mut v: Vec<_> = self
            .actions
            .read()
            .await
            .values()
            .filter(|a| a.assignment_id == assignment_id)
            .cloned()
            .collect();
        v.sort_by_key(|a| a.created_at);
        v
    }

    async fn actions_on(&self, org_id: i64, date: NaiveDate) -> Vec<BillingAction> {
        self.actions
            .read()
            .await
            .values()
            .filter(|a| a.org_id == org_id && a.created_at.date_naive() == date)
            .cloned()
            .collect()
    }

    async fn insert_snapshot(&self, snapshot: FinOpsSnapshot) {
        self.snapshots.write().await.insert(snapshot.id, snapshot);
    }

    async fn snapshots_for(&self, org_id: i64, date: NaiveDate) -> Vec<FinOpsSnapshot> {
        self.snapshots
            .read()
            .await
            .values()
            .filter(|s| s.org_id == org_id && s.snapshot_date == date)
            .cloned()
            .collect()
    }
}
