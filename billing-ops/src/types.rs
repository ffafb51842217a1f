//! Collections workflow entities ("BillingAssignment /
//! BillingAction / FinOpsSnapshot").

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentStatus {
    Open,
    InProgress,
    Resolved,
    Escalated,
}

/// One outstanding-invoice follow-up handed to a collections operator.
/// `sla_due_at` is the deadline for a first response; past it with no
/// response, or past `idle_threshold` since the last activity, the
/// `evaluate_slas` job escalates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingAssignment {
    pub id: i64,
    pub org_id: i64,
    pub invoice_id: i64,
    pub operator_id: Option<i64>,
    pub status: AssignmentStatus,
    pub opened_at: DateTime<Utc>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub sla_due_at: DateTime<Utc>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    Assigned,
    Note,
    Escalated,
    Resolved,
}

/// An append-only entry in an assignment's follow-up history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingAction {
    pub id: i64,
    pub org_id: i64,
    pub assignment_id: i64,
    pub actor_id: Option<i64>,
    pub action_type: ActionType,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One operator's daily collections performance, produced by
/// `aggregate_performance` from the day's [`BillingAction`] rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinOpsSnapshot {
    pub id: i64,
    pub org_id: i64,
    pub operator_id: i64,
    pub snapshot_date: NaiveDate,
    pub assignments_opened: i64,
    pub assignments_resolved: i64,
    pub assignments_escalated: i64,
    pub avg_first_response_minutes: Option<f64>,
    pub avg_resolution_minutes: Option<f64>,
}
