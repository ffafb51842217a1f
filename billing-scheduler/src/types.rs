//! Named jobs and their run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of jobs the scheduler runs. Each name doubles as the
/// advisory-lock key, so exactly one instance of a given job runs at a
/// time per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobName {
    CloseCycles,
    RateCycles,
    GenerateInvoices,
    AutoChargeRetry,
    Dunning,
    EvaluateSlas,
    AggregatePerformance,
    CleanupWebhookLogs,
    SimulationStep,
}

impl JobName {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::CloseCycles => "close_cycles",
            JobName::RateCycles => "rate_cycles",
            JobName::GenerateInvoices => "generate_invoices",
            JobName::AutoChargeRetry => "auto_charge_retry",
            JobName::Dunning => "dunning",
            JobName::EvaluateSlas => "evaluate_slas",
            JobName::AggregatePerformance => "aggregate_performance",
            JobName::CleanupWebhookLogs => "cleanup_webhook_logs",
            JobName::SimulationStep => "simulation_step",
        }
    }

    pub const ALL: [JobName; 9] = [
        JobName::CloseCycles,
        JobName::RateCycles,
        JobName::GenerateInvoices,
        JobName::AutoChargeRetry,
        JobName::Dunning,
        JobName::EvaluateSlas,
        JobName::AggregatePerformance,
        JobName::CleanupWebhookLogs,
        JobName::SimulationStep,
    ];
}

/// One execution of a named job; doubles as the observability record and
/// the row a Postgres-backed store would take an advisory lock against.
/// `test_clock_id` scopes the run to a single simulated-time universe;
/// production runs always carry `None` and never share rows with a
/// test-clock run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: i64,
    pub job_name: JobName,
    pub test_clock_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub processed_count: i64,
    pub error: Option<String>,
}

impl JobRun {
    pub fn started(id: i64, job_name: JobName, test_clock_id: Option<i64>, at: DateTime<Utc>) -> Self {
        Self {
            id,
            job_name,
            test_clock_id,
            started_at: at,
            finished_at: None,
            processed_count: 0,
            error: None,
        }
    }
}
