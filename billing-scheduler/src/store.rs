//! Job run storage: an observability log of every job execution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::types::{JobName, JobRun};

#[async_trait]
pub trait JobRunStore: Send + Sync {
    async fn insert(&self, run: JobRun);
    async fn finish(&self, id: i64, finished_at: DateTime<Utc>, processed_count: i64, error: Option<String>);
    async fn get(&self, id: i64) -> Option<JobRun>;
    async fn most_recent(&self, job_name: JobName, test_clock_id: Option<i64>) -> Option<JobRun>;
}

#[derive(Default)]
pub struct InMemoryJobRunStore {
    runs: RwLock<HashMap<i64, JobRun>>,
}

impl InMemoryJobRunStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl JobRunStore for InMemoryJobRunStore {
    async fn insert(&self, run: JobRun) {
        self.runs.write().await.insert(run.id, run);
    }

    async fn finish(&self, id: i64, finished_at: DateTime<Utc>, processed_count: i64, error: Option<String>) {
        if let Some(run) = self.runs.write().await.get_mut(&id) {
            run.finished_at = Some(finished_at);
            run.processed_count = processed_count;
            run.error = error;
        }
    }

    async fn get(&self, id: i64) -> Option<JobRun> {
        self.runs.read().await.get(&id).cloned()
    }

    async fn most_recent(&self, job_name: JobName, test_clock_id: Option<i64>) -> Option<JobRun> {
        self.runs
            .read()
            .await
            .values()
            .filter(|r| r.job_name == job_name && r.test_clock_id == test_clock_id)
            .max_by_key(|r| r.started_at)
            .cloned()
    }
}

/// `sqlx`/Postgres-backed job run log: this is the durable
/// observability trail an operator queries to see what the scheduler
/// has done, independent of the in-process advisory lock that actually
/// serializes concurrent runs.
pub struct PostgresJobRunStore {
    pool: PgPool,
}

impl PostgresJobRunStore {
    pub async fn connect(database_url: &str) -> Result<Arc<Self>, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Self::initialize_schema(&pool).await?;
        Ok(Arc::new(Self { pool }))
    }

    async fn initialize_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduler_job_runs (
                id BIGINT PRIMARY KEY,
                job_name VARCHAR NOT NULL,
                test_clock_id BIGINT,
                started_at TIMESTAMPTZ NOT NULL,
                finished_at TIMESTAMPTZ,
                processed_count BIGINT NOT NULL DEFAULT 0,
                error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_scheduler_job_runs_name_clock
                ON scheduler_job_runs(job_name, test_clock_id, started_at DESC);
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct JobRunRow {
    id: i64,
    job_name: String,
    test_clock_id: Option<i64>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    processed_count: i64,
    error: Option<String>,
}

fn job_name_str(name: JobName) -> &'static str {
    name.as_str()
}

fn job_name_from_str(s: &str) -> JobName {
    JobName::ALL
        .into_iter()
        .find(|n| n.as_str() == s)
        .unwrap_or(JobName::SimulationStep)
}

impl JobRunRow {
    fn into_job_run(self) -> JobRun {
        JobRun {
            id: self.id,
            job_name: job_name_from_str(&self.job_name),
            test_clock_id: self.test_clock_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            processed_count: self.processed_count,
            error: self.error,
        }
    }
}

#[async_trait]
impl JobRunStore for PostgresJobRunStore {
    async fn insert(&self, run: JobRun) {
        let _ = sqlx::query(
            r#"
            INSERT INTO scheduler_job_runs
                (id, job_name, test_clock_id, started_at, finished_at, processed_count, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                finished_at = EXCLUDED.finished_at,
                processed_count = EXCLUDED.processed_count,
                error = EXCLUDED.error
            "#,
        )
        .bind(run.id)
        .bind(job_name_str(run.job_name))
        .bind(run.test_clock_id)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.processed_count)
        .bind(&run.error)
        .execute(&self.pool)
        .await;
    }

    async fn finish(&self, id: i64, finished_at: DateTime<Utc>, processed_count: i64, error: Option<String>) {
        let _ = sqlx::query(
            "UPDATE scheduler_job_runs SET finished_at = $2, processed_count = $3, error = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(finished_at)
        .bind(processed_count)
        .bind(&error)
        .execute(&self.pool)
        .await;
    }

    async fn get(&self, id: i64) -> Option<JobRun> {
        sqlx::query_as::<_, JobRunRow>("SELECT * FROM scheduler_job_runs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .map(JobRunRow::into_job_run)
    }

    async fn most_recent(&self, job_name: JobName, test_clock_id: Option<i64>) -> Option<JobRun> {
        sqlx::query_as::<_, JobRunRow>(
            r#"
            SELECT * FROM scheduler_job_runs
            WHERE job_name = $1 AND test_clock_id IS NOT DISTINCT FROM $2
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(job_name_str(job_name))
        .bind(test_clock_id)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()
        .map(JobRunRow::into_job_run)
    }
}
