//! Payment storage. Payment methods and checkout sessions are ordinary
//! mutable rows; `PaymentEventRecord`s are append-only and deduplicated
//! first-writer-wins on `(provider, provider_event_id)`, mirroring the
//! idempotency-key reservation pattern used across the other crates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::provider::ProviderConfig;
use crate::types::{CheckoutSession, PaymentEventRecord, PaymentMethod};

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment_method(&self, method: PaymentMethod);
    async fn get_payment_method(&self, org_id: i64, id: i64) -> Option<PaymentMethod>;
    async fn default_payment_method(&self, customer_id: i64) -> Option<PaymentMethod>;
    async fn payment_methods_for_customer(&self, customer_id: i64) -> Vec<PaymentMethod>;
    async fn unset_default_for_customer(&self, customer_id: i64);

    /// First-writer-wins reservation keyed on `(provider,
    /// provider_event_id)`; returns the id of the row that now owns the
    /// key, which is `record.id` only if this call was the writer.
    async fn reserve_event(&self, record: PaymentEventRecord) -> i64;
    async fn mark_event_processed(&self, id: i64, processed_at: chrono::DateTime<chrono::Utc>);
    async fn get_event(&self, org_id: i64, id: i64) -> Option<PaymentEventRecord>;
    async fn events_older_than(&self, at: chrono::DateTime<chrono::Utc>) -> Vec<PaymentEventRecord>;
    async fn delete_event(&self, id: i64);

    async fn insert_checkout_session(&self, session: CheckoutSession);
    async fn get_checkout_session(&self, org_id: i64, id: i64) -> Option<CheckoutSession>;

    /// Active provider configs for `provider`, across every org, used by
    /// webhook ingest to discover which org an event belongs to (spec
    /// §4.K step 2).
    async fn active_configs_for_provider(&self, provider: &str) -> Vec<ProviderConfig>;
    async fn upsert_provider_config(&self, config: ProviderConfig);
}

#[derive(Default)]
pub struct InMemoryPaymentStore {
    payment_methods: RwLock<HashMap<i64, PaymentMethod>>,
    events_by_id: RwLock<HashMap<i64, PaymentEventRecord>>,
    event_keys: RwLock<HashMap<(String, String), i64>>,
    checkout_sessions: RwLock<HashMap<i64, CheckoutSession>>,
    provider_configs: RwLock<Vec<ProviderConfig>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_payment_method(&self, method: PaymentMethod) {
        self.payment_methods.write().await.insert(method.id, method);
    }

    async fn get_payment_method(&self, org_id: i64, id: i64) -> Option<PaymentMethod> {
        self.payment_methods.read().await.get(&id).filter(|m| m.org_id == org_id).cloned()
    }

    async fn default_payment_method(&self, customer_id: i64) -> Option<PaymentMethod> {
        self.payment_methods
            .read()
            .await
            .values()
            .find(|m| m.customer_id == customer_id && m.is_default)
            .cloned()
    }

    async fn payment_methods_for_customer(&self, customer_id: i64) -> Vec<PaymentMethod> {
        self.payment_methods
            .read()
            .await
            .values()
            .filter(|m| m.customer_id == customer_id)
            .cloned()
            .collect()
    }

    async fn unset_default_for_customer(&self, customer_id: i64) {
        let mut methods = self.payment_methods.write().await;
        for method in methods.values_mut() {
            if method.customer_id == customer_id {
                method.is_default = false;
            }
        }
    }

    async fn reserve_event(&self, record: PaymentEventRecord) -> i64 {
        let key = (record.provider.clone(), record.provider_event_id.clone());
        let mut keys = self.event_keys.write().await;
        if let Some(&existing) = keys.get(&key) {
            return existing;
        }
        let id = record.id;
        keys.insert(key, id);
        self.events_by_id.write().await.insert(id, record);
        id
    }

    async fn mark_event_processed(&self, id: i64, processed_at: chrono::DateTime<chrono::Utc>) {
        if let Some(record) = self.events_by_id.write().await.get_mut(&id) {
            record.processed_at = Some(processed_at);
        }
    }

    async fn get_event(&self, org_id: i64, id: i64) -> Option<PaymentEventRecord> {
        self.events_by_id.read().await.get(&id).filter(|e| e.org_id == org_id).cloned()
    }

    async fn events_older_than(&self, at: chrono::DateTime<chrono::Utc>) -> Vec<PaymentEventRecord> {
        self.events_by_id.read().await.values().filter(|e| e.received_at < at).cloned().collect()
    }

    async fn delete_event(&self, id: i64) {
        let mut events = self.events_by_id.write().await;
        if let Some(record) = events.remove(&id) {
            self.event_keys.write().await.remove(&(record.provider, record.provider_event_id));
        }
    }

    async fn insert_checkout_session(&self, session: CheckoutSession) {
        self.checkout_sessions.write().await.insert(session.id, session);
    }

    async fn get_checkout_session(&self, org_id: i64, id: i64) -> Option<CheckoutSession> {
        self.checkout_sessions.read().await.get(&id).filter(|s| s.org_id == org_id).cloned()
    }

    async fn active_configs_for_provider(&self, provider: &str) -> Vec<ProviderConfig> {
        self.provider_configs
            .read()
            .await
            .iter()
            .filter(|c| c.provider == provider)
            .cloned()
            .collect()
    }

    async fn upsert_provider_config(&self, config: ProviderConfig) {
        let mut configs = self.provider_configs.write().await;
        configs.retain(|c| !(c.org_id == config.org_id && c.provider == config.provider));
        configs.push(config);
    }
}

/// `sqlx`/Postgres-backed store for the append-only `PaymentEventRecord`
/// aggregate. Payment methods, checkout sessions, and provider configs
/// stay in-memory-only for now (spec Non-goals exclude encrypted vault
/// storage); only the webhook dedup ledger needs to survive a restart.
pub struct PostgresPaymentEventStore {
    pool: PgPool,
}

impl PostgresPaymentEventStore {
    pub async fn connect(database_url: &str) -> Result<Arc<Self>, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Self::initialize_schema(&pool).await?;
        Ok(Arc::new(Self { pool }))
    }

    async fn initialize_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS payment_event_records (
                id BIGINT PRIMARY KEY,
                org_id BIGINT NOT NULL,
                provider VARCHAR NOT NULL,
                provider_event_id VARCHAR NOT NULL,
                event_type VARCHAR NOT NULL,
                customer_id BIGINT,
                payload JSONB NOT NULL,
                received_at TIMESTAMPTZ NOT NULL,
                processed_at TIMESTAMPTZ,
                UNIQUE (provider, provider_event_id)
            );
            CREATE INDEX IF NOT EXISTS idx_payment_event_records_received
                ON payment_event_records(received_at);
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Inserts the record if `(provider, provider_event_id)` is unseen;
    /// returns the id of whichever row now owns the key.
    pub async fn reserve_event(&self, record: PaymentEventRecord) -> i64 {
        let event_type = format!("{:?}", record.event_type);
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO payment_event_records
                (id, org_id, provider, provider_event_id, event_type, customer_id, payload, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (provider, provider_event_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(record.id)
        .bind(record.org_id)
        .bind(&record.provider)
        .bind(&record.provider_event_id)
        .bind(&event_type)
        .bind(record.customer_id)
        .bind(&record.payload)
        .bind(record.received_at)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or(None);

        if let Some((id,)) = row {
            return id;
        }
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM payment_event_records WHERE provider = $1 AND provider_event_id = $2",
        )
        .bind(&record.provider)
        .bind(&record.provider_event_id)
        .fetch_one(&self.pool)
        .await
        .unwrap_or(record.id)
    }

    pub async fn delete_older_than(&self, at: chrono::DateTime<chrono::Utc>) -> u64 {
        sqlx::query("DELETE FROM payment_event_records WHERE received_at < $1")
            .bind(at)
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
            .unwrap_or(0)
    }
}
