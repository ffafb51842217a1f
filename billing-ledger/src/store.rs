//! Ledger storage: accounts are lazily provisioned per `(org_id, code)`;
//! entries are append-only, mirroring the invoice store's dual
//! in-memory/Postgres shape.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::types::{Direction, LedgerAccount, LedgerAccountCode, LedgerEntry, LedgerEntryLine, SourceType};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_or_create_account(&self, org_id: i64, code: LedgerAccountCode) -> LedgerAccount;
    async fn insert_entry(&self, entry: LedgerEntry);
    async fn get_entry(&self, org_id: i64, id: i64) -> Option<LedgerEntry>;
    async fn entries_for_source(&self, source_type: SourceType, source_id: i64) -> Vec<LedgerEntry>;
    async fn entries_for_org(&self, org_id: i64) -> Vec<LedgerEntry>;
}

#[derive(Default)]
pub struct InMemoryLedgerStore {
    accounts: RwLock<HashMap<(i64, LedgerAccountCode), LedgerAccount>>,
    entries: RwLock<HashMap<i64, LedgerEntry>>,
    next_account_id: AtomicI64,
}

impl InMemoryLedgerStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { next_account_id: AtomicI64::new(1), ..Default::default() })
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get_or_create_account(&self, org_id: i64, code: LedgerAccountCode) -> LedgerAccount {
        let key = (org_id, code);
        if let Some(account) = self.accounts.read().await.get(&key) {
            return account.clone();
        }
        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.get(&key) {
            return account.clone();
        }
        let account =
            LedgerAccount { id: self.next_account_id.fetch_add(1, Ordering::SeqCst), org_id, code };
        accounts.insert(key, account.clone());
        account
    }

    async fn insert_entry(&self, entry: LedgerEntry) {
        self.entries.write().await.insert(entry.id, entry);
    }

    async fn get_entry(&self, org_id: i64, id: i64) -> Option<LedgerEntry> {
        self.entries.read().await.get(&id).filter(|e| e.org_id == org_id).cloned()
    }

    async fn entries_for_source(&self, source_type: SourceType, source_id: i64) -> Vec<LedgerEntry> {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.source_type == source_type && e.source_id == source_id)
            .cloned()
            .collect()
    }

    async fn entries_for_org(&self, org_id: i64) -> Vec<LedgerEntry> {
        self.entries.read().await.values().filter(|e| e.org_id == org_id).cloned().collect()
    }
}

/// `sqlx`/Postgres-backed ledger store for the append-only entry
/// aggregate, grounded on the same `CREATE TABLE IF NOT EXISTS` style as
/// `billing-invoicing`'s Postgres store.
pub struct PostgresLedgerStore {
    pool: PgPool,
    next_account_id: AtomicI64,
}

impl PostgresLedgerStore {
    pub async fn connect(database_url: &str) -> Result<Arc<Self>, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Self::initialize_schema(&pool).await?;
        Ok(Arc::new(Self { pool, next_account_id: AtomicI64::new(1) }))
    }

    async fn initialize_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_accounts (
                id BIGINT PRIMARY KEY,
                org_id BIGINT NOT NULL,
                code VARCHAR NOT NULL,
                UNIQUE (org_id, code)
            );

            CREATE TABLE IF NOT EXISTS ledger_entries (
                id BIGINT PRIMARY KEY,
                org_id BIGINT NOT NULL,
                source_type VARCHAR NOT NULL,
                source_id BIGINT NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                currency VARCHAR(3) NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ledger_entries_source
                ON ledger_entries(source_type, source_id);
            CREATE INDEX IF NOT EXISTS idx_ledger_entries_org ON ledger_entries(org_id);

            CREATE TABLE IF NOT EXISTS ledger_entry_lines (
                id BIGSERIAL PRIMARY KEY,
                entry_id BIGINT NOT NULL REFERENCES ledger_entries(id),
                account_id BIGINT NOT NULL REFERENCES ledger_accounts(id),
                direction VARCHAR NOT NULL,
                amount_cents BIGINT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ledger_entry_lines_entry ON ledger_entry_lines(entry_id);
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    fn code_str(code: LedgerAccountCode) -> &'static str {
        use LedgerAccountCode::*;
        match code {
            AccountsReceivable => "AR",
            RevenueUsage => "Revenue.Usage",
            RevenueFlat => "Revenue.Flat",
            Cash => "Cash",
            TaxPayable => "Tax.Payable",
            DisputeReserve => "Dispute.Reserve",
        }
    }

    fn direction_str(direction: Direction) -> &'static str {
        match direction {
            Direction::Debit => "debit",
            Direction::Credit => "credit",
        }
    }

    fn source_type_str(source_type: SourceType) -> &'static str {
        match source_type {
            SourceType::UsageAccrual => "usage_accrual",
            SourceType::Payment => "payment",
            SourceType::Refund => "refund",
            SourceType::DisputeWithdrawn => "dispute_withdrawn",
            SourceType::DisputeReinstated => "dispute_reinstated",
        }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn get_or_create_account(&self, org_id: i64, code: LedgerAccountCode) -> LedgerAccount {
        let code_str = Self::code_str(code);
        if let Some(id) = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM ledger_accounts WHERE org_id = $1 AND code = $2",
        )
        .bind(org_id)
        .bind(code_str)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()
        {
            return LedgerAccount { id, org_id, code };
        }
        let id = self.next_account_id.fetch_add(1, Ordering::SeqCst);
        let _ = sqlx::query(
            "INSERT INTO ledger_accounts (id, org_id, code) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(org_id)
        .bind(code_str)
        .execute(&self.pool)
        .await;
        LedgerAccount { id, org_id, code }
    }

    async fn insert_entry(&self, entry: LedgerEntry) {
        let _ = sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, org_id, source_type, source_id, occurred_at, currency)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(entry.org_id)
        .bind(Self::source_type_str(entry.source_type))
        .bind(entry.source_id)
        .bind(entry.occurred_at)
        .bind(entry.currency.as_str())
        .execute(&self.pool)
        .await;

        for line in &entry.lines {
            let _ = sqlx::query(
                r#"
                INSERT INTO ledger_entry_lines (entry_id, account_id, direction, amount_cents)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(entry.id)
            .bind(line.account_id)
            .bind(Self::direction_str(line.direction))
            .bind(line.amount_cents)
            .execute(&self.pool)
            .await;
        }
    }

    async fn get_entry(&self, org_id: i64, id: i64) -> Option<LedgerEntry> {
        self.entries_for_org(org_id).await.into_iter().find(|e| e.id == id)
    }

    async fn entries_for_source(&self, source_type: SourceType, source_id: i64) -> Vec<LedgerEntry> {
        let headers = sqlx::query_as::<_, EntryHeaderRow>(
            "SELECT * FROM ledger_entries WHERE source_type = $1 AND source_id = $2",
        )
        .bind(Self::source_type_str(source_type))
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default();
        self.hydrate(headers).await
    }

    async fn entries_for_org(&self, org_id: i64) -> Vec<LedgerEntry> {
        let headers = sqlx::query_as::<_, EntryHeaderRow>(
            "SELECT * FROM ledger_entries WHERE org_id = $1",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default();
        self.hydrate(headers).await
    }
}

impl PostgresLedgerStore {
    async fn hydrate(&self, headers: Vec<EntryHeaderRow>) -> Vec<LedgerEntry> {
        let mut out = Vec::with_capacity(headers.len());
        for header in headers {
            let lines = sqlx::query_as::<_, EntryLineRow>(
                "SELECT account_id, direction, amount_cents FROM ledger_entry_lines WHERE entry_id = $1",
            )
            .bind(header.id)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|l| LedgerEntryLine {
                account_id: l.account_id,
                direction: if l.direction == "debit" { Direction::Debit } else { Direction::Credit },
                amount_cents: l.amount_cents,
            })
            .collect();

            out.push(LedgerEntry {
                id: header.id,
                org_id: header.org_id,
                source_type: Self::source_type_from_str(&header.source_type),
                source_id: header.source_id,
                occurred_at: header.occurred_at,
                currency: billing_core::Currency::parse(&header.currency)
                    .unwrap_or_else(|_| billing_core::Currency::usd()),
                lines,
            });
        }
        out
    }

    fn source_type_from_str(s: &str) -> SourceType {
        match s {
            "payment" => SourceType::Payment,
            "refund" => SourceType::Refund,
            "dispute_withdrawn" => SourceType::DisputeWithdrawn,
            "dispute_reinstated" => SourceType::DisputeReinstated,
            _ => SourceType::UsageAccrual,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EntryHeaderRow {
    id: i64,
    org_id: i64,
    source_type: String,
    source_id: i64,
    occurred_at: chrono::DateTime<chrono::Utc>,
    currency: String,
}

#[derive(sqlx::FromRow)]
struct EntryLineRow {
    account_id: i64,
    direction: String,
    amount_cents: i64,
}
