//! Invoice storage: an in-memory implementation used by default wiring
//! and tests, and a `sqlx`/Postgres-backed implementation for the
//! append-only invoice aggregate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use billing_core::Currency;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::types::{Invoice, InvoiceItem, InvoiceStatus, InvoiceTaxLine};

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn insert(&self, invoice: Invoice);
    async fn get(&self, org_id: i64, id: i64) -> Option<Invoice>;
    async fn for_cycle(&self, billing_cycle_id: i64) -> Option<Invoice>;
    async fn next_invoice_number(&self, org_id: i64) -> i64;

    async fn insert_items(&self, invoice_id: i64, items: Vec<InvoiceItem>);
    async fn items_for(&self, invoice_id: i64) -> Vec<InvoiceItem>;

    async fn insert_tax_lines(&self, invoice_id: i64, lines: Vec<InvoiceTaxLine>);
    async fn tax_lines_for(&self, invoice_id: i64) -> Vec<InvoiceTaxLine>;

    /// Invoices still representing an open financial obligation
    /// (FINALIZED but neither PAID nor VOID) for a subscription.
    async fn unfinalized_for_subscription(&self, subscription_id: i64) -> Vec<Invoice>;

    /// Every FINALIZED-but-unpaid invoice in an org, used by the
    /// `auto_charge_retry` and `dunning` jobs to find outstanding bills.
    async fn finalized_for_org(&self, org_id: i64) -> Vec<Invoice>;
}

#[derive(Default)]
pub struct InMemoryInvoiceStore {
    invoices: RwLock<HashMap<i64, Invoice>>,
    items: RwLock<HashMap<i64, Vec<InvoiceItem>>>,
    tax_lines: RwLock<HashMap<i64, Vec<InvoiceTaxLine>>>,
    invoice_numbers: RwLock<HashMap<i64, i64>>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn insert(&self, invoice: Invoice) {
        self.invoices.write().await.insert(invoice.id, invoice);
    }

    async fn get(&self, org_id: i64, id: i64) -> Option<Invoice> {
        self.invoices
            .read()
            .await
            .get(&id)
            .filter(|i| i.org_id == org_id)
            .cloned()
    }

    async fn for_cycle(&self, billing_cycle_id: i64) -> Option<Invoice> {
        self.invoices
            .read()
            .await
            .values()
            .find(|i| i.billing_cycle_id == billing_cycle_id)
            .cloned()
    }

    async fn next_invoice_number(&self, org_id: i64) -> i64 {
        let mut counters = self.invoice_numbers.write().await;
        let counter = counters.entry(org_id).or_insert(0);
        *counter += 1;
        *counter
    }

    async fn insert_items(&self, invoice_id: i64, items: Vec<InvoiceItem>) {
        self.items.write().await.insert(invoice_id, items);
    }

    async fn items_for(&self, invoice_id: i64) -> Vec<InvoiceItem> {
        self.items.read().await.get(&invoice_id).cloned().unwrap_or_default()
    }

    async fn insert_tax_lines(&self, invoice_id: i64, lines: Vec<InvoiceTaxLine>) {
        self.tax_lines.write().await.insert(invoice_id, lines);
    }

    async fn tax_lines_for(&self, invoice_id: i64) -> Vec<InvoiceTaxLine> {
        self.tax_lines.read().await.get(&invoice_id).cloned().unwrap_or_default()
    }

    async fn unfinalized_for_subscription(&self, subscription_id: i64) -> Vec<Invoice> {
        self.invoices
            .read()
            .await
            .values()
            .filter(|i| i.subscription_id == subscription_id && i.status == InvoiceStatus::Finalized)
            .cloned()
            .collect()
    }

    async fn finalized_for_org(&self, org_id: i64) -> Vec<Invoice> {
        self.invoices
            .read()
            .await
            .values()
            .filter(|i| i.org_id == org_id && i.status == InvoiceStatus::Finalized)
            .cloned()
            .collect()
    }
}

/// `sqlx`/Postgres-backed invoice store, for deployments that need the
/// invoice aggregate's append-only guarantee to survive process
/// restarts. The in-memory store above is the default for tests and
/// single-process wiring.
pub struct PostgresInvoiceStore {
    pool: PgPool,
    next_id: AtomicI64,
}

impl PostgresInvoiceStore {
    pub async fn connect(database_url: &str) -> Result<Arc<Self>, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Self::initialize_schema(&pool).await?;
        Ok(Arc::new(Self { pool, next_id: AtomicI64::new(1) }))
    }

    async fn initialize_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS invoices (
                id BIGINT PRIMARY KEY,
                org_id BIGINT NOT NULL,
                subscription_id BIGINT NOT NULL,
                customer_id BIGINT NOT NULL,
                billing_cycle_id BIGINT NOT NULL,
                invoice_number BIGINT NOT NULL,
                currency VARCHAR(3) NOT NULL,
                status VARCHAR NOT NULL,
                subtotal_amount_cents BIGINT NOT NULL,
                total_amount_cents BIGINT NOT NULL,
                paid_at TIMESTAMPTZ,
                due_at TIMESTAMPTZ,
                metadata JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_invoices_org_number ON invoices(org_id, invoice_number);
            CREATE INDEX IF NOT EXISTS idx_invoices_cycle ON invoices(billing_cycle_id);
            CREATE INDEX IF NOT EXISTS idx_invoices_subscription ON invoices(subscription_id);

            CREATE TABLE IF NOT EXISTS invoice_items (
                id BIGINT PRIMARY KEY,
                invoice_id BIGINT NOT NULL REFERENCES invoices(id),
                rating_result_id BIGINT NOT NULL,
                feature_code VARCHAR NOT NULL,
                meter_id BIGINT,
                quantity BIGINT NOT NULL,
                unit_price_cents BIGINT NOT NULL,
                amount_cents BIGINT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_invoice_items_invoice ON invoice_items(invoice_id);

            CREATE TABLE IF NOT EXISTS invoice_tax_lines (
                id BIGINT PRIMARY KEY,
                invoice_id BIGINT NOT NULL REFERENCES invoices(id),
                jurisdiction VARCHAR NOT NULL,
                tax_code VARCHAR NOT NULL,
                amount_cents BIGINT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_invoice_tax_lines_invoice ON invoice_tax_lines(invoice_id);
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    fn status_str(status: InvoiceStatus) -> &'static str {
        match status {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Finalized => "finalized",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }

    fn status_from_str(s: &str) -> InvoiceStatus {
        match s {
            "finalized" => InvoiceStatus::Finalized,
            "paid" => InvoiceStatus::Paid,
            "void" => InvoiceStatus::Void,
            _ => InvoiceStatus::Draft,
        }
    }
}

#[async_trait]
impl InvoiceStore for PostgresInvoiceStore {
    async fn insert(&self, invoice: Invoice) {
        let metadata = serde_json::to_value(&invoice.metadata).unwrap_or_default();
        let _ = sqlx::query(
            r#"
            INSERT INTO invoices
                (id, org_id, subscription_id, customer_id, billing_cycle_id, invoice_number,
                 currency, status, subtotal_amount_cents, total_amount_cents, paid_at, due_at,
                 metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                total_amount_cents = EXCLUDED.total_amount_cents,
                paid_at = EXCLUDED.paid_at,
                metadata = EXCLUDED.metadata
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.org_id)
        .bind(invoice.subscription_id)
        .bind(invoice.customer_id)
        .bind(invoice.billing_cycle_id)
        .bind(invoice.invoice_number)
        .bind(invoice.currency.as_str())
        .bind(Self::status_str(invoice.status))
        .bind(invoice.subtotal_amount_cents)
        .bind(invoice.total_amount_cents)
        .bind(invoice.paid_at)
        .bind(invoice.due_at)
        .bind(metadata)
        .bind(invoice.created_at)
        .execute(&self.pool)
        .await;
    }

    async fn get(&self, org_id: i64, id: i64) -> Option<Invoice> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            "SELECT * FROM invoices WHERE id = $1 AND org_id = $2",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()?;
        Some(row.into_invoice())
    }

    async fn for_cycle(&self, billing_cycle_id: i64) -> Option<Invoice> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            "SELECT * FROM invoices WHERE billing_cycle_id = $1",
        )
        .bind(billing_cycle_id)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()?;
        Some(row.into_invoice())
    }

    async fn next_invoice_number(&self, org_id: i64) -> i64 {
        let row: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT MAX(invoice_number) FROM invoices WHERE org_id = $1")
                .bind(org_id)
                .fetch_optional(&self.pool)
                .await
                .ok()
                .flatten();
        row.and_then(|(max,)| max).unwrap_or(0) + 1
    }

    async fn insert_items(&self, invoice_id: i64, items: Vec<InvoiceItem>) {
        for item in items {
            let _ = sqlx::query(
                r#"
                INSERT INTO invoice_items
                    (id, invoice_id, rating_result_id, feature_code, meter_id, quantity,
                     unit_price_cents, amount_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(item.id)
            .bind(invoice_id)
            .bind(item.rating_result_id)
            .bind(&item.feature_code)
            .bind(item.meter_id)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.amount_cents)
            .execute(&self.pool)
            .await;
        }
    }

    async fn items_for(&self, invoice_id: i64) -> Vec<InvoiceItem> {
        sqlx::query_as::<_, InvoiceItemRow>("SELECT * FROM invoice_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(InvoiceItemRow::into_item)
            .collect()
    }

    async fn insert_tax_lines(&self, invoice_id: i64, lines: Vec<InvoiceTaxLine>) {
        for line in lines {
            let _ = sqlx::query(
                r#"
                INSERT INTO invoice_tax_lines (id, invoice_id, jurisdiction, tax_code, amount_cents)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(line.id)
            .bind(invoice_id)
            .bind(&line.jurisdiction)
            .bind(&line.tax_code)
            .bind(line.amount_cents)
            .execute(&self.pool)
            .await;
        }
    }

    async fn tax_lines_for(&self, invoice_id: i64) -> Vec<InvoiceTaxLine> {
        sqlx::query_as::<_, InvoiceTaxLineRow>(
            "SELECT * FROM invoice_tax_lines WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(InvoiceTaxLineRow::into_line)
        .collect()
    }

    async fn unfinalized_for_subscription(&self, subscription_id: i64) -> Vec<Invoice> {
        sqlx::query_as::<_, InvoiceRow>(
            "SELECT * FROM invoices WHERE subscription_id = $1 AND status = 'finalized'",
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(InvoiceRow::into_invoice)
        .collect()
    }

    async fn finalized_for_org(&self, org_id: i64) -> Vec<Invoice> {
        sqlx::query_as::<_, InvoiceRow>(
            "SELECT * FROM invoices WHERE org_id = $1 AND status = 'finalized'",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(InvoiceRow::into_invoice)
        .collect()
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: i64,
    org_id: i64,
    subscription_id: i64,
    customer_id: i64,
    billing_cycle_id: i64,
    invoice_number: i64,
    currency: String,
    status: String,
    subtotal_amount_cents: i64,
    total_amount_cents: i64,
    paid_at: Option<chrono::DateTime<chrono::Utc>>,
    due_at: Option<chrono::DateTime<chrono::Utc>>,
    metadata: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl InvoiceRow {
    fn into_invoice(self) -> Invoice {
        Invoice {
            id: self.id,
            org_id: self.org_id,
            subscription_id: self.subscription_id,
            customer_id: self.customer_id,
            billing_cycle_id: self.billing_cycle_id,
            invoice_number: self.invoice_number,
            currency: Currency::parse(&self.currency).unwrap_or_else(|_| Currency::usd()),
            status: PostgresInvoiceStore::status_from_str(&self.status),
            subtotal_amount_cents: self.subtotal_amount_cents,
            total_amount_cents: self.total_amount_cents,
            paid_at: self.paid_at,
            due_at: self.due_at,
            metadata: serde_json::from_value(self.metadata).unwrap_or_default(),
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceItemRow {
    id: i64,
    #[allow(dead_code)]
    invoice_id: i64,
    rating_result_id: i64,
    feature_code: String,
    meter_id: Option<i64>,
    quantity: i64,
    unit_price_cents: i64,
    amount_cents: i64,
}

impl InvoiceItemRow {
    fn into_item(self) -> InvoiceItem {
        InvoiceItem {
            id: self.id,
            invoice_id: self.invoice_id,
            rating_result_id: self.rating_result_id,
            feature_code: self.feature_code,
            meter_id: self.meter_id,
            quantity: self.quantity,
            unit_price_cents: self.unit_price_cents,
            amount_cents: self.amount_cents,
        }
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceTaxLineRow {
    id: i64,
    #[allow(dead_code)]
    invoice_id: i64,
    jurisdiction: String,
    tax_code: String,
    amount_cents: i64,
}

impl InvoiceTaxLineRow {
    fn into_line(self) -> InvoiceTaxLine {
        InvoiceTaxLine {
            id: self.id,
            invoice_id: self.invoice_id,
            jurisdiction: self.jurisdiction,
            tax_code: self.tax_code,
            amount_cents: self.amount_cents,
        }
    }
}
