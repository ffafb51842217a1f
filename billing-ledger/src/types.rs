//! Double-entry ledger entity types.

use billing_core::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerAccountCode {
    #[serde(rename = "AR")]
    AccountsReceivable,
    #[serde(rename = "Revenue.Usage")]
    RevenueUsage,
    #[serde(rename = "Revenue.Flat")]
    RevenueFlat,
    Cash,
    #[serde(rename = "Tax.Payable")]
    TaxPayable,
    #[serde(rename = "Dispute.Reserve")]
    DisputeReserve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub id: i64,
    pub org_id: i64,
    pub code: LedgerAccountCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Debit,
    Credit,
}

/// What produced a `LedgerEntry` — a free-form tag plus the id of the
/// source row, so the ledger can reference invoices, payments, or
/// disputes without depending on those crates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    UsageAccrual,
    Payment,
    Refund,
    DisputeWithdrawn,
    DisputeReinstated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntryLine {
    pub account_id: i64,
    pub direction: Direction,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub org_id: i64,
    pub source_type: SourceType,
    pub source_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub currency: Currency,
    pub lines: Vec<LedgerEntryLine>,
}

impl LedgerEntry {
    /// Σ debit - Σ credit lines, which `CreateEntry` requires to be zero
    ///.
    pub fn imbalance_cents(&self) -> i64 {
        self.lines.iter().fold(0i64, |acc, line| match line.direction {
            Direction::Debit => acc + line.amount_cents,
            Direction::Credit => acc - line.amount_cents,
        })
    }
}
