//! Double-entry ledger: validates and posts balanced `LedgerEntry` rows
//! for usage accrual, payments, refunds, and disputes.

pub mod errors;
pub mod service;
pub mod store;
pub mod types;

pub use errors::{LedgerError, LedgerResult};
pub use service::LedgerService;
pub use store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore};
pub use types::{
    Direction, LedgerAccount, LedgerAccountCode, LedgerEntry, LedgerEntryLine, SourceType,
};
