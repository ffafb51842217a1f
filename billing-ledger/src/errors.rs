use billing_core::{DomainError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger entry is unbalanced by {imbalance_cents} cents")]
    UnbalancedEntry { imbalance_cents: i64 },
    #[error("ledger account not found: {0:?}")]
    AccountNotFound(crate::types::LedgerAccountCode),
    #[error("ledger entry not found: {0}")]
    EntryNotFound(i64),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DomainError for LedgerError {
    fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            UnbalancedEntry { .. } => ErrorKind::UnbalancedEntry,
            AccountNotFound(_) | EntryNotFound(_) => ErrorKind::NotFound,
            InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
