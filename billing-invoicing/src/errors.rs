use billing_core::{DomainError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("invoice not found: {0}")]
    InvoiceNotFound(i64),
    #[error("billing cycle {0} is not CLOSED")]
    CycleNotClosed(i64),
    #[error("invoice {0} is not DRAFT and cannot be mutated")]
    NotDraft(i64),
    #[error("invoice {0} already exists for this billing cycle")]
    AlreadyGenerated(i64),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DomainError for InvoiceError {
    fn kind(&self) -> ErrorKind {
        use InvoiceError::*;
        match self {
            InvoiceNotFound(_) => ErrorKind::NotFound,
            CycleNotClosed(_) | NotDraft(_) | AlreadyGenerated(_) => ErrorKind::Conflict,
            InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

pub type InvoiceOpResult<T> = Result<T, InvoiceError>;
