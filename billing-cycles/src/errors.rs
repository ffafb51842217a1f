use billing_core::{DomainError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("billing cycle not found: {0}")]
    CycleNotFound(i64),
    #[error("billing cycle {0} is not in CLOSING status")]
    NotClosing(i64),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DomainError for CycleError {
    fn kind(&self) -> ErrorKind {
        use CycleError::*;
        match self {
            CycleNotFound(_) => ErrorKind::NotFound,
            NotClosing(_) => ErrorKind::Conflict,
            InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

pub type CycleResult<T> = Result<T, CycleError>;
