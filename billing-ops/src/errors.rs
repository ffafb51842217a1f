use billing_core::{DomainError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpsError {
    #[error("billing assignment not found: {0}")]
    AssignmentNotFound(i64),
    #[error("assignment {0} is already resolved")]
    AlreadyResolved(i64),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DomainError for OpsError {
    fn kind(&self) -> ErrorKind {
        use OpsError::*;
        match self {
            AssignmentNotFound(_) => ErrorKind::NotFound,
            AlreadyResolved(_) => ErrorKind::InvalidTransition,
            InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

pub type OpsResult<T> = Result<T, OpsError>;
