use billing_core::{DomainError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("organization not found: {0}")]
    OrganizationNotFound(i64),
    #[error("customer not found: {0}")]
    CustomerNotFound(i64),
    #[error("customer {customer_id} does not belong to org {org_id}")]
    CustomerOrgMismatch { org_id: i64, customer_id: i64 },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DomainError for TenancyError {
    fn kind(&self) -> ErrorKind {
        use TenancyError::*;
        match self {
            OrganizationNotFound(_) | CustomerNotFound(_) => ErrorKind::NotFound,
            CustomerOrgMismatch { .. } => ErrorKind::InvalidOrganization,
            InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

pub type TenancyResult<T> = Result<T, TenancyError>;
