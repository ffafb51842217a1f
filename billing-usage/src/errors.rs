use billing_core::{DomainError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("usage event not found: {0}")]
    EventNotFound(i64),
    #[error("usage quota exceeded for organization {0}")]
    QuotaExceeded(i64),
    #[error("feature not entitled for subscription {subscription_id} meter {meter_id}")]
    FeatureNotEntitled { subscription_id: i64, meter_id: i64 },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DomainError for UsageError {
    fn kind(&self) -> ErrorKind {
        use UsageError::*;
        match self {
            EventNotFound(_) => ErrorKind::NotFound,
            QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            FeatureNotEntitled { .. } => ErrorKind::FeatureNotEntitled,
            InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

pub type UsageResult<T> = Result<T, UsageError>;
