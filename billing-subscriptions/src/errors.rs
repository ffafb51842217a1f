use billing_core::{DomainError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(i64),
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: crate::types::SubscriptionStatus, to: crate::types::SubscriptionStatus },
    #[error("subscription must have at least one item")]
    MissingSubscriptionItems,
    #[error("price {0} does not exist or is not active")]
    MissingPricing(i64),
    #[error("customer {0} does not exist in this organization")]
    MissingCustomer(i64),
    #[error("billing_cycle_type must be set")]
    InvalidBillingCycleType,
    #[error("meter {0} referenced by a metered item does not exist")]
    InvalidMeterId(i64),
    #[error("at most one flat-priced item is allowed per subscription")]
    MultipleFlatPriceItems,
    #[error("licensed item for price {0} must have quantity >= 1")]
    InvalidLicensedQuantity(i64),
    #[error("tiered price {0} has no tiers configured")]
    MissingTiers(i64),
    #[error("cannot end subscription {0}: open billing cycles or unfinalized invoices remain")]
    OpenObligationsRemain(i64),
    #[error("idempotency key already used")]
    IdempotencyReplay,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DomainError for SubscriptionError {
    fn kind(&self) -> ErrorKind {
        use SubscriptionError::*;
        match self {
            SubscriptionNotFound(_) => ErrorKind::NotFound,
            InvalidTransition { .. } => ErrorKind::InvalidTransition,
            MissingSubscriptionItems
            | MissingPricing(_)
            | MissingCustomer(_)
            | InvalidBillingCycleType
            | InvalidMeterId(_)
            | MultipleFlatPriceItems
            | InvalidLicensedQuantity(_)
            | MissingTiers(_)
            | InvalidRequest(_) => ErrorKind::InvalidRequest,
            OpenObligationsRemain(_) => ErrorKind::Conflict,
            IdempotencyReplay => ErrorKind::Conflict,
        }
    }
}

pub type SubscriptionResult<T> = Result<T, SubscriptionError>;
