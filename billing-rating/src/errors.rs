use billing_core::{DomainError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RatingError {
    #[error("billing cycle {0} not found")]
    CycleNotFound(i64),
    #[error("billing cycle {0} is not in CLOSING status")]
    CycleNotClosing(i64),
    #[error("no price amount covers price {price_id} at {at}")]
    NoPriceAmountCovering { price_id: i64, at: chrono::DateTime<chrono::Utc> },
    #[error("quantity {quantity} on price {price_id} is not covered by any tier")]
    NoTierCoversQuantity { price_id: i64, quantity: i64 },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DomainError for RatingError {
    fn kind(&self) -> ErrorKind {
        use RatingError::*;
        match self {
            CycleNotFound(_) => ErrorKind::NotFound,
            CycleNotClosing(_) => ErrorKind::Conflict,
            NoPriceAmountCovering { .. } | NoTierCoversQuantity { .. } | InvalidRequest(_) => {
                ErrorKind::InvalidRequest
            }
        }
    }
}

pub type RatingOpResult<T> = Result<T, RatingError>;
