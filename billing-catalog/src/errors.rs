use billing_core::{DomainError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("product not found: {0}")]
    ProductNotFound(i64),
    #[error("feature not found: {0}")]
    FeatureNotFound(i64),
    #[error("meter not found: {0}")]
    MeterNotFound(i64),
    #[error("price not found: {0}")]
    PriceNotFound(i64),
    #[error("price amount not found: {0}")]
    PriceAmountNotFound(i64),
    #[error("metered feature {code} must reference a meter")]
    MeteredFeatureMissingMeter { code: String },
    #[error("pricing model {model:?} requires a meter on price {price_id}")]
    PricingModelRequiresMeter { price_id: i64, model: crate::types::PricingModel },
    #[error("flat price {price_id} must not reference a meter")]
    FlatPriceMustNotReferenceMeter { price_id: i64 },
    #[error("tiered price {price_id} requires at least one price tier")]
    TieredPriceRequiresTiers { price_id: i64 },
    #[error("price tier for price {price_id} has no amount field set")]
    TierMissingAmount { price_id: i64 },
    #[error("new price version {new} is not greater than current version {current} for code {code}")]
    VersionNotMonotonic { code: String, current: i64, new: i64 },
    #[error("price amount range for price {price_id} currency {currency} overlaps an existing range")]
    OverlappingPriceAmountRange { price_id: i64, currency: String },
    #[error("idempotency key already used")]
    IdempotencyReplay,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DomainError for CatalogError {
    fn kind(&self) -> ErrorKind {
        use CatalogError::*;
        match self {
            ProductNotFound(_) | FeatureNotFound(_) | MeterNotFound(_) | PriceNotFound(_)
            | PriceAmountNotFound(_) => ErrorKind::NotFound,
            MeteredFeatureMissingMeter { .. }
            | PricingModelRequiresMeter { .. }
            | FlatPriceMustNotReferenceMeter { .. }
            | TieredPriceRequiresTiers { .. }
            | TierMissingAmount { .. }
            | InvalidRequest(_) => ErrorKind::InvalidRequest,
            VersionNotMonotonic { .. } | OverlappingPriceAmountRange { .. } => ErrorKind::Conflict,
            IdempotencyReplay => ErrorKind::Conflict,
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
