//! Shared error-kind taxonomy.
//!
//! Each crate defines its own `thiserror` error enum scoped to its
//! domain, but every variant maps to one of these stable kinds. An
//! (out-of-scope) HTTP boundary uses [`DomainError::kind`] to pick a
//! status code without this engine depending on an HTTP framework.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    InvalidOrganization,
    NotFound,
    Conflict,
    InvalidTransition,
    FeatureNotEntitled,
    QuotaExceeded,
    InvalidSignature,
    InvalidPayload,
    EventIgnored,
    EventAlreadyProcessed,
    UnbalancedEntry,
    CheckoutSessionNotFound,
    PaymentMethodNotFound,
    ProviderNotFound,
    InvalidConfig,
    RateLimited,
    Internal,
}

impl ErrorKind {
    /// The HTTP status an (out-of-scope) API boundary would map this
    /// kind to — informational only, this crate never constructs an
    /// HTTP response itself.
    pub fn http_status_hint(self) -> u16 {
        use ErrorKind::*;
        match self {
            InvalidRequest | InvalidPayload => 400,
            InvalidOrganization => 401,
            FeatureNotEntitled => 403,
            NotFound | CheckoutSessionNotFound | PaymentMethodNotFound | ProviderNotFound => 404,
            Conflict | InvalidTransition | EventAlreadyProcessed | UnbalancedEntry => 409,
            RateLimited | QuotaExceeded => 429,
            EventIgnored => 200,
            InvalidSignature => 400,
            InvalidConfig | Internal => 500,
        }
    }
}

/// Implemented by every per-crate error enum so callers can recover the
/// stable kind without string matching.
pub trait DomainError: std::error::Error {
    fn kind(&self) -> ErrorKind;
}
