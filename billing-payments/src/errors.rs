use billing_core::{DomainError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("unknown payment provider: {0}")]
    ProviderNotFound(String),
    #[error("payment method not found: {0}")]
    PaymentMethodNotFound(i64),
    #[error("checkout session not found: {0}")]
    CheckoutSessionNotFound(i64),
    #[error("webhook payload failed signature verification")]
    InvalidSignature,
    #[error("webhook payload is malformed: {0}")]
    InvalidPayload(String),
    #[error("webhook event ignored: no adapter recognized it")]
    EventIgnored,
    #[error("webhook event {provider}/{provider_event_id} already processed")]
    EventAlreadyProcessed { provider: String, provider_event_id: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("provider request to {provider} failed: {message}")]
    ProviderRequestFailed { provider: String, message: String },
}

impl DomainError for PaymentError {
    fn kind(&self) -> ErrorKind {
        use PaymentError::*;
        match self {
            ProviderNotFound(_) => ErrorKind::ProviderNotFound,
            PaymentMethodNotFound(_) => ErrorKind::PaymentMethodNotFound,
            CheckoutSessionNotFound(_) => ErrorKind::CheckoutSessionNotFound,
            InvalidSignature => ErrorKind::InvalidSignature,
            InvalidPayload(_) => ErrorKind::InvalidPayload,
            EventIgnored => ErrorKind::EventIgnored,
            EventAlreadyProcessed { .. } => ErrorKind::EventAlreadyProcessed,
            InvalidRequest(_) => ErrorKind::InvalidRequest,
            ProviderRequestFailed { .. } => ErrorKind::Internal,
        }
    }
}

pub type PaymentResult<T> = Result<T, PaymentError>;
