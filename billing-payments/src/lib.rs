//! Payment orchestrator: provider adapter registry, webhook ingest,
//! payment methods, and checkout sessions.

pub mod errors;
pub mod provider;
pub mod providers;
pub mod service;
pub mod store;
pub mod types;

pub use errors::{PaymentError, PaymentResult};
pub use provider::{
    AttachedPaymentMethod, ChargeOutcome, CreatedCheckoutSession, ProviderAdapter, ProviderConfig,
    ProviderRegistry,
};
pub use providers::{AdyenAdapter, BraintreeAdapter, StripeAdapter, XenditAdapter};
pub use service::{PaymentService, WebhookIngestOutcome};
pub use store::{InMemoryPaymentStore, PaymentStore, PostgresPaymentEventStore};
pub use types::*;
