//! Usage ingestion: quota gate, idempotency fast path, subscription and
//! meter resolution, entitlement gate.

pub mod errors;
pub mod service;
pub mod store;
pub mod types;

pub use errors::{UsageError, UsageResult};
pub use service::{AlwaysAllowQuotaGate, QuotaGate, UsageService};
pub use store::{InMemoryUsageStore, UsageStore};
pub use types::*;
