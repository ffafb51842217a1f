//! Subscription lifecycle state machine, items, and entitlements.

pub mod errors;
pub mod service;
pub mod store;
pub mod types;

pub use errors::{SubscriptionError, SubscriptionResult};
pub use service::SubscriptionService;
pub use store::{InMemorySubscriptionStore, SubscriptionStore};
pub use types::*;
