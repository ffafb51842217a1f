//! Organization tenancy, customer records, currency resolution.

pub mod errors;
pub mod service;
pub mod store;
pub mod types;

pub use errors::{TenancyError, TenancyResult};
pub use service::TenancyService;
pub use store::{InMemoryTenancyStore, TenancyStore};
pub use types::{Customer, Organization};
