//! Price catalog: products, features, meters, prices and their
//! time-sliced amounts and tiers.

pub mod errors;
pub mod service;
pub mod store;
pub mod types;

pub use errors::{CatalogError, CatalogResult};
pub use service::CatalogService;
pub use store::{CatalogStore, InMemoryCatalogStore};
pub use types::*;
