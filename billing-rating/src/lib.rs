//! Rating service: aggregates usage events and applies pricing
//! models/tiers to produce `RatingResult`s for a closing billing cycle.

pub mod errors;
pub mod service;
pub mod store;
pub mod types;

pub use errors::{RatingError, RatingOpResult};
pub use service::RatingService;
pub use store::{InMemoryRatingStore, RatingStore};
pub use types::RatingResult;
