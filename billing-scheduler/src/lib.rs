//! Scheduler: named job runner for cycle close, rating, invoicing,
//! auto-charge retry, dunning, and housekeeping.

pub mod errors;
pub mod service;
pub mod store;
pub mod types;

pub use errors::{SchedulerError, SchedulerResult};
pub use service::SchedulerService;
pub use store::{InMemoryJobRunStore, JobRunStore, PostgresJobRunStore};
pub use types::{JobName, JobRun};
