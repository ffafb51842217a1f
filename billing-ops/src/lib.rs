//! Billing operations: collections assignment workflow, SLA timers, and
//! FinOps performance rollups.

pub mod errors;
pub mod service;
pub mod store;
pub mod types;

pub use errors::{OpsError, OpsResult};
pub use service::OpsService;
pub use store::{InMemoryOpsStore, OpsStore};
pub use types::{ActionType, AssignmentStatus, BillingAction, BillingAssignment, FinOpsSnapshot};
