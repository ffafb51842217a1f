//! Shared foundations for the billing engine: identity, clock, request
//! context, money, and the error-kind taxonomy every other crate builds
//! its own error enums against.
//!
//! [`ids::IdMinter`] and [`clock::Clock`] are process-wide, thread-safe
//! singletons wired up once at startup, never package-level globals
//! that services reach for implicitly.

pub mod clock;
pub mod context;
pub mod error;
pub mod ids;
pub mod money;

pub use clock::Clock;
pub use context::{ActorType, RequestContext};
pub use error::{DomainError, ErrorKind};
pub use ids::IdMinter;
pub use money::{Currency, Money};
