//! Wall / test clock abstraction.
//!
//! Every time-sensitive operation in the engine (cycle close, rating
//! period boundaries, SLA breach, auto-charge timestamps) reads through a
//! [`Clock`] instead of calling `Utc::now()` directly, so production code
//! and simulated-time test runs share identical code paths. A test clock
//! is a named simulated-time scope: rows stamped under it carry a
//! `test_clock_id` and the two universes never mix (see
//! `billing-scheduler` for the enforcement of that boundary).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

use crate::context::RequestContext;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("test clock not found: {0}")]
    TestClockNotFound(i64),
    #[error("cannot rewind test clock {0}: requested time is before current time")]
    CannotRewind(i64),
}

/// A named simulated-time scope.
#[derive(Debug, Clone)]
struct TestClockState {
    name: String,
    current: DateTime<Utc>,
}

/// Process-wide clock. Thread-safe, cheap to clone (internally reference
/// counted via `DashMap`), immutable in shape after construction — only
/// the simulated time inside a test-clock scope ever changes.
#[derive(Clone, Default)]
pub struct Clock {
    test_clocks: std::sync::Arc<DashMap<i64, TestClockState>>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns wall time, unless `ctx` carries a test-clock scope, in
    /// which case it returns that scope's simulated time.
    pub fn now(&self, ctx: &RequestContext) -> DateTime<Utc> {
        match ctx.test_clock_id {
            Some(id) => self
                .test_clocks
                .get(&id)
                .map(|s| s.current)
                .unwrap_or_else(Utc::now),
            None => Utc::now(),
        }
    }

    /// Create a new test clock scope starting at `start`.
    pub fn create_test_clock(&self, id: i64, name: impl Into<String>, start: DateTime<Utc>) {
        self.test_clocks.insert(
            id,
            TestClockState {
                name: name.into(),
                current: start,
            },
        );
    }

    /// Advance a test clock forward to `to`. Test clocks only move
    /// forward — replaying billing flows backwards is not a supported
    /// scenario.
    pub fn advance_test_clock(&self, id: i64, to: DateTime<Utc>) -> Result<(), ClockError> {
        let mut entry = self
            .test_clocks
            .get_mut(&id)
            .ok_or(ClockError::TestClockNotFound(id))?;
        if to < entry.current {
            return Err(ClockError::CannotRewind(id));
        }
        entry.current = to;
        Ok(())
    }

    pub fn test_clock_name(&self, id: i64) -> Option<String> {
        self.test_clocks.get(&id).map(|s| s.name.clone())
    }

    pub fn delete_test_clock(&self, id: i64) {
        self.test_clocks.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use chrono::Duration;

    #[test]
    fn production_context_reads_wall_clock() {
        let clock = Clock::new();
        let ctx = RequestContext::system(1);
        let before = Utc::now();
        let now = clock.now(&ctx);
        assert!(now >= before);
    }

    #[test]
    fn test_clock_scope_is_isolated_from_wall_clock() {
        let clock = Clock::new();
        let start = Utc::now() - Duration::days(365);
        clock.create_test_clock(42, "replay-2023", start);

        let ctx = RequestContext::system(1).with_test_clock(42);
        assert_eq!(clock.now(&ctx), start);

        let advanced = start + Duration::days(30);
        clock.advance_test_clock(42, advanced).unwrap();
        assert_eq!(clock.now(&ctx), advanced);

        // Production context, same process, unaffected.
        let prod_ctx = RequestContext::system(1);
        assert!(clock.now(&prod_ctx) > advanced);
    }

    #[test]
    fn test_clock_cannot_rewind() {
        let clock = Clock::new();
        let start = Utc::now();
        clock.create_test_clock(1, "t", start);
        let err = clock
            .advance_test_clock(1, start - Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, ClockError::CannotRewind(1)));
    }
}
