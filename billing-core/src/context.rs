//! Context propagation.
//!
//! Every public operation in the engine takes a [`RequestContext`]
//! carrying `{org_id, actor_type, actor_id, request_id, test_clock_id?}`
//! plus a cancellation token. Downstream queries derive `org_id` and the
//! test-clock scope from the context — never from a request body — so a
//! handler can never be tricked into reading or writing another
//! organization's rows.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Who is making the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// An authenticated API key belonging to the organization.
    ApiKey,
    /// The scheduler acting on the organization's behalf.
    Scheduler,
    /// A payment provider webhook.
    Webhook,
    /// Internal system actor (migrations, backfills, tests).
    System,
}

/// Ambient values carried through every operation. `org_id` is the
/// tenant boundary: every repository method takes a context and filters
/// on `ctx.org_id`, never on an id embedded in a request payload.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub org_id: i64,
    pub actor_type: ActorType,
    pub actor_id: Option<i64>,
    pub request_id: Uuid,
    pub test_clock_id: Option<i64>,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new(org_id: i64, actor_type: ActorType) -> Self {
        Self {
            org_id,
            actor_type,
            actor_id: None,
            request_id: Uuid::new_v4(),
            test_clock_id: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// A context for internal/system-initiated work (schedulers, tests)
    /// scoped to `org_id`.
    pub fn system(org_id: i64) -> Self {
        Self::new(org_id, ActorType::System)
    }

    pub fn with_actor(mut self, actor_id: i64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_test_clock(mut self, test_clock_id: i64) -> Self {
        self.test_clock_id = Some(test_clock_id);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// A child context for a scheduler job acting against this same
    /// organization and test-clock scope.
    pub fn child_for_job(&self) -> Self {
        Self {
            org_id: self.org_id,
            actor_type: ActorType::Scheduler,
            actor_id: None,
            request_id: Uuid::new_v4(),
            test_clock_id: self.test_clock_id,
            cancellation: self.cancellation.child_token(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_context_inherits_org_and_test_clock_scope() {
        let ctx = RequestContext::system(9).with_test_clock(3);
        let child = ctx.child_for_job();
        assert_eq!(child.org_id, 9);
        assert_eq!(child.test_clock_id, Some(3));
        assert_eq!(child.actor_type, ActorType::Scheduler);
    }

    #[test]
    fn cancelling_parent_cancels_child() {
        let ctx = RequestContext::system(1);
        let child = ctx.child_for_job();
        ctx.cancellation().cancel();
        assert!(child.is_cancelled());
    }
}
