use crate::retry::classify_failure;
use engine_core::retry::{RetryDisposition, RetryPolicy};
use model::execution::failure::Failure;
use std::time::Duration;
use tracing::debug;

/// What to do with a failed unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Try again after the delay.
    Retry(Duration),
    /// Hand the payload to the dead-letter channel.
    DeadLetter,
}

/// Single decision point for every stage failure. Retryability comes from the
/// failure kind; the attempt budget and delays come from the retry policy.
#[derive(Debug, Clone, Default)]
pub struct FailureRouter {
    policy: RetryPolicy,
}

impl FailureRouter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn route(&self, failure: &Failure, attempt: u32) -> RouteDecision {
        let decision = match classify_failure(failure) {
            RetryDisposition::Stop => RouteDecision::DeadLetter,
            RetryDisposition::Retry if !self.policy.allows_retry_after(attempt) => {
                RouteDecision::DeadLetter
            }
            RetryDisposition::Retry => RouteDecision::Retry(self.policy.jittered_delay(attempt)),
        };

        debug!(stage = %failure.stage, kind = %failure.kind, attempt, ?decision, "Routed failure");
        decision
    }
}
