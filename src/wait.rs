//! Polling of asynchronous platform operations.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::compute::{ComputeApi, Operation, OperationState, Reference};
use crate::error::DriverError;

/// Default delay between two operation polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Polls operations until they reach a terminal state.
///
/// There is no client-side deadline: an operation that never leaves
/// `pending` keeps the caller waiting.
#[derive(Clone, Debug)]
pub struct OperationWaiter<'a, A> {
    api: &'a A,
    poll_interval: Duration,
}

impl<'a, A: ComputeApi> OperationWaiter<'a, A> {
    /// Creates a waiter polling `api` every [`DEFAULT_POLL_INTERVAL`].
    #[must_use]
    pub const fn new(api: &'a A) -> Self {
        Self {
            api,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the delay between polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Waits for `operation` to finish and returns the resource it
    /// references.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::OperationFailed`] when the operation ends in
    /// failure, timeout, or an unrecognised state, and [`DriverError::Api`]
    /// when polling fails.
    pub async fn wait(&self, operation: Operation) -> Result<Option<Reference>, DriverError> {
        let mut current = operation;
        while current.state.is_in_flight() {
            sleep(self.poll_interval).await;
            current = self.api.get_operation(current.id).await?;
            debug!(operation = %current.id, state = ?current.state, "polled operation");
        }

        match current.state {
            OperationState::Success => Ok(current.reference),
            _ => Err(DriverError::OperationFailed {
                operation_id: current.id,
                reason: current
                    .reason
                    .unwrap_or_else(|| state_label(current.state).to_owned()),
                message: current.message.unwrap_or_default(),
            }),
        }
    }

    /// Waits for `operation` and returns the id of the resource it produced.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingReference`] when the successful
    /// operation names no resource, otherwise as [`Self::wait`].
    pub async fn wait_for_id(&self, operation: Operation) -> Result<Uuid, DriverError> {
        let operation_id = operation.id;
        self.wait(operation)
            .await?
            .and_then(|reference| reference.id)
            .ok_or(DriverError::MissingReference { operation_id })
    }
}

const fn state_label(state: OperationState) -> &'static str {
    match state {
        OperationState::Pending => "pending",
        OperationState::Processing => "processing",
        OperationState::Success => "success",
        OperationState::Failure => "failure",
        OperationState::Timeout => "timeout",
        OperationState::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeCompute;

    fn pending(api: &FakeCompute, polls: usize, outcome: OperationState) -> Operation {
        api.scripted_operation(polls, outcome, Some(Uuid::new_v4()))
    }

    #[tokio::test]
    async fn pending_operation_resolves_after_polls() {
        let api = FakeCompute::new();
        let operation = pending(&api, 2, OperationState::Success);
        let waiter = OperationWaiter::new(&api).with_poll_interval(Duration::ZERO);

        let reference = waiter.wait(operation).await.expect("operation succeeds");

        assert!(reference.and_then(|value| value.id).is_some());
        assert_eq!(api.operation_polls(), 2);
    }

    #[tokio::test]
    async fn failed_operation_reports_reason_and_message() {
        let api = FakeCompute::new();
        let operation = pending(&api, 1, OperationState::Failure);
        let waiter = OperationWaiter::new(&api).with_poll_interval(Duration::ZERO);

        let err = waiter.wait(operation).await.expect_err("operation fails");

        assert!(
            matches!(err, DriverError::OperationFailed { ref reason, .. } if reason == "failure"),
            "unexpected: {err}"
        );
    }

    #[tokio::test]
    async fn already_successful_operation_is_not_polled() {
        let api = FakeCompute::new();
        let operation = pending(&api, 0, OperationState::Success);
        let waiter = OperationWaiter::new(&api).with_poll_interval(Duration::ZERO);

        waiter.wait_for_id(operation).await.expect("operation succeeds");

        assert_eq!(api.operation_polls(), 0);
    }

    #[tokio::test]
    async fn missing_reference_is_an_error() {
        let api = FakeCompute::new();
        let operation = api.scripted_operation(0, OperationState::Success, None);
        let waiter = OperationWaiter::new(&api).with_poll_interval(Duration::ZERO);

        let err = waiter.wait_for_id(operation).await.expect_err("no reference");

        assert!(matches!(err, DriverError::MissingReference { .. }), "unexpected: {err}");
    }
}
