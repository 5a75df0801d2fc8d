//! Waits long-running operations out to a terminal state.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use crate::cloud::{CloudClient, Operation, OperationState, ResourceId};

/// Default delay between two observations of an operation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default upper bound on how long a single operation is waited for.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(1800);

/// Poll interval and overall bound applied to every wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Delay between observations once an operation is running.
    pub interval: Duration,
    /// Maximum time spent waiting for one operation.
    pub max_wait: Duration,
}

impl PollPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_WAIT)
    }
}

/// Errors raised while waiting for an operation.
#[derive(Debug, Error)]
pub enum WaitError<ClientError>
where
    ClientError: std::error::Error + 'static,
{
    /// Raised when observing the operation fails.
    #[error("failed to poll {action} on {target}: {source}")]
    Client {
        /// Resource the operation acts on.
        target: ResourceId,
        /// Action being waited on.
        action: String,
        /// Client error.
        #[source]
        source: ClientError,
    },
    /// Raised when the operation reaches the failed state.
    #[error("{action} on {target} failed: {reason}")]
    Failed {
        /// Resource the operation acts on.
        target: ResourceId,
        /// Action being waited on.
        action: String,
        /// Fault reason reported by the provider.
        reason: String,
    },
    /// Raised when the operation is still running once the bound elapses.
    #[error("timeout after {waited_secs}s waiting for {action} on {target}")]
    Timeout {
        /// Resource the operation acts on.
        target: ResourceId,
        /// Action being waited on.
        action: String,
        /// Seconds spent waiting.
        waited_secs: u64,
    },
}

impl<ClientError> WaitError<ClientError>
where
    ClientError: std::error::Error + 'static,
{
    /// Returns the provider fault reason when the operation failed remotely.
    #[must_use]
    pub fn fault_reason(&self) -> Option<&str> {
        match self {
            Self::Failed { reason, .. } => Some(reason),
            Self::Client { .. } | Self::Timeout { .. } => None,
        }
    }

    /// Returns `true` when the bound elapsed before the operation finished.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Polls `operation` until it succeeds or fails.
///
/// The first observation happens immediately; later observations are spaced
/// by `policy.interval`. Control only returns once the operation is terminal
/// or the bound elapses.
///
/// # Errors
///
/// Returns [`WaitError::Failed`] when the operation fails,
/// [`WaitError::Timeout`] when it is still running after `policy.max_wait`,
/// and [`WaitError::Client`] when an observation fails.
pub async fn wait_for_terminal<C>(
    client: &C,
    operation: Operation,
    policy: &PollPolicy,
) -> Result<Operation, WaitError<C::Error>>
where
    C: CloudClient + ?Sized,
{
    let started = Instant::now();
    // A bound past the clock's range means no deadline at all.
    let deadline = started.checked_add(policy.max_wait);
    let mut current = operation;

    loop {
        match current.state {
            OperationState::Succeeded => return Ok(current),
            OperationState::Failed => {
                return Err(WaitError::Failed {
                    reason: current
                        .fault
                        .clone()
                        .unwrap_or_else(|| String::from("provider reported no fault detail")),
                    target: current.target,
                    action: current.action,
                });
            }
            OperationState::Submitted => {}
            OperationState::Polling => {
                let next_poll = Instant::now().checked_add(policy.interval);
                if let Some(limit) = deadline
                    && next_poll.is_none_or(|next| next > limit)
                {
                    return Err(WaitError::Timeout {
                        target: current.target,
                        action: current.action,
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
                sleep(policy.interval).await;
            }
        }

        debug!(target_resource = %current.target, action = %current.action, "polling operation");
        current = client
            .poll(&current)
            .await
            .map_err(|source| WaitError::Client {
                target: current.target.clone(),
                action: current.action.clone(),
                source,
            })?;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::ScriptedCloud;

    fn fast_policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn returns_once_operation_succeeds() {
        let cloud = ScriptedCloud::new();
        cloud.set_poll_rounds(3);
        let id = ResourceId::resource_group("rg1");
        let op = cloud
            .create(&id, json!({"location": "eastus"}))
            .await
            .unwrap_or_else(|err| panic!("submit: {err}"));

        let done = wait_for_terminal(&cloud, op, &fast_policy())
            .await
            .unwrap_or_else(|err| panic!("wait should succeed: {err}"));

        assert_eq!(done.state, OperationState::Succeeded);
        assert_eq!(cloud.poll_count(), 4);
    }

    #[tokio::test]
    async fn surfaces_fault_reason_on_failure() {
        let cloud = ScriptedCloud::new();
        cloud.fail_action("restart", "VM is deallocated");
        let id = ResourceId::virtual_machine("rg1", "vm1");
        let op = cloud
            .action(&id, "restart", None)
            .await
            .unwrap_or_else(|err| panic!("submit: {err}"));

        let err = wait_for_terminal(&cloud, op, &fast_policy())
            .await
            .expect_err("failed operation should error");

        assert_eq!(err.fault_reason(), Some("VM is deallocated"));
        assert!(err.to_string().contains("virtual machine 'vm1'"));
    }

    #[tokio::test]
    async fn times_out_when_operation_never_finishes() {
        let cloud = ScriptedCloud::new();
        cloud.set_poll_rounds(u32::MAX);
        let id = ResourceId::resource_group("rg1");
        let op = cloud
            .create(&id, json!({"location": "eastus"}))
            .await
            .unwrap_or_else(|err| panic!("submit: {err}"));
        let policy = PollPolicy::new(Duration::from_millis(2), Duration::from_millis(10));

        let err = wait_for_terminal(&cloud, op, &policy)
            .await
            .expect_err("wait should time out");

        assert!(matches!(err, WaitError::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn unbounded_wait_does_not_overflow_the_clock() {
        let cloud = ScriptedCloud::new();
        cloud.set_poll_rounds(2);
        let id = ResourceId::resource_group("rg1");
        let op = cloud
            .create(&id, json!({"location": "eastus"}))
            .await
            .unwrap_or_else(|err| panic!("submit: {err}"));
        let policy = PollPolicy::new(Duration::from_millis(1), Duration::from_secs(u64::MAX));

        let done = wait_for_terminal(&cloud, op, &policy)
            .await
            .unwrap_or_else(|err| panic!("wait should succeed: {err}"));

        assert_eq!(done.state, OperationState::Succeeded);
        assert_eq!(cloud.poll_count(), 3);
    }

    #[tokio::test]
    async fn already_terminal_operation_is_not_polled() {
        let cloud = ScriptedCloud::new();
        let mut op = Operation::submitted(ResourceId::resource_group("rg1"), "create");
        op.state = OperationState::Succeeded;

        let done = wait_for_terminal(&cloud, op, &fast_policy())
            .await
            .unwrap_or_else(|err| panic!("wait should succeed: {err}"));

        assert_eq!(done.state, OperationState::Succeeded);
        assert_eq!(cloud.poll_count(), 0);
    }
}
