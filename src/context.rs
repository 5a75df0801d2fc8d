//! Immutable state shared by every orchestrator component.

use std::sync::Arc;

use crate::poll::PollPolicy;

/// Authenticated client handle plus the wait policy, constructed once at
/// startup and handed to each component.
#[derive(Debug)]
pub struct ProvisioningContext<C> {
    client: Arc<C>,
    poll_policy: PollPolicy,
}

impl<C> Clone for ProvisioningContext<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            poll_policy: self.poll_policy,
        }
    }
}

impl<C> ProvisioningContext<C> {
    /// Wraps `client` with the given poll policy.
    #[must_use]
    pub fn new(client: C, poll_policy: PollPolicy) -> Self {
        Self::from_shared(Arc::new(client), poll_policy)
    }

    /// Builds a context around an already shared client.
    #[must_use]
    pub const fn from_shared(client: Arc<C>, poll_policy: PollPolicy) -> Self {
        Self {
            client,
            poll_policy,
        }
    }

    /// Returns the shared client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the wait policy applied to every long-running operation.
    #[must_use]
    pub const fn poll_policy(&self) -> &PollPolicy {
        &self.poll_policy
    }
}
