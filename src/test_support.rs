//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::cloud::{
    CloudClient, CloudFuture, Operation, OperationState, Resource, ResourceId, ResourceKind,
};

/// Subscription identifier used when qualifying scripted resource ids.
pub const SCRIPTED_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

/// Address assigned to scripted public IP resources unless overridden.
pub const SCRIPTED_PUBLIC_ADDRESS: &str = "20.51.100.7";

/// Records a single call made through [`ScriptedCloud`].
#[derive(Clone, Debug, PartialEq)]
pub enum CloudCall {
    /// Resource lookup.
    Get(ResourceId),
    /// Create call with its request body.
    Create(ResourceId, Value),
    /// Resource action with its optional request body.
    Action(ResourceId, String, Option<Value>),
    /// Observation of an operation.
    Poll(ResourceId, String),
}

/// Errors produced by [`ScriptedCloud`] when a call is scripted to fail.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedCloudError {
    /// Scripted lookup failure.
    #[error("scripted lookup failure for {0}")]
    Get(String),
    /// Scripted create submission failure.
    #[error("scripted create failure for {0}")]
    Create(String),
    /// Scripted action submission failure.
    #[error("scripted {action} failure for {target}")]
    Action {
        /// Action that was rejected.
        action: String,
        /// Target resource.
        target: String,
    },
    /// Raised when an operation is polled that the cloud never issued.
    #[error("unknown operation {0}")]
    UnknownOperation(String),
}

#[derive(Debug)]
struct PendingOperation {
    remaining_polls: u32,
    outcome: Outcome,
}

#[derive(Clone, Debug)]
enum Outcome {
    Created(ResourceId, Value),
    ActionSucceeded(Option<Value>),
    Failed(String),
}

#[derive(Debug, Default)]
struct State {
    resources: HashMap<ResourceId, Resource>,
    calls: Vec<CloudCall>,
    pending: HashMap<String, PendingOperation>,
    next_operation: u64,
    poll_rounds: u32,
    public_address: Option<String>,
    fail_lookup: Option<ResourceKind>,
    fail_create: Option<ResourceKind>,
    fail_provisioning: HashMap<ResourceKind, String>,
    fail_action_submit: Option<String>,
    fail_action: HashMap<String, String>,
    run_command_outputs: VecDeque<Value>,
}

/// In-memory cloud that records every call and resolves operations from a
/// script.
///
/// Created resources become visible to later lookups once their operation
/// reaches the succeeded state, which makes repeated provisioning observable
/// as lookups rather than creates.
#[derive(Clone, Debug)]
pub struct ScriptedCloud {
    state: Arc<Mutex<State>>,
}

impl Default for ScriptedCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCloud {
    /// Creates an empty cloud where every operation completes on its first
    /// observation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                public_address: Some(SCRIPTED_PUBLIC_ADDRESS.to_owned()),
                ..State::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of observations that report `polling` before an operation
    /// becomes terminal.
    pub fn set_poll_rounds(&self, rounds: u32) {
        self.lock().poll_rounds = rounds;
    }

    /// Overrides (or removes) the address assigned to public IP resources.
    pub fn set_public_address(&self, address: Option<&str>) {
        self.lock().public_address = address.map(str::to_owned);
    }

    /// Seeds an existing resource.
    pub fn insert_existing(&self, id: &ResourceId, properties: Value) {
        let resource = Resource {
            id: self.qualify(id),
            properties,
        };
        self.lock().resources.insert(id.clone(), resource);
    }

    /// Makes lookups of the given kind fail.
    pub fn fail_lookup(&self, kind: ResourceKind) {
        self.lock().fail_lookup = Some(kind);
    }

    /// Makes create submissions of the given kind fail.
    pub fn fail_create(&self, kind: ResourceKind) {
        self.lock().fail_create = Some(kind);
    }

    /// Makes create operations of the given kind end in the failed state.
    pub fn fail_provisioning(&self, kind: ResourceKind, reason: &str) {
        self.lock()
            .fail_provisioning
            .insert(kind, reason.to_owned());
    }

    /// Makes submissions of `action` fail before an operation is issued.
    pub fn reject_action(&self, action: &str) {
        self.lock().fail_action_submit = Some(action.to_owned());
    }

    /// Makes operations for `action` end in the failed state.
    pub fn fail_action(&self, action: &str, reason: &str) {
        self.lock()
            .fail_action
            .insert(action.to_owned(), reason.to_owned());
    }

    /// Removes every scripted failure.
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_lookup = None;
        state.fail_create = None;
        state.fail_provisioning.clear();
        state.fail_action_submit = None;
        state.fail_action.clear();
    }

    /// Queues the output returned by the next run-command operation, shaped
    /// like the provider's instance view status list.
    pub fn push_run_command_output(&self, stdout: &str, stderr: &str) {
        self.push_run_command_value(json!({
            "value": [
                {
                    "code": "ComponentStatus/StdOut/succeeded",
                    "level": "Info",
                    "message": stdout,
                },
                {
                    "code": "ComponentStatus/StdErr/succeeded",
                    "level": "Info",
                    "message": stderr,
                },
            ]
        }));
    }

    /// Queues a raw run-command output value.
    pub fn push_run_command_value(&self, value: Value) {
        self.lock().run_command_outputs.push_back(value);
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<CloudCall> {
        self.lock().calls.clone()
    }

    /// Returns the targets of every create call, in submission order.
    #[must_use]
    pub fn created(&self) -> Vec<ResourceId> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                CloudCall::Create(id, _) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the body of the create call for `kind`, if one was made.
    #[must_use]
    pub fn create_body(&self, kind: ResourceKind) -> Option<Value> {
        self.lock().calls.iter().find_map(|call| match call {
            CloudCall::Create(id, body) if id.kind == kind => Some(body.clone()),
            _ => None,
        })
    }

    /// Returns the scripts submitted through run-command, in order.
    #[must_use]
    pub fn run_command_scripts(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                CloudCall::Action(_, action, Some(body)) if action == "runCommand" => body
                    .get("script")
                    .and_then(Value::as_array)
                    .map(|lines| {
                        lines
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join("\n")
                    }),
                _ => None,
            })
            .collect()
    }

    /// Number of lookups issued for resources of `kind`.
    #[must_use]
    pub fn lookup_count(&self, kind: ResourceKind) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, CloudCall::Get(id) if id.kind == kind))
            .count()
    }

    /// Number of observations made across all operations.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, CloudCall::Poll(..)))
            .count()
    }

    /// Returns `true` when a resource with this id exists.
    #[must_use]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.lock().resources.contains_key(id)
    }

    fn issue(state: &mut State, target: &ResourceId, action: &str, outcome: Outcome) -> Operation {
        state.next_operation += 1;
        let url = format!("scripted://operations/{}", state.next_operation);
        state.pending.insert(
            url.clone(),
            PendingOperation {
                remaining_polls: state.poll_rounds,
                outcome,
            },
        );
        Operation {
            poll_url: Some(url),
            ..Operation::submitted(target.clone(), action)
        }
    }

    fn resolve(
        state: &mut State,
        operation: &Operation,
    ) -> Result<Operation, ScriptedCloudError> {
        let url = operation.poll_url.clone().unwrap_or_default();
        let pending = state
            .pending
            .get_mut(&url)
            .ok_or_else(|| ScriptedCloudError::UnknownOperation(url.clone()))?;

        let mut next = operation.clone();
        if pending.remaining_polls > 0 {
            pending.remaining_polls -= 1;
            next.state = OperationState::Polling;
            return Ok(next);
        }

        let outcome = pending.outcome.clone();
        state.pending.remove(&url);
        match outcome {
            Outcome::Created(id, properties) => {
                let resource = Resource {
                    id: id.arm_path(SCRIPTED_SUBSCRIPTION),
                    properties,
                };
                state.resources.insert(id, resource);
                next.state = OperationState::Succeeded;
            }
            Outcome::ActionSucceeded(output) => {
                next.state = OperationState::Succeeded;
                next.output = output;
            }
            Outcome::Failed(reason) => {
                next.state = OperationState::Failed;
                next.fault = Some(reason);
            }
        }
        Ok(next)
    }
}

impl CloudClient for ScriptedCloud {
    type Error = ScriptedCloudError;

    fn qualify(&self, id: &ResourceId) -> String {
        id.arm_path(SCRIPTED_SUBSCRIPTION)
    }

    fn get<'a>(&'a self, id: &'a ResourceId) -> CloudFuture<'a, Option<Resource>, Self::Error> {
        let result = {
            let mut state = self.lock();
            state.calls.push(CloudCall::Get(id.clone()));
            if state.fail_lookup == Some(id.kind) {
                Err(ScriptedCloudError::Get(id.to_string()))
            } else {
                Ok(state.resources.get(id).cloned())
            }
        };
        Box::pin(async move { result })
    }

    fn create<'a>(
        &'a self,
        id: &'a ResourceId,
        body: Value,
    ) -> CloudFuture<'a, Operation, Self::Error> {
        let result = {
            let mut state = self.lock();
            state.calls.push(CloudCall::Create(id.clone(), body.clone()));
            if state.fail_create == Some(id.kind) {
                Err(ScriptedCloudError::Create(id.to_string()))
            } else {
                let outcome = if let Some(reason) = state.fail_provisioning.get(&id.kind) {
                    Outcome::Failed(reason.clone())
                } else {
                    let mut properties = body.get("properties").cloned().unwrap_or_else(|| json!({}));
                    if id.kind == ResourceKind::PublicIpAddress
                        && let (Some(address), Some(map)) =
                            (state.public_address.clone(), properties.as_object_mut())
                    {
                        map.insert(String::from("ipAddress"), Value::String(address));
                    }
                    Outcome::Created(id.clone(), properties)
                };
                Ok(Self::issue(&mut state, id, "create", outcome))
            }
        };
        Box::pin(async move { result })
    }

    fn action<'a>(
        &'a self,
        id: &'a ResourceId,
        action: &'a str,
        body: Option<Value>,
    ) -> CloudFuture<'a, Operation, Self::Error> {
        let result = {
            let mut state = self.lock();
            state
                .calls
                .push(CloudCall::Action(id.clone(), action.to_owned(), body));
            if state.fail_action_submit.as_deref() == Some(action) {
                Err(ScriptedCloudError::Action {
                    action: action.to_owned(),
                    target: id.to_string(),
                })
            } else {
                let outcome = if let Some(reason) = state.fail_action.get(action) {
                    Outcome::Failed(reason.clone())
                } else if action == "runCommand" {
                    Outcome::ActionSucceeded(state.run_command_outputs.pop_front())
                } else {
                    Outcome::ActionSucceeded(None)
                };
                Ok(Self::issue(&mut state, id, action, outcome))
            }
        };
        Box::pin(async move { result })
    }

    fn poll<'a>(&'a self, operation: &'a Operation) -> CloudFuture<'a, Operation, Self::Error> {
        let result = {
            let mut state = self.lock();
            state.calls.push(CloudCall::Poll(
                operation.target.clone(),
                operation.action.clone(),
            ));
            Self::resolve(&mut state, operation)
        };
        Box::pin(async move { result })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
