//! Lifecycle capabilities - the contracts a per-resource adapter implements
//!
//! Every adapter implements [`ResourceCrud`]; the verb traits are implemented
//! only for the operations the resource supports. Optional behaviour (state
//! polling, serialization, extra waits, metrics) is declared up front through
//! [`Capabilities`] rather than discovered at runtime.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{LifecycleError, LifecycleResult};
use crate::metrics::MetricsSink;
use crate::resource::ResourceData;

/// Terminal label the control plane reports for an unsuccessful operation
pub const FAILED: &str = "FAILED";
/// Terminal label of a successful work request
pub const SUCCEEDED: &str = "SUCCEEDED";
pub const CANCELED: &str = "CANCELED";

/// Ordered pending and target label sets for one asynchronous transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pending: Vec<String>,
    target: Vec<String>,
}

impl StateTransition {
    /// Fails when a label appears in both sets or the target set is empty
    pub fn new<P, T>(pending: P, target: T) -> LifecycleResult<Self>
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        let pending: Vec<String> = pending.into_iter().map(Into::into).collect();
        let target: Vec<String> = target.into_iter().map(Into::into).collect();

        if target.is_empty() {
            return Err(LifecycleError::config("state transition needs a target state"));
        }
        if let Some(overlap) = pending.iter().find(|p| target.contains(*p)) {
            return Err(LifecycleError::config(format!(
                "state '{}' is both pending and target",
                overlap
            )));
        }
        Ok(Self { pending, target })
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn target(&self) -> &[String] {
        &self.target
    }

    pub fn is_target(&self, state: &str) -> bool {
        self.target.iter().any(|t| t == state)
    }
}

/// Lock shared by every adapter instance whose remote calls must not overlap
pub type SharedMutex = Arc<Mutex<()>>;

/// Optional behaviour an adapter declares
#[derive(Clone, Default)]
pub struct Capabilities {
    pub created: Option<StateTransition>,
    pub updated: Option<StateTransition>,
    pub deleted: Option<StateTransition>,
    pub mutex: Option<SharedMutex>,
    pub extra_wait_post_create_delete: Option<Duration>,
    pub extra_wait_post_delete: Option<Duration>,
    /// Fixed wait between state checks instead of exponential backoff
    pub poll_interval: Option<Duration>,
    pub metrics: Option<Arc<dyn MetricsSink>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(mut self, transition: StateTransition) -> Self {
        self.created = Some(transition);
        self
    }

    pub fn updated(mut self, transition: StateTransition) -> Self {
        self.updated = Some(transition);
        self
    }

    pub fn deleted(mut self, transition: StateTransition) -> Self {
        self.deleted = Some(transition);
        self
    }

    pub fn mutex(mut self, mutex: SharedMutex) -> Self {
        self.mutex = Some(mutex);
        self
    }

    pub fn extra_wait_post_create_delete(mut self, wait: Duration) -> Self {
        self.extra_wait_post_create_delete = Some(wait);
        self
    }

    pub fn extra_wait_post_delete(mut self, wait: Duration) -> Self {
        self.extra_wait_post_delete = Some(wait);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Wait applied after a successful delete
    pub fn post_delete_wait(&self) -> Option<Duration> {
        self.extra_wait_post_delete
            .or(self.extra_wait_post_create_delete)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("created", &self.created)
            .field("updated", &self.updated)
            .field("deleted", &self.deleted)
            .field("mutex", &self.mutex.is_some())
            .field("extra_wait_post_create_delete", &self.extra_wait_post_create_delete)
            .field("extra_wait_post_delete", &self.extra_wait_post_delete)
            .field("poll_interval", &self.poll_interval)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

/// Operations every adapter supports
#[async_trait]
pub trait ResourceCrud: Send {
    /// Resource type name (e.g., "sim_core_vcn")
    fn type_name(&self) -> &'static str;

    /// The configuration store this invocation works on
    fn data(&self) -> &ResourceData;

    fn data_mut(&mut self) -> &mut ResourceData;

    /// Identifier of the remote resource, if known
    ///
    /// Defaults to the store's identity; adapters prefer the identifier of the
    /// last fetched representation.
    fn id(&self) -> Option<String> {
        let data = self.data();
        data.has_id().then(|| data.id().to_string())
    }

    /// Fetch the remote representation and remember it
    async fn get(&mut self) -> LifecycleResult<()>;

    /// Copy the last fetched representation into the configuration store
    ///
    /// Idempotent; does nothing when nothing has been fetched yet.
    fn set_data(&mut self) -> LifecycleResult<()>;

    /// Mark the resource as no longer existing
    fn void_state(&mut self) {
        self.data_mut().void();
    }

    /// Last known lifecycle label
    fn state(&self) -> Option<String> {
        None
    }

    /// Error detail the control plane attached to a FAILED resource
    fn failure_message(&self) -> Option<String> {
        None
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}

#[async_trait]
pub trait ResourceCreator: ResourceCrud {
    async fn create(&mut self) -> LifecycleResult<()>;
}

#[async_trait]
pub trait ResourceUpdater: ResourceCrud {
    async fn update(&mut self) -> LifecycleResult<()>;
}

#[async_trait]
pub trait ResourceDeleter: ResourceCrud {
    async fn delete(&mut self) -> LifecycleResult<()>;
}
