//! Simulated cloud SDK
//!
//! An in-process control plane standing in for the generated SDK. Resources
//! move through their lifecycle labels one step per observation (each `get`
//! call), so the orchestrator's polling sees the same sequence of transitional
//! and terminal states a real service reports. Missing resources are reported
//! as 404 [`ServiceError`]s.
//!
//! The whole control plane can be saved to and loaded from a JSON snapshot.

pub mod core_service;
pub mod load_balancer;
pub mod object_storage;

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use cumulus_core::ServiceError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use self::core_service::{Instance, Vcn};
use self::load_balancer::{LoadBalancer, WorkRequest};
use self::object_storage::Bucket;

pub use self::core_service::CoreClient;
pub use self::load_balancer::LoadBalancerClient;
pub use self::object_storage::ObjectStorageClient;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to access snapshot {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Knobs controlling how the simulated control plane behaves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimSettings {
    pub region: String,
    /// Observations a resource spends in a transitional state
    pub transition_observations: u32,
    /// Observations before an update becomes visible, for eventually consistent APIs
    pub propagation_observations: u32,
    /// Default page size of list calls
    pub page_size: usize,
    pub namespace: String,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            region: cumulus_core::config::DEFAULT_REGION.to_string(),
            transition_observations: 2,
            propagation_observations: 1,
            page_size: 50,
            namespace: "simtenancy".to_string(),
        }
    }
}

/// One scheduled change, applied when the resource is next observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Step {
    State(String),
    /// JSON merge of fields into the resource
    Patch(Value),
    Remove,
}

/// Record kept by the control plane for a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracked<T> {
    pub resource: T,
    #[serde(default)]
    pub upcoming: VecDeque<Step>,
}

impl<T> Tracked<T> {
    pub fn new(resource: T) -> Self {
        Self {
            resource,
            upcoming: VecDeque::new(),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.upcoming.is_empty()
    }
}

/// Resources that carry a lifecycle label
pub trait Lifecycle {
    fn lifecycle_state(&self) -> &str;
    fn set_lifecycle_state(&mut self, state: &str);
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CloudState {
    #[serde(default)]
    pub settings: SimSettings,
    #[serde(default)]
    pub vcns: BTreeMap<String, Tracked<Vcn>>,
    #[serde(default)]
    pub instances: BTreeMap<String, Tracked<Instance>>,
    #[serde(default)]
    pub load_balancers: BTreeMap<String, Tracked<LoadBalancer>>,
    #[serde(default)]
    pub work_requests: BTreeMap<String, Tracked<WorkRequest>>,
    /// Keyed by bucket name
    #[serde(default)]
    pub buckets: BTreeMap<String, Tracked<Bucket>>,
    /// Failure message for the next create of a resource kind
    #[serde(default)]
    pub injected_failures: BTreeMap<String, String>,
}

impl CloudState {
    /// Identifier in the `ocid1.<kind>.<region>.<unique>` format
    pub fn new_id(&self, kind: &str) -> String {
        format!(
            "ocid1.{}.{}.{}",
            kind,
            self.settings.region,
            Uuid::new_v4().simple()
        )
    }

    /// Steps through `through` into `to`
    pub fn transition(&self, through: &str, to: &str) -> VecDeque<Step> {
        let mut steps: VecDeque<Step> = (1..self.settings.transition_observations.max(1))
            .map(|_| Step::State(through.to_string()))
            .collect();
        steps.push_back(Step::State(to.to_string()));
        steps
    }

    pub fn take_failure(&mut self, kind: &str) -> Option<String> {
        self.injected_failures.remove(kind)
    }
}

/// Advance the record for `id` by one step and return what the caller sees
pub fn observe<T>(records: &mut BTreeMap<String, Tracked<T>>, id: &str) -> Option<T>
where
    T: Clone + Lifecycle + Serialize + DeserializeOwned,
{
    let step = records.get_mut(id)?.upcoming.pop_front();
    match step {
        Some(Step::Remove) => {
            records.remove(id);
            None
        }
        Some(step) => {
            let tracked = records.get_mut(id)?;
            apply(&mut tracked.resource, step);
            Some(tracked.resource.clone())
        }
        None => records.get(id).map(|t| t.resource.clone()),
    }
}

fn apply<T>(resource: &mut T, step: Step)
where
    T: Lifecycle + Serialize + DeserializeOwned,
{
    match step {
        Step::State(state) => resource.set_lifecycle_state(&state),
        Step::Patch(patch) => {
            let merged = serde_json::to_value(&*resource).map(|mut current| {
                if let (Some(target), Some(fields)) = (current.as_object_mut(), patch.as_object()) {
                    for (k, v) in fields {
                        target.insert(k.clone(), v.clone());
                    }
                }
                current
            });
            match merged.and_then(serde_json::from_value) {
                Ok(updated) => *resource = updated,
                Err(e) => log::warn!("dropping patch that does not fit the resource: {}", e),
            }
        }
        Step::Remove => {}
    }
}

pub fn not_found(what: &str, id: &str) -> ServiceError {
    ServiceError::not_found(format!(
        "Authorization failed or requested resource not found: {} {}",
        what, id
    ))
    .with_request_id(request_id())
}

pub fn conflict(message: impl Into<String>) -> ServiceError {
    ServiceError::conflict(message).with_request_id(request_id())
}

pub fn invalid_parameter(message: impl Into<String>) -> ServiceError {
    ServiceError::invalid_parameter(message).with_request_id(request_id())
}

pub fn request_id() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

/// Handle to the shared control plane; clones see the same resources
#[derive(Debug, Clone, Default)]
pub struct SimCloud {
    inner: Arc<Mutex<CloudState>>,
}

impl SimCloud {
    pub fn new(settings: SimSettings) -> Self {
        Self::from_state(CloudState {
            settings,
            ..Default::default()
        })
    }

    pub fn from_state(state: CloudState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, CloudState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn settings(&self) -> SimSettings {
        self.state().settings.clone()
    }

    /// Make the next create of `kind` end in FAILED with `message`
    pub fn inject_failure(&self, kind: &str, message: impl Into<String>) {
        self.state()
            .injected_failures
            .insert(kind.to_string(), message.into());
    }

    pub fn core(&self) -> CoreClient {
        CoreClient::new(self.clone())
    }

    pub fn load_balancer(&self) -> LoadBalancerClient {
        LoadBalancerClient::new(self.clone())
    }

    pub fn object_storage(&self) -> ObjectStorageClient {
        ObjectStorageClient::new(self.clone())
    }

    pub fn resource_count(&self) -> usize {
        let state = self.state();
        state.vcns.len() + state.instances.len() + state.load_balancers.len() + state.buckets.len()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&*self.state())
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let path_str = path.display().to_string();
        let json = self.to_json().map_err(|source| SnapshotError::Json {
            path: path_str.clone(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| SnapshotError::Io {
            path: path_str,
            source,
        })
    }

    /// Load a snapshot; a missing file yields an empty cloud with `settings`
    pub fn load_or_new(path: &Path, settings: SimSettings) -> Result<Self, SnapshotError> {
        let path_str = path.display().to_string();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no snapshot at {}, starting an empty cloud", path_str);
                return Ok(Self::new(settings));
            }
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: path_str,
                    source,
                });
            }
        };
        let state: CloudState = serde_json::from_str(&content).map_err(|source| {
            SnapshotError::Json {
                path: path_str,
                source,
            }
        })?;
        Ok(Self::from_state(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::core_service::CreateVcnDetails;

    fn vcn_details() -> CreateVcnDetails {
        CreateVcnDetails {
            compartment_id: "ocid1.compartment.sim..root".to_string(),
            cidr_block: "10.0.0.0/16".to_string(),
            display_name: Some("main".to_string()),
            dns_label: None,
        }
    }

    #[test]
    fn transition_schedules_intermediate_observations() {
        let state = CloudState {
            settings: SimSettings {
                transition_observations: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        let steps: Vec<Step> = state.transition("PROVISIONING", "AVAILABLE").into();
        assert_eq!(
            steps,
            vec![
                Step::State("PROVISIONING".to_string()),
                Step::State("PROVISIONING".to_string()),
                Step::State("AVAILABLE".to_string()),
            ]
        );
    }

    #[test]
    fn ids_carry_kind_and_region() {
        let state = CloudState::default();
        let id = state.new_id("vcn");
        assert!(id.starts_with("ocid1.vcn.sim-phoenix-1."));
        assert_ne!(id, state.new_id("vcn"));
    }

    #[tokio::test]
    async fn snapshot_round_trip_keeps_pending_steps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.json");

        let cloud = SimCloud::default();
        let vcn = cloud.core().create_vcn(vcn_details()).await.unwrap();
        cloud.save(&path).unwrap();

        let restored = SimCloud::load_or_new(&path, SimSettings::default()).unwrap();
        assert_eq!(restored.resource_count(), 1);
        let core = restored.core();
        assert_eq!(core.get_vcn(&vcn.id).await.unwrap().lifecycle_state, "PROVISIONING");
        assert_eq!(core.get_vcn(&vcn.id).await.unwrap().lifecycle_state, "AVAILABLE");
    }

    #[test]
    fn missing_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = SimCloud::load_or_new(&dir.path().join("none.json"), SimSettings::default()).unwrap();
        assert_eq!(cloud.resource_count(), 0);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = SimCloud::load_or_new(&path, SimSettings::default()).unwrap_err();
        assert!(matches!(err, SnapshotError::Json { .. }));
    }

    #[test]
    fn observe_applies_patches_and_removal() {
        let mut records = BTreeMap::new();
        let mut tracked = Tracked::new(Vcn {
            id: "v1".to_string(),
            compartment_id: "c".to_string(),
            cidr_block: "10.0.0.0/16".to_string(),
            display_name: "old".to_string(),
            dns_label: None,
            lifecycle_state: "AVAILABLE".to_string(),
            time_created: chrono::Utc::now(),
        });
        tracked.upcoming = VecDeque::from(vec![
            Step::Patch(serde_json::json!({"display_name": "new"})),
            Step::Remove,
        ]);
        records.insert("v1".to_string(), tracked);

        assert_eq!(observe(&mut records, "v1").unwrap().display_name, "new");
        assert!(observe(&mut records, "v1").is_none());
        assert!(records.is_empty());
    }
}
