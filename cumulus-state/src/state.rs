//! State file structures for persisting managed resources

use cumulus_core::{ResourceData, ResourceTimeouts};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::{BackendError, BackendResult};

/// The state file persisted by a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Identifies one state history; a write from another lineage is refused
    pub lineage: String,
    /// Version of Cumulus that last wrote this state
    pub cumulus_version: String,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            cumulus_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Increment serial and record the writing version
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.cumulus_version = env!("CARGO_PKG_VERSION").to_string();
    }

    /// Refuse to replace `stored` with a state from a different history
    pub fn check_lineage(&self, stored: &StateFile) -> BackendResult<()> {
        if self.lineage != stored.lineage {
            return Err(BackendError::LineageMismatch {
                expected: stored.lineage.clone(),
                actual: self.lineage.clone(),
            });
        }
        if self.version > Self::CURRENT_VERSION || stored.version > Self::CURRENT_VERSION {
            return Err(BackendError::InvalidState(format!(
                "state version {} is newer than supported version {}",
                self.version.max(stored.version),
                Self::CURRENT_VERSION
            )));
        }
        Ok(())
    }

    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    pub fn find_resource_mut(
        &mut self,
        resource_type: &str,
        name: &str,
    ) -> Option<&mut ResourceState> {
        self.resources
            .iter_mut()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Add or replace a resource
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        if let Some(existing) = self.find_resource_mut(&resource.resource_type, &resource.name) {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    pub fn remove_resource(&mut self, resource_type: &str, name: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(pos))
    }

    /// Store the outcome of a lifecycle call; a voided resource is dropped
    pub fn record(&mut self, name: &str, provider: &str, data: &ResourceData) {
        if data.has_id() {
            self.upsert_resource(ResourceState::from_data(name, provider, data));
        } else if self.remove_resource(data.type_name(), name).is_some() {
            log::debug!("removed {}.{} from state", data.type_name(), name);
        }
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g. "sim_core_vcn")
    pub resource_type: String,
    /// Name given in the manifest
    pub name: String,
    pub provider: String,
    /// Remote identifier
    pub id: String,
    /// Attributes as last read from the provider
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            id: id.into(),
            attributes: Map::new(),
        }
    }

    pub fn from_data(name: &str, provider: &str, data: &ResourceData) -> Self {
        Self {
            attributes: data.attributes().clone(),
            ..Self::new(data.type_name(), name, provider, data.id())
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Rebuild the configuration store for the next lifecycle call
    pub fn to_data(&self, config: Map<String, Value>, timeouts: ResourceTimeouts) -> ResourceData {
        ResourceData::new(&self.resource_type)
            .with_id(&self.id)
            .with_attributes(self.attributes.clone())
            .with_config(config)
            .with_timeouts(timeouts)
    }
}
