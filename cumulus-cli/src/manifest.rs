//! Manifest of desired resources
//!
//! ```json
//! {
//!   "resources": [
//!     { "type": "sim_core_vcn", "name": "main",
//!       "config": { "compartment_id": "ocid1.compartment.sim..root", "cidr_block": "10.0.0.0/16" },
//!       "timeouts": { "create": "10m" } },
//!     { "type": "sim_core_instance", "name": "web",
//!       "config": { "subnet_id": "${sim_core_vcn.main.id}", ... } }
//!   ]
//! }
//! ```
//!
//! A string of the form `${type.name.attribute}` is replaced with that
//! attribute of a resource applied earlier in the same run.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use cumulus_core::timeouts::parse_duration;
use cumulus_core::{ResourceTimeouts, Verb};
use cumulus_state::StateFile;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSpec {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Per-verb overrides such as `{"create": "45m"}`
    #[serde(default)]
    pub timeouts: BTreeMap<String, String>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for resource in &self.resources {
            if resource.name.is_empty() {
                bail!("{}: name must not be empty", resource.resource_type);
            }
            if !seen.insert((resource.resource_type.as_str(), resource.name.as_str())) {
                bail!(
                    "{}.{} is declared more than once",
                    resource.resource_type,
                    resource.name
                );
            }
        }
        Ok(())
    }

    pub fn contains(&self, resource_type: &str, name: &str) -> bool {
        self.resources
            .iter()
            .any(|r| r.resource_type == resource_type && r.name == name)
    }
}

impl ResourceSpec {
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    /// Provider defaults with this resource's overrides applied
    pub fn timeouts(&self, defaults: ResourceTimeouts) -> Result<ResourceTimeouts> {
        let mut timeouts = defaults;
        for (key, value) in &self.timeouts {
            let verb = match key.as_str() {
                "create" => Verb::Create,
                "read" => Verb::Read,
                "update" => Verb::Update,
                "delete" => Verb::Delete,
                other => bail!("{}: unknown timeout '{}'", self.address(), other),
            };
            let duration =
                parse_duration(value).with_context(|| format!("{}: timeouts.{}", self.address(), key))?;
            timeouts = timeouts.with(verb, duration);
        }
        Ok(timeouts)
    }

    /// Configuration with every `${type.name.attribute}` reference replaced
    pub fn resolved_config(&self, state: &StateFile) -> Result<Map<String, Value>> {
        self.config
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve(v, state)?)))
            .collect()
    }
}

fn resolve(value: &Value, state: &StateFile) -> Result<Value> {
    match value {
        Value::String(s) => match parse_reference(s) {
            Some((resource_type, name, attribute)) => lookup(state, resource_type, name, attribute)
                .with_context(|| format!("Cannot resolve {}", s)),
            None => Ok(value.clone()),
        },
        Value::Array(items) => items
            .iter()
            .map(|v| resolve(v, state))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve(v, state)?)))
            .collect::<Result<Map<_, _>>>()
            .map(Value::Object),
        _ => Ok(value.clone()),
    }
}

/// Split `${type.name.attribute}` into its parts
fn parse_reference(s: &str) -> Option<(&str, &str, &str)> {
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;
    let mut parts = inner.splitn(3, '.');
    let resource_type = parts.next()?;
    let name = parts.next()?;
    let attribute = parts.next()?;
    [resource_type, name, attribute]
        .iter()
        .all(|p| !p.is_empty())
        .then_some((resource_type, name, attribute))
}

fn lookup(state: &StateFile, resource_type: &str, name: &str, attribute: &str) -> Result<Value> {
    let Some(resource) = state.find_resource(resource_type, name) else {
        bail!("{}.{} has not been applied", resource_type, name);
    };
    if attribute == "id" {
        return Ok(Value::String(resource.id.clone()));
    }
    resource
        .attributes
        .get(attribute)
        .cloned()
        .with_context(|| format!("{}.{} has no attribute '{}'", resource_type, name, attribute))
}
