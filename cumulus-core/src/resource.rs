//! ResourceData - the configuration store a lifecycle invocation reads from and writes to
//!
//! Holds the desired configuration for one resource instance, the attributes
//! last persisted for it, its identity and its per-verb timeouts. Adapters read
//! configuration from it when building requests and flatten remote
//! representations back into it in `set_data`.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{LifecycleError, LifecycleResult};
use crate::timeouts::{ResourceTimeouts, Verb};

/// Configuration store for a single resource instance
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceData {
    type_name: String,
    /// Empty when the resource does not (or no longer) exist
    id: String,
    config: Map<String, Value>,
    attributes: Map<String, Value>,
    timeouts: ResourceTimeouts,
}

impl ResourceData {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ResourceTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Forget the identity; the next apply recreates the resource
    pub fn void(&mut self) {
        self.id.clear();
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn timeouts(&self) -> &ResourceTimeouts {
        &self.timeouts
    }

    pub fn timeout(&self, verb: Verb) -> Duration {
        self.timeouts.get(verb)
    }

    /// Persisted attribute if set, otherwise the configured value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes
            .get(key)
            .filter(|v| !v.is_null())
            .or_else(|| self.config.get(key))
            .filter(|v| !v.is_null())
    }

    /// Configured value only, ignoring anything persisted
    pub fn get_config(&self, key: &str) -> Option<&Value> {
        self.config.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// String list, skipping non-string members
    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }

    pub fn require_str(&self, key: &str) -> LifecycleResult<&str> {
        self.get_str(key).ok_or_else(|| {
            LifecycleError::data(format!(
                "{}: missing required attribute '{}'",
                self.type_name, key
            ))
        })
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Set when present, remove when absent
    pub fn set_opt<V: Into<Value>>(&mut self, key: impl Into<String>, value: Option<V>) {
        let key = key.into();
        match value {
            Some(v) => {
                self.attributes.insert(key, v.into());
            }
            None => {
                self.attributes.remove(&key);
            }
        }
    }

    /// Whether the configured value differs from the persisted one
    pub fn has_change(&self, key: &str) -> bool {
        match self.get_config(key) {
            Some(configured) => self.attributes.get(key) != Some(configured),
            None => false,
        }
    }

    /// Every key that `has_change` reports, in configuration order
    pub fn changed_keys(&self) -> Vec<&str> {
        self.config
            .keys()
            .filter(|k| self.has_change(k))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn get_prefers_persisted_attributes() {
        let mut data = ResourceData::new("sim_core_vcn")
            .with_config(config(json!({"display_name": "wanted", "cidr_block": "10.0.0.0/16"})));
        assert_eq!(data.get_str("display_name"), Some("wanted"));

        data.set("display_name", "actual");
        assert_eq!(data.get_str("display_name"), Some("actual"));
        assert_eq!(data.get_str("cidr_block"), Some("10.0.0.0/16"));
    }

    #[test]
    fn void_clears_identity_only() {
        let mut data = ResourceData::new("sim_core_vcn").with_id("ocid1.vcn.sim..1");
        data.set("state", "AVAILABLE");
        assert!(data.has_id());

        data.void();
        assert!(!data.has_id());
        assert_eq!(data.get_str("state"), Some("AVAILABLE"));
    }

    #[test]
    fn has_change_compares_config_with_persisted() {
        let mut data = ResourceData::new("sim_core_vcn")
            .with_config(config(json!({"display_name": "new", "cidr_block": "10.0.0.0/16"})));
        data.set("display_name", "old");
        data.set("cidr_block", "10.0.0.0/16");

        assert!(data.has_change("display_name"));
        assert!(!data.has_change("cidr_block"));
        assert!(!data.has_change("unknown"));
        assert_eq!(data.changed_keys(), vec!["display_name"]);
    }

    #[test]
    fn set_opt_removes_absent_values() {
        let mut data = ResourceData::new("sim_core_vcn");
        data.set_opt("dns_label", Some("main"));
        assert_eq!(data.get_str("dns_label"), Some("main"));
        data.set_opt::<String>("dns_label", None);
        assert_eq!(data.get("dns_label"), None);
    }

    #[test]
    fn require_str_reports_missing_attribute() {
        let data = ResourceData::new("sim_core_vcn");
        let err = data.require_str("compartment_id").unwrap_err();
        assert!(err.to_string().contains("compartment_id"));
    }

    #[test]
    fn null_values_are_treated_as_absent() {
        let mut data = ResourceData::new("sim_core_vcn").with_config(config(json!({"dns_label": "cfg"})));
        data.set("dns_label", Value::Null);
        assert_eq!(data.get_str("dns_label"), Some("cfg"));
    }

    #[test]
    fn string_lists() {
        let data = ResourceData::new("sim_load_balancer")
            .with_config(config(json!({"subnet_ids": ["a", "b", 3]})));
        assert_eq!(
            data.get_str_list("subnet_ids"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }
}
