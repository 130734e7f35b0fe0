//! Resource adapters for the simulated cloud
//!
//! This module defines:
//! - Resource type definitions (names, required and replace-on-change attributes)
//! - The context shared by every adapter instance
//! - One adapter per resource type, implementing the lifecycle capability traits

pub mod bucket;
pub mod instance;
pub mod load_balancer;
pub mod vcn;
pub mod vcns;

use std::sync::Arc;

use cumulus_core::metrics::MetricsSink;
use cumulus_core::{Capabilities, ProviderConfig, ResourceData, SharedMutex};
use serde_json::Value;

pub use bucket::BucketResource;
pub use instance::InstanceResource;
pub use load_balancer::LoadBalancerResource;
pub use vcn::VcnResource;
pub use vcns::VcnsDataSource;

pub const VCN: &str = "sim_core_vcn";
pub const INSTANCE: &str = "sim_core_instance";
pub const LOAD_BALANCER: &str = "sim_load_balancer";
pub const BUCKET: &str = "sim_objectstorage_bucket";
pub const VCNS: &str = "sim_core_vcns";

// =============================================================================
// Resource Type Definitions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Resource,
    DataSource,
}

/// Static description of a resource type
pub trait ResourceType: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> TypeKind;
    /// Attributes that must be configured for create (or read, for data sources)
    fn required_attributes(&self) -> &'static [&'static str];
    /// Attributes whose change requires replacing the resource
    fn force_new_attributes(&self) -> &'static [&'static str];
}

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $kind:expr, required: [$($req:expr),*], force_new: [$($fnew:expr),*]) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn kind(&self) -> TypeKind {
                $kind
            }
            fn required_attributes(&self) -> &'static [&'static str] {
                &[$($req),*]
            }
            fn force_new_attributes(&self) -> &'static [&'static str] {
                &[$($fnew),*]
            }
        }
    };
}

define_resource_type!(VcnType, VCN, TypeKind::Resource,
    required: ["compartment_id", "cidr_block"],
    force_new: ["compartment_id", "cidr_block", "dns_label"]);
define_resource_type!(InstanceType, INSTANCE, TypeKind::Resource,
    required: ["compartment_id", "availability_domain", "shape"],
    force_new: ["compartment_id", "availability_domain", "subnet_id"]);
define_resource_type!(LoadBalancerType, LOAD_BALANCER, TypeKind::Resource,
    required: ["compartment_id", "display_name", "shape", "subnet_ids"],
    force_new: ["compartment_id", "shape", "subnet_ids", "is_private"]);
define_resource_type!(BucketType, BUCKET, TypeKind::Resource,
    required: ["compartment_id", "name"],
    force_new: ["compartment_id", "name"]);
define_resource_type!(VcnsType, VCNS, TypeKind::DataSource,
    required: ["compartment_id"],
    force_new: []);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(VcnType),
        Box::new(InstanceType),
        Box::new(LoadBalancerType),
        Box::new(BucketType),
        Box::new(VcnsType),
    ]
}

pub fn resource_type(name: &str) -> Option<Box<dyn ResourceType>> {
    resource_types().into_iter().find(|t| t.name() == name)
}

// =============================================================================
// Adapter Context
// =============================================================================

/// Settings every adapter instance of one provider shares
#[derive(Clone)]
pub struct AdapterContext {
    pub config: ProviderConfig,
    pub metrics: Option<Arc<dyn MetricsSink>>,
    /// Serializes load balancer operations across adapter instances
    pub load_balancer_mutex: SharedMutex,
}

impl AdapterContext {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            metrics: None,
            load_balancer_mutex: SharedMutex::default(),
        }
    }

    /// Complete an adapter's declared capabilities with provider-wide tuning
    pub fn capabilities(&self, declared: Capabilities) -> Capabilities {
        let caps = self.config.apply_to(declared);
        match &self.metrics {
            Some(sink) => caps.metrics(sink.clone()),
            None => caps,
        }
    }
}

/// Configured string value
pub(crate) fn config_str(data: &ResourceData, key: &str) -> Option<String> {
    data.get_config(key).and_then(Value::as_str).map(str::to_string)
}

/// Configured string value, only when it differs from the persisted one
pub(crate) fn changed_str(data: &ResourceData, key: &str) -> Option<String> {
    config_str(data, key).filter(|_| data.has_change(key))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use cumulus_core::ResourceTimeouts;
    use std::time::Duration;

    pub const COMPARTMENT: &str = "ocid1.compartment.sim..root";

    pub fn context() -> AdapterContext {
        AdapterContext::new(ProviderConfig::default())
    }

    pub fn data(type_name: &str, config: Value) -> ResourceData {
        ResourceData::new(type_name)
            .with_config(config.as_object().cloned().unwrap_or_default())
            .with_timeouts(ResourceTimeouts::uniform(Duration::from_secs(600)))
    }
}
