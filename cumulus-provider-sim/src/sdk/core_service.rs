//! Core services: virtual cloud networks and compute instances

use chrono::{DateTime, Utc};
use cumulus_core::ServiceError;
use serde::{Deserialize, Serialize};

use super::{
    Lifecycle, SimCloud, Step, Tracked, conflict, invalid_parameter, not_found, observe,
};

pub mod vcn_state {
    pub const PROVISIONING: &str = "PROVISIONING";
    pub const AVAILABLE: &str = "AVAILABLE";
    pub const UPDATING: &str = "UPDATING";
    pub const TERMINATING: &str = "TERMINATING";
    pub const TERMINATED: &str = "TERMINATED";
    pub const FAILED: &str = "FAILED";
}

pub mod instance_state {
    pub const PROVISIONING: &str = "PROVISIONING";
    pub const STARTING: &str = "STARTING";
    pub const RUNNING: &str = "RUNNING";
    pub const STOPPING: &str = "STOPPING";
    pub const STOPPED: &str = "STOPPED";
    pub const TERMINATING: &str = "TERMINATING";
    pub const TERMINATED: &str = "TERMINATED";
    pub const FAILED: &str = "FAILED";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vcn {
    pub id: String,
    pub compartment_id: String,
    pub cidr_block: String,
    pub display_name: String,
    #[serde(default)]
    pub dns_label: Option<String>,
    pub lifecycle_state: String,
    pub time_created: DateTime<Utc>,
}

impl Lifecycle for Vcn {
    fn lifecycle_state(&self) -> &str {
        &self.lifecycle_state
    }

    fn set_lifecycle_state(&mut self, state: &str) {
        self.lifecycle_state = state.to_string();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub compartment_id: String,
    pub availability_domain: String,
    pub shape: String,
    pub display_name: String,
    #[serde(default)]
    pub subnet_id: Option<String>,
    pub lifecycle_state: String,
    /// Set when the instance ends in FAILED
    #[serde(default)]
    pub lifecycle_details: Option<String>,
    pub time_created: DateTime<Utc>,
}

impl Lifecycle for Instance {
    fn lifecycle_state(&self) -> &str {
        &self.lifecycle_state
    }

    fn set_lifecycle_state(&mut self, state: &str) {
        self.lifecycle_state = state.to_string();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateVcnDetails {
    pub compartment_id: String,
    pub cidr_block: String,
    pub display_name: Option<String>,
    pub dns_label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateVcnDetails {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListVcnsRequest {
    pub compartment_id: String,
    pub display_name: Option<String>,
    pub lifecycle_state: Option<String>,
    pub limit: Option<usize>,
    /// Opaque token from a previous response
    pub page: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListVcnsResponse {
    pub items: Vec<Vcn>,
    pub opc_next_page: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchInstanceDetails {
    pub compartment_id: String,
    pub availability_domain: String,
    pub shape: String,
    pub display_name: Option<String>,
    pub subnet_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateInstanceDetails {
    pub display_name: Option<String>,
    /// Changing the shape reboots the instance
    pub shape: Option<String>,
}

/// Client for the core services (networking and compute)
#[derive(Debug, Clone)]
pub struct CoreClient {
    cloud: SimCloud,
}

impl CoreClient {
    pub fn new(cloud: SimCloud) -> Self {
        Self { cloud }
    }

    // =========================================================================
    // Virtual Cloud Networks
    // =========================================================================

    pub async fn create_vcn(&self, details: CreateVcnDetails) -> Result<Vcn, ServiceError> {
        validate_cidr(&details.cidr_block)?;
        if details.compartment_id.is_empty() {
            return Err(invalid_parameter("compartmentId must be specified"));
        }

        let mut state = self.cloud.state();
        let id = state.new_id("vcn");
        let vcn = Vcn {
            id: id.clone(),
            compartment_id: details.compartment_id,
            cidr_block: details.cidr_block,
            display_name: details.display_name.unwrap_or_else(|| default_name("vcn")),
            dns_label: details.dns_label,
            lifecycle_state: vcn_state::PROVISIONING.to_string(),
            time_created: Utc::now(),
        };

        let upcoming = match state.take_failure("vcn") {
            Some(_) => state.transition(vcn_state::PROVISIONING, vcn_state::FAILED),
            None => state.transition(vcn_state::PROVISIONING, vcn_state::AVAILABLE),
        };
        state.vcns.insert(
            id,
            Tracked {
                resource: vcn.clone(),
                upcoming,
            },
        );
        log::debug!("sim: created vcn {}", vcn.id);
        Ok(vcn)
    }

    pub async fn get_vcn(&self, vcn_id: &str) -> Result<Vcn, ServiceError> {
        observe(&mut self.cloud.state().vcns, vcn_id).ok_or_else(|| not_found("Vcn", vcn_id))
    }

    pub async fn update_vcn(
        &self,
        vcn_id: &str,
        details: UpdateVcnDetails,
    ) -> Result<Vcn, ServiceError> {
        let mut state = self.cloud.state();
        let upcoming = state.transition(vcn_state::UPDATING, vcn_state::AVAILABLE);
        let tracked = state
            .vcns
            .get_mut(vcn_id)
            .ok_or_else(|| not_found("Vcn", vcn_id))?;
        require_settled(tracked, vcn_state::AVAILABLE, "Vcn")?;

        if let Some(name) = details.display_name {
            tracked.resource.display_name = name;
        }
        tracked.resource.set_lifecycle_state(vcn_state::UPDATING);
        tracked.upcoming = upcoming;
        Ok(tracked.resource.clone())
    }

    pub async fn delete_vcn(&self, vcn_id: &str) -> Result<(), ServiceError> {
        let mut state = self.cloud.state();
        let mut upcoming = state.transition(vcn_state::TERMINATING, vcn_state::TERMINATED);
        upcoming.push_back(Step::Remove);

        let instances_in_use = state.instances.values().any(|i| {
            i.resource.subnet_id.as_deref() == Some(vcn_id)
                && i.resource.lifecycle_state != instance_state::TERMINATED
        });
        let tracked = state
            .vcns
            .get_mut(vcn_id)
            .ok_or_else(|| not_found("Vcn", vcn_id))?;
        match tracked.resource.lifecycle_state.as_str() {
            vcn_state::TERMINATED => return Err(not_found("Vcn", vcn_id)),
            vcn_state::TERMINATING => {
                return Err(conflict(format!("Vcn {} is already being deleted", vcn_id)));
            }
            _ => {}
        }
        if instances_in_use {
            return Err(conflict(format!(
                "Vcn {} still has running instances attached",
                vcn_id
            )));
        }

        tracked.resource.set_lifecycle_state(vcn_state::TERMINATING);
        tracked.upcoming = upcoming;
        Ok(())
    }

    /// One page of VCNs in a compartment, oldest first
    pub async fn list_vcns(&self, request: ListVcnsRequest) -> Result<ListVcnsResponse, ServiceError> {
        let state = self.cloud.state();
        let limit = request.limit.unwrap_or(state.settings.page_size).max(1);
        let offset = match request.page.as_deref() {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| invalid_parameter(format!("invalid page token '{}'", token)))?,
            None => 0,
        };

        let mut matching: Vec<&Vcn> = state
            .vcns
            .values()
            .map(|t| &t.resource)
            .filter(|v| v.compartment_id == request.compartment_id)
            .filter(|v| {
                request
                    .display_name
                    .as_ref()
                    .is_none_or(|n| &v.display_name == n)
            })
            .filter(|v| {
                request
                    .lifecycle_state
                    .as_ref()
                    .is_none_or(|s| &v.lifecycle_state == s)
            })
            .collect();
        matching.sort_by(|a, b| a.time_created.cmp(&b.time_created).then(a.id.cmp(&b.id)));

        let end = (offset + limit).min(matching.len());
        let items = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|v| (*v).clone())
            .collect();
        let opc_next_page = (end < matching.len()).then(|| end.to_string());
        Ok(ListVcnsResponse {
            items,
            opc_next_page,
        })
    }

    // =========================================================================
    // Compute Instances
    // =========================================================================

    pub async fn launch_instance(
        &self,
        details: LaunchInstanceDetails,
    ) -> Result<Instance, ServiceError> {
        if details.shape.is_empty() {
            return Err(invalid_parameter("shape must be specified"));
        }

        let mut state = self.cloud.state();
        let id = state.new_id("instance");
        let failure = state.take_failure("instance");

        let mut upcoming = state.transition(instance_state::PROVISIONING, instance_state::STARTING);
        match &failure {
            Some(_) => {
                upcoming.pop_back();
                upcoming.push_back(Step::State(instance_state::FAILED.to_string()));
            }
            None => upcoming.push_back(Step::State(instance_state::RUNNING.to_string())),
        }

        let instance = Instance {
            id: id.clone(),
            compartment_id: details.compartment_id,
            availability_domain: details.availability_domain,
            shape: details.shape,
            display_name: details.display_name.unwrap_or_else(|| default_name("instance")),
            subnet_id: details.subnet_id,
            lifecycle_state: instance_state::PROVISIONING.to_string(),
            lifecycle_details: failure,
            time_created: Utc::now(),
        };
        state.instances.insert(
            id,
            Tracked {
                resource: instance.clone(),
                upcoming,
            },
        );
        log::debug!("sim: launched instance {}", instance.id);
        Ok(instance)
    }

    pub async fn get_instance(&self, instance_id: &str) -> Result<Instance, ServiceError> {
        observe(&mut self.cloud.state().instances, instance_id)
            .ok_or_else(|| not_found("Instance", instance_id))
    }

    pub async fn update_instance(
        &self,
        instance_id: &str,
        details: UpdateInstanceDetails,
    ) -> Result<Instance, ServiceError> {
        let mut state = self.cloud.state();
        let mut reboot = state.transition(instance_state::STOPPING, instance_state::STOPPED);
        reboot.push_back(Step::State(instance_state::STARTING.to_string()));
        reboot.push_back(Step::State(instance_state::RUNNING.to_string()));

        let tracked = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| not_found("Instance", instance_id))?;
        require_settled(tracked, instance_state::RUNNING, "Instance")?;

        if let Some(name) = details.display_name {
            tracked.resource.display_name = name;
        }
        if let Some(shape) = details.shape.filter(|s| *s != tracked.resource.shape) {
            tracked.resource.shape = shape;
            tracked.resource.set_lifecycle_state(instance_state::STOPPING);
            tracked.upcoming = reboot;
        }
        Ok(tracked.resource.clone())
    }

    pub async fn terminate_instance(&self, instance_id: &str) -> Result<(), ServiceError> {
        let mut state = self.cloud.state();
        let mut upcoming = state.transition(instance_state::TERMINATING, instance_state::TERMINATED);
        upcoming.push_back(Step::Remove);

        let tracked = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| not_found("Instance", instance_id))?;
        if tracked.resource.lifecycle_state == instance_state::TERMINATED {
            return Err(not_found("Instance", instance_id));
        }
        tracked.resource.set_lifecycle_state(instance_state::TERMINATING);
        tracked.upcoming = upcoming;
        Ok(())
    }
}

fn require_settled<T: Lifecycle>(
    tracked: &Tracked<T>,
    expected: &str,
    what: &str,
) -> Result<(), ServiceError> {
    let current = tracked.resource.lifecycle_state();
    if !tracked.is_settled() || current != expected {
        return Err(conflict(format!(
            "{} is in state {} and cannot be updated",
            what, current
        )));
    }
    Ok(())
}

fn validate_cidr(cidr: &str) -> Result<(), ServiceError> {
    let valid = cidr.split_once('/').is_some_and(|(addr, prefix)| {
        addr.split('.').filter(|o| o.parse::<u8>().is_ok()).count() == 4
            && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
    });
    if valid {
        Ok(())
    } else {
        Err(invalid_parameter(format!("invalid CIDR block '{}'", cidr)))
    }
}

fn default_name(kind: &str) -> String {
    format!("{}{}", kind, Utc::now().format("%Y%m%d%H%M%S"))
}
