//! Load balancer service
//!
//! Every mutating call answers with a work request id. The load balancer and
//! its work request advance independently, each when it is observed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cumulus_core::ServiceError;
use cumulus_core::error::LifecycleResult;
use cumulus_core::lifecycle::{CANCELED, FAILED, SUCCEEDED};
use cumulus_core::work_request::{ACCEPTED, IN_PROGRESS, WorkRequestFetcher, WorkRequestStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{CloudState, Lifecycle, SimCloud, Step, Tracked, conflict, invalid_parameter, not_found, observe};

pub mod lb_state {
    pub const CREATING: &str = "CREATING";
    pub const ACTIVE: &str = "ACTIVE";
    pub const FAILED: &str = "FAILED";
    pub const DELETING: &str = "DELETING";
    pub const DELETED: &str = "DELETED";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub compartment_id: String,
    pub display_name: String,
    pub shape_name: String,
    pub subnet_ids: Vec<String>,
    pub is_private: bool,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    pub lifecycle_state: String,
    pub time_created: DateTime<Utc>,
}

impl Lifecycle for LoadBalancer {
    fn lifecycle_state(&self) -> &str {
        &self.lifecycle_state
    }

    fn set_lifecycle_state(&mut self, state: &str) {
        self.lifecycle_state = state.to_string();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRequestError {
    pub error_code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub id: String,
    pub load_balancer_id: String,
    /// e.g. "CreateLoadBalancer"
    pub operation_type: String,
    pub lifecycle_state: String,
    #[serde(default)]
    pub error_details: Vec<WorkRequestError>,
    pub time_accepted: DateTime<Utc>,
}

impl Lifecycle for WorkRequest {
    fn lifecycle_state(&self) -> &str {
        &self.lifecycle_state
    }

    fn set_lifecycle_state(&mut self, state: &str) {
        self.lifecycle_state = state.to_string();
    }
}

impl WorkRequest {
    pub fn is_finished(&self) -> bool {
        [SUCCEEDED, FAILED, CANCELED].contains(&self.lifecycle_state.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateLoadBalancerDetails {
    pub compartment_id: String,
    pub display_name: String,
    pub shape_name: String,
    pub subnet_ids: Vec<String>,
    pub is_private: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateLoadBalancerDetails {
    pub display_name: Option<String>,
}

/// Response of every mutating call
#[derive(Debug, Clone, PartialEq)]
pub struct WorkRequestResponse {
    pub opc_work_request_id: String,
}

#[derive(Debug, Clone)]
pub struct LoadBalancerClient {
    cloud: SimCloud,
}

impl LoadBalancerClient {
    pub fn new(cloud: SimCloud) -> Self {
        Self { cloud }
    }

    pub async fn create_load_balancer(
        &self,
        details: CreateLoadBalancerDetails,
    ) -> Result<WorkRequestResponse, ServiceError> {
        if details.subnet_ids.is_empty() {
            return Err(invalid_parameter("subnetIds must contain at least one subnet"));
        }

        let mut state = self.cloud.state();
        let id = state.new_id("loadbalancer");
        let failure = state.take_failure("loadbalancer");

        let mut upcoming = match failure {
            Some(_) => state.transition(lb_state::CREATING, lb_state::FAILED),
            None => state.transition(lb_state::CREATING, lb_state::ACTIVE),
        };
        if failure.is_some() {
            upcoming.push_back(Step::Remove);
        }

        let ip_suffix = state.load_balancers.len() + 10;
        let lb = LoadBalancer {
            id: id.clone(),
            compartment_id: details.compartment_id,
            display_name: details.display_name,
            shape_name: details.shape_name,
            subnet_ids: details.subnet_ids,
            is_private: details.is_private,
            ip_addresses: vec![format!("10.0.0.{}", ip_suffix)],
            lifecycle_state: lb_state::CREATING.to_string(),
            time_created: Utc::now(),
        };
        state.load_balancers.insert(id.clone(), Tracked { resource: lb, upcoming });

        let work_request_id = start_work_request(&mut state, &id, "CreateLoadBalancer", failure);
        Ok(WorkRequestResponse {
            opc_work_request_id: work_request_id,
        })
    }

    pub async fn get_load_balancer(&self, load_balancer_id: &str) -> Result<LoadBalancer, ServiceError> {
        observe(&mut self.cloud.state().load_balancers, load_balancer_id)
            .ok_or_else(|| not_found("LoadBalancer", load_balancer_id))
    }

    pub async fn update_load_balancer(
        &self,
        load_balancer_id: &str,
        details: UpdateLoadBalancerDetails,
    ) -> Result<WorkRequestResponse, ServiceError> {
        let mut state = self.cloud.state();
        ensure_idle(&state, load_balancer_id)?;

        let tracked = state
            .load_balancers
            .get_mut(load_balancer_id)
            .ok_or_else(|| not_found("LoadBalancer", load_balancer_id))?;
        if tracked.resource.lifecycle_state != lb_state::ACTIVE {
            return Err(conflict(format!(
                "Invalid State Transition of LoadBalancer {} from {}",
                load_balancer_id, tracked.resource.lifecycle_state
            )));
        }
        if let Some(name) = details.display_name {
            tracked.upcoming.push_back(Step::Patch(json!({ "display_name": name })));
        }

        let work_request_id = start_work_request(&mut state, load_balancer_id, "UpdateLoadBalancer", None);
        Ok(WorkRequestResponse {
            opc_work_request_id: work_request_id,
        })
    }

    pub async fn delete_load_balancer(
        &self,
        load_balancer_id: &str,
    ) -> Result<WorkRequestResponse, ServiceError> {
        let mut state = self.cloud.state();
        ensure_idle(&state, load_balancer_id)?;

        let mut upcoming = state.transition(lb_state::DELETING, lb_state::DELETED);
        upcoming.push_back(Step::Remove);
        let tracked = state
            .load_balancers
            .get_mut(load_balancer_id)
            .ok_or_else(|| not_found("LoadBalancer", load_balancer_id))?;
        if tracked.resource.lifecycle_state == lb_state::DELETED {
            return Err(not_found("LoadBalancer", load_balancer_id));
        }
        tracked.resource.set_lifecycle_state(lb_state::DELETING);
        tracked.upcoming = upcoming;

        let work_request_id = start_work_request(&mut state, load_balancer_id, "DeleteLoadBalancer", None);
        Ok(WorkRequestResponse {
            opc_work_request_id: work_request_id,
        })
    }

    pub async fn get_work_request(&self, work_request_id: &str) -> Result<WorkRequest, ServiceError> {
        observe(&mut self.cloud.state().work_requests, work_request_id)
            .ok_or_else(|| not_found("WorkRequest", work_request_id))
    }
}

#[async_trait]
impl WorkRequestFetcher for LoadBalancerClient {
    async fn fetch(&self, work_request_id: &str) -> LifecycleResult<WorkRequestStatus> {
        let wr = self.get_work_request(work_request_id).await?;
        Ok(WorkRequestStatus {
            id: wr.id,
            status: wr.lifecycle_state,
            resource_id: Some(wr.load_balancer_id),
            errors: wr.error_details.into_iter().map(|e| e.message).collect(),
        })
    }
}

fn start_work_request(
    state: &mut CloudState,
    load_balancer_id: &str,
    operation_type: &str,
    failure: Option<String>,
) -> String {
    // Only the latest work request of a load balancer is kept once finished
    state.work_requests.retain(|_, t| {
        t.resource.load_balancer_id != load_balancer_id || !t.resource.is_finished()
    });

    let id = state.new_id("loadbalancerworkrequest");
    let (upcoming, error_details) = match failure {
        Some(message) => (
            state.transition(IN_PROGRESS, FAILED),
            vec![WorkRequestError {
                error_code: "BAD_INPUT".to_string(),
                message,
            }],
        ),
        None => (state.transition(IN_PROGRESS, SUCCEEDED), Vec::new()),
    };
    let wr = WorkRequest {
        id: id.clone(),
        load_balancer_id: load_balancer_id.to_string(),
        operation_type: operation_type.to_string(),
        lifecycle_state: ACCEPTED.to_string(),
        error_details,
        time_accepted: Utc::now(),
    };
    log::debug!("sim: {} accepted as {}", operation_type, id);
    state.work_requests.insert(id.clone(), Tracked { resource: wr, upcoming });
    id
}

/// A load balancer accepts one work request at a time
fn ensure_idle(state: &CloudState, load_balancer_id: &str) -> Result<(), ServiceError> {
    let busy = state
        .work_requests
        .values()
        .any(|t| t.resource.load_balancer_id == load_balancer_id && !t.resource.is_finished());
    if busy {
        return Err(conflict(format!(
            "Invalid State Transition of LoadBalancer {}: another work request is in progress",
            load_balancer_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_core::LifecycleError;
    use cumulus_core::work_request::WorkRequestWaiter;
    use std::time::Duration;

    fn details() -> CreateLoadBalancerDetails {
        CreateLoadBalancerDetails {
            compartment_id: "ocid1.compartment.sim..root".to_string(),
            display_name: "web".to_string(),
            shape_name: "flexible".to_string(),
            subnet_ids: vec!["ocid1.subnet.sim..a".to_string()],
            is_private: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn create_work_request_reports_load_balancer_id() {
        let client = SimCloud::default().load_balancer();
        let response = client.create_load_balancer(details()).await.unwrap();

        let lb_id = WorkRequestWaiter::new(Duration::from_secs(60))
            .wait(&client, &response.opc_work_request_id)
            .await
            .unwrap()
            .unwrap();
        assert!(lb_id.starts_with("ocid1.loadbalancer."));
        assert_eq!(client.get_load_balancer(&lb_id).await.unwrap().lifecycle_state, "CREATING");
        assert_eq!(client.get_load_balancer(&lb_id).await.unwrap().lifecycle_state, "ACTIVE");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_work_request_carries_error_details() {
        let cloud = SimCloud::default();
        cloud.inject_failure("loadbalancer", "subnet has no free addresses");
        let client = cloud.load_balancer();
        let response = client.create_load_balancer(details()).await.unwrap();

        let err = WorkRequestWaiter::new(Duration::from_secs(60))
            .wait(&client, &response.opc_work_request_id)
            .await
            .unwrap_err();
        match err {
            LifecycleError::WorkRequest { status, message, .. } => {
                assert_eq!(status, FAILED);
                assert_eq!(message.as_deref(), Some("subnet has no free addresses"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn concurrent_work_requests_conflict() {
        let client = SimCloud::default().load_balancer();
        client.create_load_balancer(details()).await.unwrap();
        let lb_id = client.cloud.state().load_balancers.keys().next().cloned().unwrap();

        let err = client.delete_load_balancer(&lb_id).await.unwrap_err();
        assert_eq!(err.status_code, 409);
    }

    #[tokio::test]
    async fn requires_a_subnet() {
        let client = SimCloud::default().load_balancer();
        let mut details = details();
        details.subnet_ids.clear();
        assert_eq!(client.create_load_balancer(details).await.unwrap_err().status_code, 400);
    }

    #[tokio::test]
    async fn canceled_work_request_does_not_block() {
        let client = SimCloud::default().load_balancer();
        client.create_load_balancer(details()).await.unwrap();
        let lb_id = client.cloud.state().load_balancers.keys().next().cloned().unwrap();

        for tracked in client.cloud.state().work_requests.values_mut() {
            tracked.resource.set_lifecycle_state(CANCELED);
            tracked.upcoming.clear();
        }
        assert!(client.delete_load_balancer(&lb_id).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_work_requests_are_pruned() {
        let client = SimCloud::default().load_balancer();
        let response = client.create_load_balancer(details()).await.unwrap();
        let waiter = WorkRequestWaiter::new(Duration::from_secs(60));
        let lb_id = waiter
            .wait(&client, &response.opc_work_request_id)
            .await
            .unwrap()
            .unwrap();
        while client.get_load_balancer(&lb_id).await.unwrap().lifecycle_state != lb_state::ACTIVE {}

        let update = UpdateLoadBalancerDetails {
            display_name: Some("web-2".to_string()),
        };
        let response = client.update_load_balancer(&lb_id, update).await.unwrap();

        let state = client.cloud.state();
        assert_eq!(state.work_requests.len(), 1);
        assert!(state.work_requests.contains_key(&response.opc_work_request_id));
    }
}
