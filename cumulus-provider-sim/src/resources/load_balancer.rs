use std::sync::LazyLock;

use async_trait::async_trait;
use cumulus_core::error::{LifecycleError, LifecycleResult};
use cumulus_core::work_request::WorkRequestWaiter;
use cumulus_core::{
    Capabilities, ResourceCreator, ResourceCrud, ResourceData, ResourceDeleter, ResourceUpdater,
    StateTransition, Verb,
};

use super::{AdapterContext, LOAD_BALANCER, changed_str};
use crate::sdk::LoadBalancerClient;
use crate::sdk::load_balancer::{
    CreateLoadBalancerDetails, LoadBalancer, UpdateLoadBalancerDetails, lb_state,
};

static DECLARED: LazyLock<Capabilities> = LazyLock::new(|| {
    Capabilities::new()
        .created(
            StateTransition::new([lb_state::CREATING], [lb_state::ACTIVE, lb_state::FAILED])
                .expect("load balancer creation labels are disjoint"),
        )
        .deleted(
            StateTransition::new([lb_state::DELETING], [lb_state::DELETED])
                .expect("load balancer deletion labels are disjoint"),
        )
});

/// Load balancer adapter
///
/// Every mutating call is tracked through a work request, which is waited for
/// before the orchestrator polls the load balancer itself.
pub struct LoadBalancerResource<'a> {
    data: &'a mut ResourceData,
    client: &'a LoadBalancerClient,
    ctx: &'a AdapterContext,
    res: Option<LoadBalancer>,
}

impl<'a> LoadBalancerResource<'a> {
    pub fn new(
        data: &'a mut ResourceData,
        client: &'a LoadBalancerClient,
        ctx: &'a AdapterContext,
    ) -> Self {
        Self {
            data,
            client,
            ctx,
            res: None,
        }
    }

    fn require_id(&self) -> LifecycleResult<String> {
        self.id().ok_or_else(|| {
            LifecycleError::data(format!("{}: resource has no id", LOAD_BALANCER))
        })
    }

    async fn wait_for_work_request(
        &self,
        work_request_id: &str,
        verb: Verb,
    ) -> LifecycleResult<Option<String>> {
        let mut waiter = WorkRequestWaiter::new(self.data.timeout(verb));
        if let Some(interval) = self.ctx.config.poll_interval {
            waiter = waiter.with_poll_interval(interval);
        }
        waiter.wait(self.client, work_request_id).await
    }
}

#[async_trait]
impl ResourceCrud for LoadBalancerResource<'_> {
    fn type_name(&self) -> &'static str {
        LOAD_BALANCER
    }

    fn data(&self) -> &ResourceData {
        &*self.data
    }

    fn data_mut(&mut self) -> &mut ResourceData {
        &mut *self.data
    }

    fn id(&self) -> Option<String> {
        match &self.res {
            Some(lb) => Some(lb.id.clone()),
            None => self.data.has_id().then(|| self.data.id().to_string()),
        }
    }

    async fn get(&mut self) -> LifecycleResult<()> {
        let id = self.require_id()?;
        self.res = Some(self.client.get_load_balancer(&id).await?);
        Ok(())
    }

    fn set_data(&mut self) -> LifecycleResult<()> {
        let Some(lb) = &self.res else {
            return Ok(());
        };
        self.data.set("compartment_id", lb.compartment_id.clone());
        self.data.set("display_name", lb.display_name.clone());
        self.data.set("shape", lb.shape_name.clone());
        self.data.set("subnet_ids", lb.subnet_ids.clone());
        self.data.set("is_private", lb.is_private);
        self.data.set("ip_addresses", lb.ip_addresses.clone());
        self.data.set("state", lb.lifecycle_state.clone());
        self.data.set("time_created", lb.time_created.to_rfc3339());
        Ok(())
    }

    fn state(&self) -> Option<String> {
        self.res.as_ref().map(|lb| lb.lifecycle_state.clone())
    }

    fn capabilities(&self) -> Capabilities {
        self.ctx
            .capabilities(DECLARED.clone().mutex(self.ctx.load_balancer_mutex.clone()))
    }
}

#[async_trait]
impl ResourceCreator for LoadBalancerResource<'_> {
    async fn create(&mut self) -> LifecycleResult<()> {
        let subnet_ids = self.data.get_str_list("subnet_ids").unwrap_or_default();
        let details = CreateLoadBalancerDetails {
            compartment_id: self.data.require_str("compartment_id")?.to_string(),
            display_name: self.data.require_str("display_name")?.to_string(),
            shape_name: self.data.require_str("shape")?.to_string(),
            subnet_ids,
            is_private: self.data.get_bool("is_private").unwrap_or(false),
        };

        let response = self.client.create_load_balancer(details).await?;
        let id = self
            .wait_for_work_request(&response.opc_work_request_id, Verb::Create)
            .await?
            .ok_or_else(|| {
                LifecycleError::data(format!(
                    "work request {} did not report a load balancer",
                    response.opc_work_request_id
                ))
            })?;
        log::info!("{} {} requested", LOAD_BALANCER, id);
        self.data.set_id(id);
        self.get().await
    }
}

#[async_trait]
impl ResourceUpdater for LoadBalancerResource<'_> {
    async fn update(&mut self) -> LifecycleResult<()> {
        let id = self.require_id()?;
        let details = UpdateLoadBalancerDetails {
            display_name: changed_str(self.data, "display_name"),
        };
        let response = self.client.update_load_balancer(&id, details).await?;
        self.wait_for_work_request(&response.opc_work_request_id, Verb::Update)
            .await?;
        self.get().await
    }
}

#[async_trait]
impl ResourceDeleter for LoadBalancerResource<'_> {
    async fn delete(&mut self) -> LifecycleResult<()> {
        let id = self.require_id()?;
        let response = self.client.delete_load_balancer(&id).await?;
        self.wait_for_work_request(&response.opc_work_request_id, Verb::Delete)
            .await?;
        Ok(())
    }
}
