use std::sync::LazyLock;

use async_trait::async_trait;
use cumulus_core::error::{LifecycleError, LifecycleResult};
use cumulus_core::{
    Capabilities, ResourceCreator, ResourceCrud, ResourceData, ResourceDeleter, ResourceUpdater,
    StateTransition,
};

use super::{AdapterContext, INSTANCE, changed_str, config_str};
use crate::sdk::CoreClient;
use crate::sdk::core_service::{
    Instance, LaunchInstanceDetails, UpdateInstanceDetails, instance_state,
};

static DECLARED: LazyLock<Capabilities> = LazyLock::new(|| {
    Capabilities::new()
        .created(
            StateTransition::new(
                [instance_state::PROVISIONING, instance_state::STARTING],
                [instance_state::RUNNING, instance_state::FAILED],
            )
            .expect("instance creation labels are disjoint"),
        )
        .updated(
            StateTransition::new(
                [
                    instance_state::STOPPING,
                    instance_state::STOPPED,
                    instance_state::STARTING,
                ],
                [instance_state::RUNNING],
            )
            .expect("instance update labels are disjoint"),
        )
        .deleted(
            StateTransition::new([instance_state::TERMINATING], [instance_state::TERMINATED])
                .expect("instance deletion labels are disjoint"),
        )
});

/// Compute instance adapter
pub struct InstanceResource<'a> {
    data: &'a mut ResourceData,
    client: &'a CoreClient,
    ctx: &'a AdapterContext,
    res: Option<Instance>,
}

impl<'a> InstanceResource<'a> {
    pub fn new(data: &'a mut ResourceData, client: &'a CoreClient, ctx: &'a AdapterContext) -> Self {
        Self {
            data,
            client,
            ctx,
            res: None,
        }
    }

    fn require_id(&self) -> LifecycleResult<String> {
        self.id()
            .ok_or_else(|| LifecycleError::data(format!("{}: resource has no id", INSTANCE)))
    }
}

#[async_trait]
impl ResourceCrud for InstanceResource<'_> {
    fn type_name(&self) -> &'static str {
        INSTANCE
    }

    fn data(&self) -> &ResourceData {
        &*self.data
    }

    fn data_mut(&mut self) -> &mut ResourceData {
        &mut *self.data
    }

    fn id(&self) -> Option<String> {
        match &self.res {
            Some(instance) => Some(instance.id.clone()),
            None => self.data.has_id().then(|| self.data.id().to_string()),
        }
    }

    async fn get(&mut self) -> LifecycleResult<()> {
        let id = self.require_id()?;
        self.res = Some(self.client.get_instance(&id).await?);
        Ok(())
    }

    fn set_data(&mut self) -> LifecycleResult<()> {
        let Some(instance) = &self.res else {
            return Ok(());
        };
        self.data.set("compartment_id", instance.compartment_id.clone());
        self.data.set("availability_domain", instance.availability_domain.clone());
        self.data.set("shape", instance.shape.clone());
        self.data.set("display_name", instance.display_name.clone());
        self.data.set_opt("subnet_id", instance.subnet_id.clone());
        self.data.set("state", instance.lifecycle_state.clone());
        self.data.set("time_created", instance.time_created.to_rfc3339());
        Ok(())
    }

    fn state(&self) -> Option<String> {
        self.res.as_ref().map(|i| i.lifecycle_state.clone())
    }

    fn failure_message(&self) -> Option<String> {
        self.res.as_ref().and_then(|i| i.lifecycle_details.clone())
    }

    fn capabilities(&self) -> Capabilities {
        self.ctx.capabilities(DECLARED.clone())
    }
}

#[async_trait]
impl ResourceCreator for InstanceResource<'_> {
    async fn create(&mut self) -> LifecycleResult<()> {
        let details = LaunchInstanceDetails {
            compartment_id: self.data.require_str("compartment_id")?.to_string(),
            availability_domain: self.data.require_str("availability_domain")?.to_string(),
            shape: self.data.require_str("shape")?.to_string(),
            display_name: config_str(self.data, "display_name"),
            subnet_id: config_str(self.data, "subnet_id"),
        };
        let instance = self.client.launch_instance(details).await?;
        log::info!("{} {} launching", INSTANCE, instance.id);
        self.res = Some(instance);
        Ok(())
    }
}

#[async_trait]
impl ResourceUpdater for InstanceResource<'_> {
    async fn update(&mut self) -> LifecycleResult<()> {
        let id = self.require_id()?;
        let details = UpdateInstanceDetails {
            display_name: changed_str(self.data, "display_name"),
            shape: changed_str(self.data, "shape"),
        };
        if details.shape.is_some() {
            log::info!("{} {} changes shape and will reboot", INSTANCE, id);
        }
        self.res = Some(self.client.update_instance(&id, details).await?);
        Ok(())
    }
}

#[async_trait]
impl ResourceDeleter for InstanceResource<'_> {
    async fn delete(&mut self) -> LifecycleResult<()> {
        let id = self.require_id()?;
        self.client.terminate_instance(&id).await?;
        Ok(())
    }
}
