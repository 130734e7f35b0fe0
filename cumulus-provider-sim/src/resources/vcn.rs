use std::sync::LazyLock;

use async_trait::async_trait;
use cumulus_core::error::{LifecycleError, LifecycleResult};
use cumulus_core::{
    Capabilities, ResourceCreator, ResourceCrud, ResourceData, ResourceDeleter, ResourceUpdater,
    StateTransition,
};

use super::{AdapterContext, VCN, changed_str, config_str};
use crate::sdk::CoreClient;
use crate::sdk::core_service::{CreateVcnDetails, UpdateVcnDetails, Vcn, vcn_state};

static DECLARED: LazyLock<Capabilities> = LazyLock::new(|| {
    Capabilities::new()
        .created(
            StateTransition::new(
                [vcn_state::PROVISIONING],
                [vcn_state::AVAILABLE, vcn_state::FAILED],
            )
            .expect("vcn creation labels are disjoint"),
        )
        .updated(
            StateTransition::new([vcn_state::UPDATING], [vcn_state::AVAILABLE])
                .expect("vcn update labels are disjoint"),
        )
        .deleted(
            StateTransition::new([vcn_state::TERMINATING], [vcn_state::TERMINATED])
                .expect("vcn deletion labels are disjoint"),
        )
});

pub struct VcnResource<'a> {
    data: &'a mut ResourceData,
    client: &'a CoreClient,
    ctx: &'a AdapterContext,
    res: Option<Vcn>,
}

impl<'a> VcnResource<'a> {
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
            .ok_or_else(|| LifecycleError::data(format!("{}: resource has no id", VCN)))
    }
}

#[async_trait]
impl ResourceCrud for VcnResource<'_> {
    fn type_name(&self) -> &'static str {
        VCN
    }

    fn data(&self) -> &ResourceData {
        &*self.data
    }

    fn data_mut(&mut self) -> &mut ResourceData {
        &mut *self.data
    }

    fn id(&self) -> Option<String> {
        match &self.res {
            Some(vcn) => Some(vcn.id.clone()),
            None => self.data.has_id().then(|| self.data.id().to_string()),
        }
    }

    async fn get(&mut self) -> LifecycleResult<()> {
        let id = self.require_id()?;
        self.res = Some(self.client.get_vcn(&id).await?);
        Ok(())
    }

    fn set_data(&mut self) -> LifecycleResult<()> {
        let Some(vcn) = &self.res else {
            return Ok(());
        };
        self.data.set("compartment_id", vcn.compartment_id.clone());
        self.data.set("cidr_block", vcn.cidr_block.clone());
        self.data.set("display_name", vcn.display_name.clone());
        self.data.set_opt("dns_label", vcn.dns_label.clone());
        self.data.set("state", vcn.lifecycle_state.clone());
        self.data.set("time_created", vcn.time_created.to_rfc3339());
        Ok(())
    }

    fn state(&self) -> Option<String> {
        self.res.as_ref().map(|v| v.lifecycle_state.clone())
    }

    fn capabilities(&self) -> Capabilities {
        self.ctx.capabilities(DECLARED.clone())
    }
}

#[async_trait]
impl ResourceCreator for VcnResource<'_> {
    async fn create(&mut self) -> LifecycleResult<()> {
        let details = CreateVcnDetails {
            compartment_id: self.data.require_str("compartment_id")?.to_string(),
            cidr_block: self.data.require_str("cidr_block")?.to_string(),
            display_name: config_str(self.data, "display_name"),
            dns_label: config_str(self.data, "dns_label"),
        };
        let vcn = self.client.create_vcn(details).await?;
        log::info!("{} {} requested", VCN, vcn.id);
        self.res = Some(vcn);
        Ok(())
    }
}

#[async_trait]
impl ResourceUpdater for VcnResource<'_> {
    async fn update(&mut self) -> LifecycleResult<()> {
        let id = self.require_id()?;
        let details = UpdateVcnDetails {
            display_name: changed_str(self.data, "display_name"),
        };
        self.res = Some(self.client.update_vcn(&id, details).await?);
        Ok(())
    }
}

#[async_trait]
impl ResourceDeleter for VcnResource<'_> {
    async fn delete(&mut self) -> LifecycleResult<()> {
        let id = self.require_id()?;
        self.client.delete_vcn(&id).await?;
        Ok(())
    }
}
