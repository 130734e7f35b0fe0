use async_trait::async_trait;
use cumulus_core::error::{LifecycleError, LifecycleResult};
use cumulus_core::paginate::{Page, collect_all};
use cumulus_core::{ResourceCrud, ResourceData};
use serde_json::{Value, json};

use super::{VCNS, config_str};
use crate::sdk::CoreClient;
use crate::sdk::core_service::{ListVcnsRequest, Vcn};

/// Data source listing every VCN of a compartment, optionally filtered by
/// display name and lifecycle state
pub struct VcnsDataSource<'a> {
    data: &'a mut ResourceData,
    client: &'a CoreClient,
    res: Option<Vec<Vcn>>,
}

impl<'a> VcnsDataSource<'a> {
    pub fn new(data: &'a mut ResourceData, client: &'a CoreClient) -> Self {
        Self {
            data,
            client,
            res: None,
        }
    }
}

#[async_trait]
impl ResourceCrud for VcnsDataSource<'_> {
    fn type_name(&self) -> &'static str {
        VCNS
    }

    fn data(&self) -> &ResourceData {
        &*self.data
    }

    fn data_mut(&mut self) -> &mut ResourceData {
        &mut *self.data
    }

    async fn get(&mut self) -> LifecycleResult<()> {
        let compartment_id = self.data.require_str("compartment_id")?.to_string();
        let display_name = config_str(self.data, "display_name");
        let lifecycle_state = config_str(self.data, "state");
        let limit = self
            .data
            .get_i64("page_size")
            .and_then(|n| usize::try_from(n).ok());
        let client = self.client;

        let vcns = collect_all(|page| {
            let request = ListVcnsRequest {
                compartment_id: compartment_id.clone(),
                display_name: display_name.clone(),
                lifecycle_state: lifecycle_state.clone(),
                limit,
                page,
            };
            async move {
                let response = client.list_vcns(request).await?;
                Ok::<_, LifecycleError>(Page {
                    items: response.items,
                    next_page: response.opc_next_page,
                })
            }
        })
        .await?;

        log::debug!("{} found {} vcns in {}", VCNS, vcns.len(), compartment_id);
        self.res = Some(vcns);
        Ok(())
    }

    fn set_data(&mut self) -> LifecycleResult<()> {
        let Some(vcns) = &self.res else {
            return Ok(());
        };
        let items: Vec<Value> = vcns
            .iter()
            .map(|v| {
                json!({
                    "id": v.id,
                    "display_name": v.display_name,
                    "cidr_block": v.cidr_block,
                    "state": v.lifecycle_state,
                })
            })
            .collect();
        let compartment_id = self.data.require_str("compartment_id")?.to_string();
        self.data.set("vcns", items);
        self.data.set("compartment_id", compartment_id.clone());
        self.data.set_id(format!("{}:{}", VCNS, compartment_id));
        Ok(())
    }
}
