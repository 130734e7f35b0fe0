use async_trait::async_trait;
use cumulus_core::error::{LifecycleError, LifecycleResult};
use cumulus_core::{
    Capabilities, ResourceCreator, ResourceCrud, ResourceData, ResourceDeleter, ResourceUpdater,
    Verb, wait_for_resource_condition,
};

use super::{AdapterContext, BUCKET, changed_str, config_str};
use crate::sdk::ObjectStorageClient;
use crate::sdk::object_storage::{Bucket, CreateBucketDetails, UpdateBucketDetails};

/// Object storage bucket adapter
///
/// Identified as `n/<namespace>/b/<name>`. Buckets have no lifecycle label, so
/// updates are confirmed by re-reading until the new values show up.
pub struct BucketResource<'a> {
    data: &'a mut ResourceData,
    client: &'a ObjectStorageClient,
    ctx: &'a AdapterContext,
    res: Option<Bucket>,
}

impl<'a> BucketResource<'a> {
    pub fn new(
        data: &'a mut ResourceData,
        client: &'a ObjectStorageClient,
        ctx: &'a AdapterContext,
    ) -> Self {
        Self {
            data,
            client,
            ctx,
            res: None,
        }
    }

    fn bucket_name(&self) -> LifecycleResult<String> {
        if let Some(bucket) = &self.res {
            return Ok(bucket.name.clone());
        }
        match parse_bucket_id(self.data.id()) {
            Some((_, name)) => Ok(name.to_string()),
            None => Ok(self.data.require_str("name")?.to_string()),
        }
    }

    /// Whether the last fetched bucket shows every configured value
    fn converged(&self) -> bool {
        let Some(bucket) = &self.res else {
            return false;
        };
        let matches = |key: &str, actual: &str| {
            config_str(self.data, key).is_none_or(|wanted| wanted == actual)
        };
        matches("public_access_type", &bucket.public_access_type)
            && matches("versioning", &bucket.versioning)
    }
}

pub fn bucket_id(namespace: &str, name: &str) -> String {
    format!("n/{}/b/{}", namespace, name)
}

/// Split `n/<namespace>/b/<name>` into its parts
pub fn parse_bucket_id(id: &str) -> Option<(&str, &str)> {
    let rest = id.strip_prefix("n/")?;
    let (namespace, name) = rest.split_once("/b/")?;
    (!namespace.is_empty() && !name.is_empty()).then_some((namespace, name))
}

#[async_trait]
impl ResourceCrud for BucketResource<'_> {
    fn type_name(&self) -> &'static str {
        BUCKET
    }

    fn data(&self) -> &ResourceData {
        &*self.data
    }

    fn data_mut(&mut self) -> &mut ResourceData {
        &mut *self.data
    }

    fn id(&self) -> Option<String> {
        match &self.res {
            Some(bucket) => Some(bucket_id(&bucket.namespace, &bucket.name)),
            None => self.data.has_id().then(|| self.data.id().to_string()),
        }
    }

    async fn get(&mut self) -> LifecycleResult<()> {
        let name = self.bucket_name()?;
        self.res = Some(self.client.get_bucket(&name).await?);
        Ok(())
    }

    fn set_data(&mut self) -> LifecycleResult<()> {
        let Some(bucket) = &self.res else {
            return Ok(());
        };
        self.data.set("namespace", bucket.namespace.clone());
        self.data.set("name", bucket.name.clone());
        self.data.set("compartment_id", bucket.compartment_id.clone());
        self.data.set("public_access_type", bucket.public_access_type.clone());
        self.data.set("versioning", bucket.versioning.clone());
        self.data.set("etag", bucket.etag.clone());
        self.data.set("time_created", bucket.time_created.to_rfc3339());
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        self.ctx.capabilities(Capabilities::new())
    }
}

#[async_trait]
impl ResourceCreator for BucketResource<'_> {
    async fn create(&mut self) -> LifecycleResult<()> {
        let details = CreateBucketDetails {
            compartment_id: self.data.require_str("compartment_id")?.to_string(),
            name: self.data.require_str("name")?.to_string(),
            public_access_type: config_str(self.data, "public_access_type"),
            versioning: config_str(self.data, "versioning"),
        };
        self.res = Some(self.client.create_bucket(details).await?);
        Ok(())
    }
}

#[async_trait]
impl ResourceUpdater for BucketResource<'_> {
    async fn update(&mut self) -> LifecycleResult<()> {
        let name = self.bucket_name()?;
        let details = UpdateBucketDetails {
            public_access_type: changed_str(self.data, "public_access_type"),
            versioning: changed_str(self.data, "versioning"),
        };
        if details.public_access_type.is_none() && details.versioning.is_none() {
            return self.get().await;
        }

        self.client.update_bucket(&name, details).await?;
        self.res = None;
        let timeout = self.data.timeout(Verb::Update);
        wait_for_resource_condition(self, |b: &BucketResource<'_>| b.converged(), timeout)
            .await
            .map_err(|e| match e {
                LifecycleError::Timeout { .. } => LifecycleError::data(format!(
                    "bucket {} did not show the update within {}s",
                    name,
                    timeout.as_secs()
                )),
                other => other,
            })
    }
}

#[async_trait]
impl ResourceDeleter for BucketResource<'_> {
    async fn delete(&mut self) -> LifecycleResult<()> {
        let name = self.bucket_name()?;
        self.client.delete_bucket(&name).await?;
        Ok(())
    }
}
