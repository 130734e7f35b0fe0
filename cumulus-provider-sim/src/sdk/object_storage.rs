//! Object storage buckets
//!
//! Buckets have no lifecycle label. Creation and deletion take effect
//! immediately; updates become visible only after a few observations.

use chrono::{DateTime, Utc};
use cumulus_core::ServiceError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Lifecycle, SimCloud, Step, Tracked, conflict, invalid_parameter, observe, request_id};

pub const NO_PUBLIC_ACCESS: &str = "NoPublicAccess";
pub const OBJECT_READ: &str = "ObjectRead";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub namespace: String,
    pub name: String,
    pub compartment_id: String,
    pub public_access_type: String,
    pub versioning: String,
    pub etag: String,
    pub time_created: DateTime<Utc>,
}

impl Lifecycle for Bucket {
    fn lifecycle_state(&self) -> &str {
        ""
    }

    fn set_lifecycle_state(&mut self, _state: &str) {}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateBucketDetails {
    pub compartment_id: String,
    pub name: String,
    pub public_access_type: Option<String>,
    pub versioning: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateBucketDetails {
    pub public_access_type: Option<String>,
    pub versioning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ObjectStorageClient {
    cloud: SimCloud,
}

impl ObjectStorageClient {
    pub fn new(cloud: SimCloud) -> Self {
        Self { cloud }
    }

    pub async fn get_namespace(&self) -> Result<String, ServiceError> {
        Ok(self.cloud.state().settings.namespace.clone())
    }

    pub async fn create_bucket(&self, details: CreateBucketDetails) -> Result<Bucket, ServiceError> {
        validate_name(&details.name)?;
        let mut state = self.cloud.state();
        if state.buckets.contains_key(&details.name) {
            return Err(ServiceError::new(
                409,
                "BucketAlreadyExists",
                format!("Either the bucket '{}' already exists or you are not authorized", details.name),
            )
            .with_request_id(request_id()));
        }

        let bucket = Bucket {
            namespace: state.settings.namespace.clone(),
            name: details.name.clone(),
            compartment_id: details.compartment_id,
            public_access_type: details
                .public_access_type
                .unwrap_or_else(|| NO_PUBLIC_ACCESS.to_string()),
            versioning: details.versioning.unwrap_or_else(|| "Disabled".to_string()),
            etag: request_id(),
            time_created: Utc::now(),
        };
        state.buckets.insert(details.name, Tracked::new(bucket.clone()));
        Ok(bucket)
    }

    pub async fn get_bucket(&self, bucket_name: &str) -> Result<Bucket, ServiceError> {
        observe(&mut self.cloud.state().buckets, bucket_name).ok_or_else(|| bucket_not_found(bucket_name))
    }

    /// Accepts the update; readers see it after the propagation delay
    pub async fn update_bucket(
        &self,
        bucket_name: &str,
        details: UpdateBucketDetails,
    ) -> Result<(), ServiceError> {
        let mut state = self.cloud.state();
        let delay = state.settings.propagation_observations;
        let tracked = state
            .buckets
            .get_mut(bucket_name)
            .ok_or_else(|| bucket_not_found(bucket_name))?;
        if !tracked.is_settled() {
            return Err(conflict(format!(
                "bucket '{}' has an update in progress",
                bucket_name
            )));
        }

        let mut patch = Map::new();
        if let Some(access) = details.public_access_type {
            patch.insert("public_access_type".to_string(), Value::String(access));
        }
        if let Some(versioning) = details.versioning {
            patch.insert("versioning".to_string(), Value::String(versioning));
        }
        patch.insert("etag".to_string(), Value::String(request_id()));

        for _ in 0..delay {
            tracked.upcoming.push_back(Step::Patch(Value::Object(Map::new())));
        }
        tracked.upcoming.push_back(Step::Patch(Value::Object(patch)));
        Ok(())
    }

    pub async fn delete_bucket(&self, bucket_name: &str) -> Result<(), ServiceError> {
        self.cloud
            .state()
            .buckets
            .remove(bucket_name)
            .map(|_| ())
            .ok_or_else(|| bucket_not_found(bucket_name))
    }
}

fn bucket_not_found(name: &str) -> ServiceError {
    ServiceError::new(404, "BucketNotFound", format!("Either the bucket named '{}' does not exist in the namespace or you are not authorized to access it", name))
        .with_request_id(request_id())
}

fn validate_name(name: &str) -> Result<(), ServiceError> {
    let valid = !name.is_empty()
        && name.len() <= 256
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(invalid_parameter(format!("invalid bucket name '{}'", name)))
    }
}
