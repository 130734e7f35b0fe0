//! Simulated cloud provider
//!
//! Entry point the CLI talks to. Builds the client registry once, then
//! dispatches each lifecycle call to a freshly created adapter for the
//! resource's type.

use std::sync::Arc;

use cumulus_core::error::{LifecycleError, LifecycleResult};
use cumulus_core::metrics::{LogMetricsSink, MetricsSink};
use cumulus_core::{
    ClientRegistry, ProviderConfig, ResourceData, create_resource, delete_resource, read_resource,
    update_resource,
};

use crate::resources::{
    self, AdapterContext, BUCKET, BucketResource, INSTANCE, InstanceResource, LOAD_BALANCER,
    LoadBalancerResource, ResourceType, TypeKind, VCN, VCNS, VcnResource, VcnsDataSource,
};
use crate::sdk::{CoreClient, LoadBalancerClient, ObjectStorageClient, SimCloud};

/// Run `$body` with `$adapter` bound to the adapter for `$data`'s type
///
/// `$data_source` is evaluated instead for data source types.
macro_rules! with_adapter {
    ($self:ident, $data:ident, $adapter:ident => $body:expr, data_source => $data_source:expr) => {{
        let type_name = $data.type_name().to_string();
        match type_name.as_str() {
            VCN => {
                let client = $self.clients.get::<CoreClient>()?;
                let mut $adapter = VcnResource::new($data, &client, &$self.ctx);
                $body
            }
            INSTANCE => {
                let client = $self.clients.get::<CoreClient>()?;
                let mut $adapter = InstanceResource::new($data, &client, &$self.ctx);
                $body
            }
            LOAD_BALANCER => {
                let client = $self.clients.get::<LoadBalancerClient>()?;
                let mut $adapter = LoadBalancerResource::new($data, &client, &$self.ctx);
                $body
            }
            BUCKET => {
                let client = $self.clients.get::<ObjectStorageClient>()?;
                let mut $adapter = BucketResource::new($data, &client, &$self.ctx);
                $body
            }
            VCNS => $data_source,
            other => Err(unknown_type(other)),
        }
    }};
}

/// Simulated cloud provider
pub struct SimProvider {
    clients: ClientRegistry,
    ctx: AdapterContext,
}

impl SimProvider {
    pub fn new(cloud: &SimCloud, config: ProviderConfig) -> Self {
        let clients = ClientRegistry::builder()
            .with(cloud.core())
            .with(cloud.load_balancer())
            .with(cloud.object_storage())
            .build();
        let mut ctx = AdapterContext::new(config);
        if ctx.config.metrics {
            ctx.metrics = Some(Arc::new(LogMetricsSink));
        }
        Self { clients, ctx }
    }

    /// Whether lifecycle calls report operation metrics
    pub fn has_metrics(&self) -> bool {
        self.ctx.metrics.is_some()
    }

    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.ctx.metrics = Some(sink);
        self
    }

    pub fn name(&self) -> &'static str {
        "sim"
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.ctx.config
    }

    pub fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    pub fn resource_type(&self, type_name: &str) -> LifecycleResult<Box<dyn ResourceType>> {
        resources::resource_type(type_name).ok_or_else(|| unknown_type(type_name))
    }

    /// Check that every attribute the type requires is configured
    pub fn validate(&self, data: &ResourceData) -> LifecycleResult<()> {
        let resource_type = self.resource_type(data.type_name())?;
        let missing: Vec<&str> = resource_type
            .required_attributes()
            .iter()
            .copied()
            .filter(|attr| data.get_config(attr).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::config(format!(
                "{}: missing required attributes: {}",
                data.type_name(),
                missing.join(", ")
            )))
        }
    }

    // =========================================================================
    // Lifecycle Operations
    // =========================================================================

    pub async fn create(&self, data: &mut ResourceData) -> LifecycleResult<()> {
        self.validate(data)?;
        with_adapter!(self, data, adapter => create_resource(&mut adapter).await,
            data_source => Err(not_a_resource(VCNS, "created")))
    }

    pub async fn read(&self, data: &mut ResourceData) -> LifecycleResult<()> {
        with_adapter!(self, data, adapter => read_resource(&mut adapter).await,
            data_source => {
                let client = self.clients.get::<CoreClient>()?;
                read_resource(&mut VcnsDataSource::new(data, &client)).await
            })
    }

    pub async fn update(&self, data: &mut ResourceData) -> LifecycleResult<()> {
        with_adapter!(self, data, adapter => update_resource(&mut adapter).await,
            data_source => Err(not_a_resource(VCNS, "updated")))
    }

    pub async fn delete(&self, data: &mut ResourceData) -> LifecycleResult<()> {
        with_adapter!(self, data, adapter => delete_resource(&mut adapter).await,
            data_source => Err(not_a_resource(VCNS, "deleted")))
    }

    pub fn is_data_source(&self, type_name: &str) -> bool {
        resources::resource_type(type_name).is_some_and(|t| t.kind() == TypeKind::DataSource)
    }
}

fn unknown_type(type_name: &str) -> LifecycleError {
    LifecycleError::config(format!("Unknown resource type: {}", type_name))
}

fn not_a_resource(type_name: &str, verb: &str) -> LifecycleError {
    LifecycleError::config(format!(
        "{} is a data source and cannot be {}",
        type_name, verb
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_core::metrics::InMemoryMetrics;
    use cumulus_core::{ResourceTimeouts, Verb};
    use serde_json::json;
    use std::time::Duration;

    const COMPARTMENT: &str = "ocid1.compartment.sim..root";

    fn data(type_name: &str, config: serde_json::Value) -> ResourceData {
        ResourceData::new(type_name)
            .with_config(config.as_object().cloned().unwrap())
            .with_timeouts(ResourceTimeouts::uniform(Duration::from_secs(600)))
    }

    fn provider() -> (SimCloud, SimProvider) {
        let cloud = SimCloud::default();
        let provider = SimProvider::new(&cloud, ProviderConfig::default());
        (cloud, provider)
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_by_type_name() {
        let (_cloud, provider) = provider();
        let mut vcn = data(VCN, json!({"compartment_id": COMPARTMENT, "cidr_block": "10.0.0.0/16"}));
        let mut bucket = data(BUCKET, json!({"compartment_id": COMPARTMENT, "name": "logs"}));

        provider.create(&mut vcn).await.unwrap();
        provider.create(&mut bucket).await.unwrap();

        assert!(vcn.id().starts_with("ocid1.vcn."));
        assert_eq!(bucket.id(), "n/simtenancy/b/logs");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_type_is_a_config_error() {
        let (_cloud, provider) = provider();
        let mut data = data("sim_core_subnet", json!({}));
        let err = provider.read(&mut data).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_required_attributes_are_listed() {
        let (_cloud, provider) = provider();
        let mut data = data(INSTANCE, json!({"compartment_id": COMPARTMENT}));
        let err = provider.create(&mut data).await.unwrap_err();
        assert!(err.to_string().contains("availability_domain, shape"));
    }

    #[tokio::test(start_paused = true)]
    async fn data_sources_are_read_only() {
        let (_cloud, provider) = provider();
        let mut data = data(VCNS, json!({"compartment_id": COMPARTMENT}));
        assert!(provider.create(&mut data).await.is_err());
        provider.read(&mut data).await.unwrap();
        assert_eq!(data.get("vcns"), Some(&json!([])));
        assert!(provider.is_data_source(VCNS));
        assert!(!provider.is_data_source(VCN));
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_sink_sees_every_operation() {
        let cloud = SimCloud::default();
        let sink = Arc::new(InMemoryMetrics::new());
        let provider = SimProvider::new(&cloud, ProviderConfig::default()).with_metrics(sink.clone());
        let mut vcn = data(VCN, json!({"compartment_id": COMPARTMENT, "cidr_block": "10.0.0.0/16"}));

        provider.create(&mut vcn).await.unwrap();
        provider.read(&mut vcn).await.unwrap();
        provider.delete(&mut vcn).await.unwrap();

        let verbs: Vec<Verb> = sink.records().iter().map(|m| m.verb).collect();
        assert_eq!(verbs, vec![Verb::Create, Verb::Read, Verb::Delete]);
    }

    #[test]
    fn metrics_flag_installs_log_sink() {
        let cloud = SimCloud::default();
        let config = ProviderConfig::from_json(r#"{"metrics": true}"#).unwrap();
        assert!(SimProvider::new(&cloud, config).has_metrics());

        let (_cloud, provider) = provider();
        assert!(!provider.has_metrics());
    }
}
