//! Cumulus Core
//!
//! Generic resource lifecycle orchestration for provider adapters: capability
//! traits, the create/read/update/delete orchestrator, the state-refresh
//! poller and the pieces they share.

pub mod config;
pub mod crud;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod not_found;
pub mod paginate;
pub mod poller;
pub mod registry;
pub mod resource;
pub mod timeouts;
pub mod work_request;

pub use config::ProviderConfig;
pub use crud::{
    WaitOutcome, create_resource, delete_resource, read_resource, update_resource,
    wait_for_created_state, wait_for_resource_condition, wait_for_state_refresh,
    wait_for_updated_state,
};
pub use error::{LifecycleError, LifecycleResult, ServiceError};
pub use lifecycle::{
    Capabilities, ResourceCreator, ResourceCrud, ResourceDeleter, ResourceUpdater, SharedMutex,
    StateTransition,
};
pub use not_found::is_missing_resource;
pub use registry::ClientRegistry;
pub use resource::ResourceData;
pub use timeouts::{ResourceTimeouts, Verb};
