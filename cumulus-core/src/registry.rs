//! ClientRegistry - SDK clients shared by every adapter of a provider
//!
//! Built once when the provider is configured and passed by reference to the
//! adapters, which look clients up by type.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{LifecycleError, LifecycleResult};

#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ClientRegistry {
    pub fn builder() -> ClientRegistryBuilder {
        ClientRegistryBuilder::default()
    }

    /// Client of type `C`, or a configuration error when none was registered
    pub fn get<C>(&self) -> LifecycleResult<Arc<C>>
    where
        C: Any + Send + Sync,
    {
        self.clients
            .get(&TypeId::of::<C>())
            .cloned()
            .and_then(|client| client.downcast::<C>().ok())
            .ok_or_else(|| {
                LifecycleError::config(format!("no client registered for {}", type_name::<C>()))
            })
    }

    pub fn contains<C: Any>(&self) -> bool {
        self.clients.contains_key(&TypeId::of::<C>())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.clients.len())
            .finish()
    }
}

#[derive(Default)]
pub struct ClientRegistryBuilder {
    clients: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ClientRegistryBuilder {
    /// Register `client`; a later registration of the same type replaces it
    pub fn with<C>(mut self, client: C) -> Self
    where
        C: Any + Send + Sync,
    {
        self.clients.insert(TypeId::of::<C>(), Arc::new(client));
        self
    }

    pub fn with_shared<C>(mut self, client: Arc<C>) -> Self
    where
        C: Any + Send + Sync,
    {
        self.clients.insert(TypeId::of::<C>(), client);
        self
    }

    pub fn build(self) -> ClientRegistry {
        ClientRegistry {
            clients: self.clients,
        }
    }
}
