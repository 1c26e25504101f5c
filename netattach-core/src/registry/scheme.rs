use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use log::{debug, warn};
use serde_json::Value;

use crate::{api::request::RestRequest, error::ApiError};

use super::{
    handler::{ResourceHandler, ValueWatchStream},
    RegistryObject, ResourceStore,
};

/// Immutable registry of every kind served in process, built once through
/// [`SchemeBuilder`] and shared behind an `Arc`.
pub struct Scheme {
    routes: HashMap<String, Arc<dyn ResourceHandler>>,
    stores: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Scheme {
    pub fn builder() -> SchemeBuilder {
        SchemeBuilder::default()
    }

    pub fn handler(&self, request: &RestRequest) -> Result<&Arc<dyn ResourceHandler>, ApiError> {
        self.routes.get(&request.route()).ok_or_else(|| {
            ApiError::not_found(
                "resource",
                &format!("{}.{}/{}", request.resource, request.group, request.version),
            )
        })
    }

    /// Typed access to the store registered for `K`.
    pub fn store<K: RegistryObject>(&self) -> Option<Arc<ResourceStore<K>>> {
        self.stores
            .get(&TypeId::of::<K>())
            .cloned()
            .and_then(|store| store.downcast::<ResourceStore<K>>().ok())
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub async fn execute(&self, request: RestRequest) -> Result<Value, ApiError> {
        self.handler(&request)?.handle(request).await
    }

    pub async fn watch(&self, request: RestRequest) -> Result<ValueWatchStream, ApiError> {
        self.handler(&request)?.watch(request).await
    }
}

impl std::fmt::Debug for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheme")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Default)]
pub struct SchemeBuilder {
    routes: HashMap<String, Arc<dyn ResourceHandler>>,
    stores: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl SchemeBuilder {
    pub fn register<K: RegistryObject>(mut self, store: ResourceStore<K>) -> Self {
        let store = Arc::new(store);
        let route = store.type_descriptor().route();

        debug!("Registering {route}");

        if self.routes.insert(route.to_owned(), store.clone()).is_some() {
            warn!("{route} was registered twice, the last registration wins");
        }
        self.stores.insert(TypeId::of::<K>(), store);

        self
    }

    pub fn build(self) -> Scheme {
        Scheme {
            routes: self.routes,
            stores: self.stores,
        }
    }
}
