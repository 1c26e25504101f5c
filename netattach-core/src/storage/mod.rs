use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::{api::Preconditions, Resource};

use crate::error::ApiError;

pub mod memory;

/// Anything the storage layer can keep.
pub trait StorageObject: Resource<DynamicType = ()> + Clone + Send + Sync + 'static {}

impl<T> StorageObject for T where T: Resource<DynamicType = ()> + Clone + Send + Sync + 'static {}

/// Position of an object in the store, ordered by namespace then name.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_owned),
            name: name.to_owned(),
        }
    }

    pub fn namespaced(namespace: &str, name: &str) -> Self {
        Self::new(Some(namespace), name)
    }

    pub fn of<K: Resource>(object: &K) -> Option<Self> {
        Some(Self {
            namespace: object.meta().namespace.clone(),
            name: object.meta().name.clone()?,
        })
    }

    pub fn in_namespace(&self, namespace: Option<&str>) -> bool {
        namespace.map_or(true, |namespace| self.namespace.as_deref() == Some(namespace))
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StoreEvent<K> {
    Added(K),
    Modified { previous: K, object: K },
    /// carries the last stored state with the deletion revision
    Deleted(K),
}

impl<K: Resource> StoreEvent<K> {
    pub fn object(&self) -> &K {
        match self {
            StoreEvent::Added(object) => object,
            StoreEvent::Modified { object, .. } => object,
            StoreEvent::Deleted(object) => object,
        }
    }

    pub fn revision(&self) -> u64 {
        revision_of(self.object()).unwrap_or_default()
    }

    pub fn key(&self) -> Option<ObjectKey> {
        ObjectKey::of(self.object())
    }
}

#[derive(Debug, Clone)]
pub struct StoreList<K> {
    pub items: Vec<K>,
    /// store revision the list was read at
    pub revision: u64,
    /// more items follow the last returned one
    pub has_more: bool,
}

/// Read-modify-write step of [`Storage::guaranteed_update`]. Returning
/// `Ok(None)` leaves the stored object untouched.
pub type TryUpdate<'a, K> = &'a (dyn Fn(&K) -> Result<Option<K>, ApiError> + Send + Sync);

pub type EventStream<K> = BoxStream<'static, Result<StoreEvent<K>, ApiError>>;

/// Versioned object storage. Every persisted write bumps a single revision
/// counter and stamps it into `metadata.resourceVersion`.
#[async_trait]
pub trait Storage<K: StorageObject>: Send + Sync {
    /// Fails with an AlreadyExists conflict if the key is taken.
    async fn create(&self, key: &ObjectKey, object: K) -> Result<K, ApiError>;

    async fn get(&self, key: &ObjectKey) -> Result<K, ApiError>;

    /// Objects ordered by key, starting after `start_after` when given.
    async fn list(
        &self,
        namespace: Option<&str>,
        start_after: Option<&ObjectKey>,
        limit: Option<usize>,
    ) -> Result<StoreList<K>, ApiError>;

    /// Reads the current object, applies `try_update` and swaps the result in
    /// if nothing was written in between, retrying otherwise.
    async fn guaranteed_update(&self, key: &ObjectKey, try_update: TryUpdate<'_, K>) -> Result<K, ApiError>;

    async fn delete(&self, key: &ObjectKey, preconditions: Option<&Preconditions>) -> Result<K, ApiError>;

    /// Events after `from_revision`, or from now on when it's `None`. A
    /// revision ahead of the store is a bad request.
    async fn watch(&self, namespace: Option<&str>, from_revision: Option<u64>) -> Result<EventStream<K>, ApiError>;

    async fn current_revision(&self) -> u64;
}

pub fn parse_revision(resource_version: &str) -> Result<u64, ApiError> {
    resource_version.parse().map_err(|_| {
        ApiError::bad_request(format!("invalid resourceVersion '{resource_version}'"))
    })
}

pub fn revision_of<K: Resource>(object: &K) -> Option<u64> {
    object
        .meta()
        .resource_version
        .as_deref()
        .and_then(|version| version.parse().ok())
}
