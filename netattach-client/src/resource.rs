use std::{future::Future, marker::PhantomData, sync::Arc, time::Duration};

use futures::{stream::BoxStream, StreamExt};
use kube::{
    api::{DeleteParams, GetParams, ListParams, WatchParams},
    core::{ObjectList, WatchEvent},
};
use log::debug;
use netattach_core::{
    api::request::{RestRequest, RestRequestBuilder, Verb, STATUS_SUBRESOURCE},
    error::ApiError,
    helpers::require_name,
    registry::RegistryObject,
    strategy::typer::TypeDescriptor,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::transport::Transport;

pub type ResourceWatchStream<K> = BoxStream<'static, Result<WatchEvent<K>, ApiError>>;

/// Typed access to one kind within one namespace.
pub struct ResourceClient<K> {
    transport: Arc<dyn Transport>,
    typer: TypeDescriptor,
    namespace: String,
    timeout: Option<Duration>,
    kind: PhantomData<fn() -> K>,
}

impl<K> Clone for ResourceClient<K> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            typer: self.typer.clone(),
            namespace: self.namespace.clone(),
            timeout: self.timeout,
            kind: PhantomData,
        }
    }
}

impl<K: RegistryObject> ResourceClient<K> {
    pub fn new(transport: Arc<dyn Transport>, namespace: &str) -> Self {
        Self {
            transport,
            typer: TypeDescriptor::of::<K>(true),
            namespace: namespace.to_owned(),
            timeout: None,
            kind: PhantomData,
        }
    }

    /// Bounds every call made through this client, expired calls fail with
    /// [`ApiError::Unavailable`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn create(&self, object: &K) -> Result<K, ApiError> {
        let request = self.request(Verb::Create).body(encode(object)?).build()?;

        self.execute(request).await
    }

    pub async fn update(&self, object: &K) -> Result<K, ApiError> {
        let request = self
            .request(Verb::Replace)
            .name(require_name(object)?)
            .body(encode(object)?)
            .build()?;

        self.execute(request).await
    }

    pub async fn update_status(&self, object: &K) -> Result<K, ApiError> {
        let request = self
            .request(Verb::Replace)
            .name(require_name(object)?)
            .subresource(STATUS_SUBRESOURCE)
            .body(encode(object)?)
            .build()?;

        self.execute(request).await
    }

    pub async fn delete(&self, name: &str, params: &DeleteParams) -> Result<K, ApiError> {
        let request = self
            .request(Verb::Delete(params.clone()))
            .name(name)
            .build()?;

        self.execute(request).await
    }

    /// Returns the objects that were actually deleted.
    pub async fn delete_collection(
        &self,
        params: &DeleteParams,
        list_params: &ListParams,
    ) -> Result<ObjectList<K>, ApiError> {
        let request = self
            .request(Verb::DeleteCollection(params.clone(), list_params.clone()))
            .build()?;

        self.execute(request).await
    }

    pub async fn get(&self, name: &str, params: &GetParams) -> Result<K, ApiError> {
        let request = self
            .request(Verb::Get(params.clone()))
            .name(name)
            .build()?;

        self.execute(request).await
    }

    pub async fn list(&self, params: &ListParams) -> Result<ObjectList<K>, ApiError> {
        let request = self.request(Verb::List(params.clone())).build()?;

        self.execute(request).await
    }

    /// Opens a watch after `version`, or from now on when it's `"0"`. The
    /// deadline only covers establishing the stream.
    pub async fn watch(
        &self,
        params: &WatchParams,
        version: &str,
    ) -> Result<ResourceWatchStream<K>, ApiError> {
        let request = self
            .request(Verb::Watch(params.clone(), version.to_owned()))
            .build()?;

        debug!("Watching {} from {version}", request.path());

        let events = self.deadline(self.transport.watch(request)).await?;

        Ok(events
            .map(|event| event.and_then(decode_event::<K>))
            .boxed())
    }

    fn request(&self, verb: Verb) -> RestRequestBuilder {
        let mut builder = RestRequest::builder();
        builder
            .verb(verb)
            .for_type(&self.typer)
            .namespace(self.namespace.as_str());
        builder
    }

    async fn execute<T: DeserializeOwned>(&self, request: RestRequest) -> Result<T, ApiError> {
        debug!("{} {}", request.verb, request.path());

        let value = self.deadline(self.transport.execute(request)).await?;

        Ok(serde_json::from_value(value)?)
    }

    async fn deadline<T>(
        &self,
        call: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| {
                    ApiError::Unavailable(format!(
                        "{} request timed out after {timeout:?}",
                        self.typer.plural
                    ))
                })?,
            None => call.await,
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    Ok(serde_json::to_value(value)?)
}

fn decode_event<K: DeserializeOwned>(event: WatchEvent<Value>) -> Result<WatchEvent<K>, ApiError> {
    Ok(match event {
        WatchEvent::Added(object) => WatchEvent::Added(serde_json::from_value(object)?),
        WatchEvent::Modified(object) => WatchEvent::Modified(serde_json::from_value(object)?),
        WatchEvent::Deleted(object) => WatchEvent::Deleted(serde_json::from_value(object)?),
        WatchEvent::Bookmark(bookmark) => WatchEvent::Bookmark(bookmark),
        WatchEvent::Error(error) => WatchEvent::Error(error),
    })
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc, time::Duration};

    use async_trait::async_trait;
    use futures::{future::pending, StreamExt};
    use kube::{
        api::{DeleteParams, GetParams, ListParams, Preconditions, WatchParams},
        core::{ObjectMeta, WatchEvent},
    };
    use netattach_core::{
        api::request::RestRequest,
        config::{StorageConfig, StrategyConfig},
        error::ApiError,
        registry::network::network_scheme,
        resources::crd::v1alpha1::network::{Network, NetworkSpec, NetworkState, NetworkStatus},
        strategy::UpdatePolicy,
    };
    use serde_json::Value;

    use crate::transport::{local::LocalTransport, EventStream, Transport};

    use super::ResourceClient;

    fn client(update_policy: UpdatePolicy) -> ResourceClient<Network> {
        let scheme = network_scheme(
            StrategyConfig::new(update_policy, false),
            StorageConfig::default(),
        )
        .unwrap();

        ResourceClient::new(Arc::new(LocalTransport::new(Arc::new(scheme))), "default")
    }

    fn network(name: &str, tier: &str) -> Network {
        Network {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                labels: Some(BTreeMap::from([("tier".to_owned(), tier.to_owned())])),
                ..Default::default()
            },
            spec: NetworkSpec {
                plugin: "vendorA".to_owned(),
                args: BTreeMap::new(),
                cidr_mask: Some("11.22.192.0/18".to_owned()),
                gateway: Some("11.22.192.1".to_owned()),
            },
            status: None,
        }
    }

    fn with_resource_version(resource_version: &str) -> DeleteParams {
        DeleteParams::default().preconditions(Preconditions {
            resource_version: Some(resource_version.to_owned()),
            uid: None,
        })
    }

    #[tokio::test]
    async fn network_lifecycle_with_generation_tracking() {
        let networks = client(UpdatePolicy::GenerationTracked);

        let created = networks.create(&network("net1", "edge")).await.unwrap();
        assert_eq!(created.metadata.generation, Some(1));
        assert!(created.metadata.resource_version.is_some());

        let unchanged = networks.update(&created).await.unwrap();
        assert_eq!(unchanged.metadata.generation, Some(1));

        let mut changed = unchanged.clone();
        changed.spec.plugin = "vendorB".to_owned();
        let changed = networks.update(&changed).await.unwrap();
        assert_eq!(changed.metadata.generation, Some(2));

        let mut stale = created.clone();
        stale.spec.plugin = "vendorC".to_owned();
        assert!(networks.update(&stale).await.unwrap_err().is_conflict());

        let fetched = networks.get("net1", &GetParams::default()).await.unwrap();
        assert_eq!(fetched.spec.plugin, "vendorB");
    }

    #[tokio::test]
    async fn network_lifecycle_with_immutable_spec() {
        let networks = client(UpdatePolicy::ImmutableSpec);

        let created = networks.create(&network("net1", "edge")).await.unwrap();
        let mut changed = created.clone();
        changed.spec.plugin = "vendorB".to_owned();
        let updated = networks.update(&changed).await.unwrap();

        assert_eq!(updated.spec.plugin, "vendorA");
        assert_eq!(updated.metadata.generation, Some(1));
    }

    #[tokio::test]
    async fn status_updates_go_through_the_subresource() {
        let networks = client(UpdatePolicy::GenerationTracked);
        let mut created = networks.create(&network("net1", "edge")).await.unwrap();

        created.status = Some(NetworkStatus {
            state: NetworkState::Pending,
            message: None,
            observed_generation: Some(1),
        });
        let updated = networks.update_status(&created).await.unwrap();

        assert_eq!(updated.status.unwrap().state, NetworkState::Pending);
    }

    #[tokio::test]
    async fn creation_errors_are_surfaced_unchanged() {
        let networks = client(UpdatePolicy::GenerationTracked);
        networks.create(&network("net1", "edge")).await.unwrap();

        assert!(networks
            .create(&network("net1", "edge"))
            .await
            .unwrap_err()
            .is_already_exists());

        let mut invalid = network("net2", "edge");
        invalid.spec.gateway = Some("10.0.0.1".to_owned());
        assert!(matches!(
            networks.create(&invalid).await.unwrap_err(),
            ApiError::Invalid { ref errors, .. } if errors.contains_path("spec.gateway")
        ));
    }

    #[tokio::test]
    async fn delete_and_delete_collection() {
        let networks = client(UpdatePolicy::GenerationTracked);
        for (name, tier) in [
            ("net1", "edge"),
            ("net2", "core"),
            ("net3", "edge"),
            ("net4", "core"),
            ("net5", "edge"),
        ] {
            networks.create(&network(name, tier)).await.unwrap();
        }

        let deleted = networks
            .delete_collection(
                &DeleteParams::default(),
                &ListParams::default().labels("tier=edge"),
            )
            .await
            .unwrap();
        assert_eq!(deleted.items.len(), 3);

        let remaining = networks.list(&ListParams::default()).await.unwrap();
        assert_eq!(remaining.items.len(), 2);

        let net2 = &remaining.items[0];
        let stale_version = with_resource_version("1");
        assert!(networks
            .delete("net2", &stale_version)
            .await
            .unwrap_err()
            .is_conflict());

        let by_version = with_resource_version(
            net2.metadata.resource_version.as_deref().unwrap(),
        );
        networks.delete("net2", &by_version).await.unwrap();
        assert!(networks
            .delete("net2", &DeleteParams::default())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn list_pages_through_continue_tokens() {
        let networks = client(UpdatePolicy::GenerationTracked);
        for name in ["net1", "net2", "net3"] {
            networks.create(&network(name, "edge")).await.unwrap();
        }

        let mut names = Vec::new();
        let mut params = ListParams::default().limit(2);
        loop {
            let page = networks.list(&params).await.unwrap();
            names.extend(page.items.iter().filter_map(|n| n.metadata.name.clone()));

            match page.metadata.continue_.as_deref() {
                Some(token) => params = params.continue_token(token),
                None => break,
            }
        }

        assert_eq!(names, vec!["net1", "net2", "net3"]);
    }

    #[tokio::test]
    async fn watch_streams_matching_changes() {
        let networks = client(UpdatePolicy::GenerationTracked);
        let mut events = networks
            .watch(&WatchParams::default().fields("metadata.name=net2"), "0")
            .await
            .unwrap();

        networks.create(&network("net1", "edge")).await.unwrap();
        let net2 = networks.create(&network("net2", "edge")).await.unwrap();
        networks.delete("net2", &DeleteParams::default()).await.unwrap();

        match events.next().await {
            Some(Ok(WatchEvent::Added(object))) => assert_eq!(object, net2),
            other => panic!("expected net2 to be added, got {other:?}"),
        }
        assert!(matches!(
            events.next().await,
            Some(Ok(WatchEvent::Deleted(_)))
        ));
    }

    #[tokio::test]
    async fn watch_rejects_malformed_selectors() {
        let networks = client(UpdatePolicy::GenerationTracked);

        let error = networks
            .watch(&WatchParams::default().labels("tier notin edge"), "0")
            .await
            .err()
            .unwrap();

        assert_eq!(error.code(), 400);
    }

    struct Unresponsive;

    #[async_trait]
    impl Transport for Unresponsive {
        async fn execute(&self, _: RestRequest) -> Result<Value, ApiError> {
            pending().await
        }

        async fn watch(&self, _: RestRequest) -> Result<EventStream, ApiError> {
            pending().await
        }
    }

    #[tokio::test]
    async fn deadlines_surface_as_unavailable() {
        let networks = ResourceClient::<Network>::new(Arc::new(Unresponsive), "default")
            .with_timeout(Duration::from_millis(20));

        let error = networks
            .get("net1", &GetParams::default())
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::Unavailable(_)));

        let error = networks
            .watch(&WatchParams::default(), "0")
            .await
            .err()
            .unwrap();
        assert_eq!(error.code(), 503);
    }
}
