use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use futures::{future::ready, stream, StreamExt};
use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, chrono::Utc};
use kube::api::Preconditions;
use log::{debug, warn};
use rand::{thread_rng, Rng};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::{config::StorageConfig, error::ApiError, helpers::pretty_type_name};

use super::{
    revision_of, EventStream, ObjectKey, Storage, StorageObject, StoreEvent, StoreList, TryUpdate,
};

type Revisioned<K> = (u64, StoreEvent<K>);

struct State<K> {
    objects: BTreeMap<ObjectKey, K>,
    revision: u64,
    history: VecDeque<Revisioned<K>>,
}

/// Process local [`Storage`] keeping every object in a sorted map.
///
/// Writers serialize on a single lock and publish events while holding it, so
/// watchers observe events in revision order. Each watcher gets a bounded
/// buffer; one that falls further behind than `watch_buffer_size` events gets
/// a single `Expired` error and its stream ends.
pub struct MemoryStorage<K> {
    state: RwLock<State<K>>,
    events: broadcast::Sender<Revisioned<K>>,
    config: StorageConfig,
}

impl<K: StorageObject> MemoryStorage<K> {
    pub fn new(config: StorageConfig) -> Self {
        let (events, _) = broadcast::channel(config.watch_buffer_size.max(1));

        Self {
            state: RwLock::new(State {
                objects: BTreeMap::new(),
                revision: 0,
                history: VecDeque::with_capacity(config.event_history_size),
            }),
            events,
            config,
        }
    }

    fn kind() -> String {
        K::kind(&()).into_owned()
    }

    fn publish(&self, state: &mut State<K>, event: StoreEvent<K>) {
        let revision = state.revision;

        if self.config.event_history_size > 0 {
            if state.history.len() >= self.config.event_history_size {
                state.history.pop_front();
            }
            state.history.push_back((revision, event.clone()));
        }

        // no receivers is fine, nobody is watching
        let _ = self.events.send((revision, event));
    }
}

impl<K: StorageObject> Default for MemoryStorage<K> {
    fn default() -> Self {
        Self::new(StorageConfig::default())
    }
}

#[async_trait]
impl<K: StorageObject> Storage<K> for MemoryStorage<K> {
    async fn create(&self, key: &ObjectKey, mut object: K) -> Result<K, ApiError> {
        let mut state = self.state.write().await;

        if state.objects.contains_key(key) {
            return Err(ApiError::already_exists(&Self::kind(), &key.name));
        }

        state.revision += 1;
        let meta = object.meta_mut();
        meta.resource_version = Some(state.revision.to_string());
        meta.uid = Some(generate_uid());
        meta.creation_timestamp = Some(Time(Utc::now()));

        debug!("Created {} {key} at revision {}", Self::kind(), state.revision);

        state.objects.insert(key.clone(), object.clone());
        self.publish(&mut state, StoreEvent::Added(object.clone()));

        Ok(object)
    }

    async fn get(&self, key: &ObjectKey) -> Result<K, ApiError> {
        self.state
            .read()
            .await
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| ApiError::not_found(&Self::kind(), &key.name))
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        start_after: Option<&ObjectKey>,
        limit: Option<usize>,
    ) -> Result<StoreList<K>, ApiError> {
        let state = self.state.read().await;
        let mut matching = state
            .objects
            .iter()
            .filter(|(key, _)| key.in_namespace(namespace))
            .filter(|(key, _)| start_after.map_or(true, |start| *key > start))
            .map(|(_, object)| object);

        let items = match limit {
            Some(limit) => matching.by_ref().take(limit).cloned().collect(),
            None => matching.by_ref().cloned().collect(),
        };
        let has_more = matching.next().is_some();

        Ok(StoreList {
            items,
            revision: state.revision,
            has_more,
        })
    }

    async fn guaranteed_update(
        &self,
        key: &ObjectKey,
        try_update: TryUpdate<'_, K>,
    ) -> Result<K, ApiError> {
        loop {
            let current = self.get(key).await?;
            let current_revision = revision_of(&current);

            let mut updated = match try_update(&current)? {
                Some(updated) => updated,
                None => return Ok(current),
            };

            let mut state = self.state.write().await;
            let stored = state
                .objects
                .get(key)
                .cloned()
                .ok_or_else(|| ApiError::not_found(&Self::kind(), &key.name))?;

            if revision_of(&stored) != current_revision {
                debug!("{} {key} changed while updating, retrying", Self::kind());
                continue;
            }

            state.revision += 1;
            let meta = updated.meta_mut();
            meta.resource_version = Some(state.revision.to_string());
            meta.uid = stored.meta().uid.clone();
            meta.creation_timestamp = stored.meta().creation_timestamp.clone();

            debug!("Updated {} {key} to revision {}", Self::kind(), state.revision);

            state.objects.insert(key.clone(), updated.clone());
            self.publish(
                &mut state,
                StoreEvent::Modified {
                    previous: stored,
                    object: updated.clone(),
                },
            );

            return Ok(updated);
        }
    }

    async fn delete(
        &self,
        key: &ObjectKey,
        preconditions: Option<&Preconditions>,
    ) -> Result<K, ApiError> {
        let mut state = self.state.write().await;
        let stored = state
            .objects
            .get(key)
            .ok_or_else(|| ApiError::not_found(&Self::kind(), &key.name))?;

        if let Some(preconditions) = preconditions {
            check_preconditions(stored, preconditions, &Self::kind(), &key.name)?;
        }

        let mut deleted = state
            .objects
            .remove(key)
            .ok_or_else(|| ApiError::not_found(&Self::kind(), &key.name))?;

        state.revision += 1;
        deleted.meta_mut().resource_version = Some(state.revision.to_string());

        debug!("Deleted {} {key} at revision {}", Self::kind(), state.revision);

        self.publish(&mut state, StoreEvent::Deleted(deleted.clone()));

        Ok(deleted)
    }

    async fn watch(
        &self,
        namespace: Option<&str>,
        from_revision: Option<u64>,
    ) -> Result<EventStream<K>, ApiError> {
        // subscribing under the lock splits events cleanly into replayed and live
        let state = self.state.read().await;
        let receiver = self.events.subscribe();

        let replay = match from_revision {
            Some(from) if from > state.revision => {
                return Err(ApiError::bad_request(format!(
                    "too large resource version: {from}, current: {}",
                    state.revision
                )))
            }
            Some(from) if from < state.revision => {
                let oldest_retained = state.history.front().map(|(revision, _)| *revision);
                match oldest_retained {
                    Some(oldest) if oldest <= from + 1 => state
                        .history
                        .iter()
                        .filter(|(revision, _)| *revision > from)
                        .cloned()
                        .collect::<Vec<_>>(),
                    _ => {
                        return Err(ApiError::Expired(format!(
                            "revision {from} is older than the retained event history"
                        )))
                    }
                }
            }
            _ => Vec::new(),
        };
        drop(state);

        let namespace = namespace.map(str::to_owned);
        let kind = Self::kind();
        let in_namespace = move |event: &StoreEvent<K>| {
            event
                .key()
                .map_or(false, |key| key.in_namespace(namespace.as_deref()))
        };
        let live_filter = in_namespace.clone();

        let replayed = stream::iter(replay)
            .filter(move |(_, event)| ready(in_namespace(event)))
            .map(|(_, event)| Ok(event));

        let live = BroadcastStream::new(receiver)
            .map(move |received| match received {
                Ok((_, event)) => Ok(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("{kind} watcher fell {skipped} events behind, expiring it");
                    Err(ApiError::Expired(format!(
                        "watcher fell {skipped} events behind"
                    )))
                }
            })
            .filter(move |received| {
                ready(match received {
                    Ok(event) => live_filter(event),
                    Err(_) => true,
                })
            })
            .scan(false, |expired, received| {
                if *expired {
                    return ready(None);
                }
                *expired = received.is_err();
                ready(Some(received))
            });

        Ok(replayed.chain(live).boxed())
    }

    async fn current_revision(&self) -> u64 {
        self.state.read().await.revision
    }
}

fn check_preconditions<K: StorageObject>(
    stored: &K,
    preconditions: &Preconditions,
    kind: &str,
    name: &str,
) -> Result<(), ApiError> {
    let meta = stored.meta();

    if let Some(uid) = &preconditions.uid {
        if meta.uid.as_ref() != Some(uid) {
            return Err(ApiError::conflict(
                kind,
                name,
                format!(
                    "precondition failed: UID in precondition: {uid}, UID in object meta: {}",
                    meta.uid.as_deref().unwrap_or_default()
                ),
            ));
        }
    }

    if let Some(resource_version) = &preconditions.resource_version {
        if meta.resource_version.as_ref() != Some(resource_version) {
            return Err(ApiError::conflict(
                kind,
                name,
                format!(
                    "precondition failed: ResourceVersion in precondition: {resource_version}, ResourceVersion in object meta: {}",
                    meta.resource_version.as_deref().unwrap_or_default()
                ),
            ));
        }
    }

    Ok(())
}

fn generate_uid() -> String {
    let value = thread_rng().gen::<u128>();
    let hex = format!("{value:032x}");

    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

impl<K> std::fmt::Debug for MemoryStorage<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(&format!("MemoryStorage<{}>", pretty_type_name::<K>()))
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use kube::{api::Preconditions, core::ObjectMeta};

    use crate::{
        config::StorageConfig,
        error::ApiError,
        resources::crd::v1alpha1::network::{Network, NetworkSpec},
        storage::{ObjectKey, Storage, StoreEvent},
    };

    use super::MemoryStorage;

    fn network(namespace: &str, name: &str, plugin: &str) -> Network {
        Network {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some(namespace.to_owned()),
                ..Default::default()
            },
            spec: NetworkSpec {
                plugin: plugin.to_owned(),
                ..Default::default()
            },
            status: None,
        }
    }

    async fn seeded(storage: &MemoryStorage<Network>, namespace: &str, name: &str) -> Network {
        storage
            .create(
                &ObjectKey::namespaced(namespace, name),
                network(namespace, name, "vendorA"),
            )
            .await
            .unwrap()
    }

    fn set_plugin(plugin: &'static str) -> impl Fn(&Network) -> Result<Option<Network>, ApiError> + Send + Sync {
        move |current| {
            let mut updated = current.clone();
            updated.spec.plugin = plugin.to_owned();
            Ok(Some(updated))
        }
    }

    #[tokio::test]
    async fn create_assigns_storage_owned_metadata() {
        let storage = MemoryStorage::default();
        let created = seeded(&storage, "default", "net1").await;

        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        assert!(created.metadata.uid.is_some());
        assert!(created.metadata.creation_timestamp.is_some());

        let error = storage
            .create(&ObjectKey::namespaced("default", "net1"), network("default", "net1", "x"))
            .await
            .unwrap_err();
        assert!(error.is_already_exists());
    }

    #[tokio::test]
    async fn updates_bump_the_revision_and_keep_identity() {
        let storage = MemoryStorage::default();
        let created = seeded(&storage, "default", "net1").await;
        let key = ObjectKey::namespaced("default", "net1");

        let updated = storage
            .guaranteed_update(&key, &set_plugin("vendorB"))
            .await
            .unwrap();

        assert_eq!(updated.spec.plugin, "vendorB");
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(updated.metadata.uid, created.metadata.uid);
    }

    #[tokio::test]
    async fn noop_updates_keep_the_revision() {
        let storage = MemoryStorage::default();
        seeded(&storage, "default", "net1").await;
        let key = ObjectKey::namespaced("default", "net1");

        let unchanged = storage
            .guaranteed_update(&key, &|_: &Network| -> Result<Option<Network>, ApiError> {
                Ok(None)
            })
            .await
            .unwrap();

        assert_eq!(unchanged.metadata.resource_version.as_deref(), Some("1"));
        assert_eq!(storage.current_revision().await, 1);
    }

    #[tokio::test]
    async fn list_pages_by_key_within_a_namespace() {
        let storage = MemoryStorage::default();
        for name in ["net3", "net1", "net2"] {
            seeded(&storage, "default", name).await;
        }
        seeded(&storage, "other", "net0").await;

        let first = storage.list(Some("default"), None, Some(2)).await.unwrap();
        let names = first
            .items
            .iter()
            .map(|n| n.metadata.name.clone().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["net1", "net2"]);
        assert!(first.has_more);

        let after = ObjectKey::namespaced("default", "net2");
        let second = storage.list(Some("default"), Some(&after), Some(2)).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(!second.has_more);

        assert_eq!(storage.list(None, None, None).await.unwrap().items.len(), 4);
    }

    #[tokio::test]
    async fn delete_checks_preconditions() {
        let storage = MemoryStorage::default();
        seeded(&storage, "default", "net1").await;
        let key = ObjectKey::namespaced("default", "net1");

        let stale = Preconditions {
            uid: None,
            resource_version: Some("7".to_owned()),
        };
        assert!(storage.delete(&key, Some(&stale)).await.unwrap_err().is_conflict());

        let deleted = storage.delete(&key, None).await.unwrap();
        assert_eq!(deleted.metadata.resource_version.as_deref(), Some("2"));
        assert!(storage.delete(&key, None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn watch_replays_history_then_follows_live_events() {
        let storage = MemoryStorage::default();
        seeded(&storage, "default", "net1").await;
        seeded(&storage, "other", "net2").await;
        seeded(&storage, "default", "net3").await;

        let mut events = storage.watch(Some("default"), Some(1)).await.unwrap();
        storage
            .delete(&ObjectKey::namespaced("default", "net1"), None)
            .await
            .unwrap();

        let replayed = events.next().await.unwrap().unwrap();
        assert!(matches!(replayed, StoreEvent::Added(ref n) if n.metadata.name.as_deref() == Some("net3")));

        let live = events.next().await.unwrap().unwrap();
        assert!(matches!(live, StoreEvent::Deleted(ref n) if n.metadata.name.as_deref() == Some("net1")));
    }

    #[tokio::test]
    async fn watch_from_compacted_revision_expires() {
        let storage = MemoryStorage::new(StorageConfig {
            watch_buffer_size: 16,
            event_history_size: 2,
        });
        for name in ["net1", "net2", "net3", "net4"] {
            seeded(&storage, "default", name).await;
        }

        let result = storage.watch(None, Some(1)).await;
        assert!(matches!(result, Err(ApiError::Expired(_))));
        assert!(storage.watch(None, Some(2)).await.is_ok());
    }

    #[tokio::test]
    async fn watch_from_a_future_revision_is_rejected() {
        let storage = MemoryStorage::default();
        seeded(&storage, "default", "net1").await;

        let error = storage.watch(None, Some(5)).await.err().unwrap();
        assert_eq!(error.code(), 400);

        let mut events = storage.watch(None, Some(1)).await.unwrap();
        seeded(&storage, "default", "net2").await;
        let live = events.next().await.unwrap().unwrap();
        assert_eq!(live.revision(), 2);
    }

    #[tokio::test]
    async fn lagging_watchers_expire_once_and_end() {
        let storage = MemoryStorage::new(StorageConfig {
            watch_buffer_size: 2,
            event_history_size: 16,
        });
        let mut events = storage.watch(None, None).await.unwrap();

        for name in ["net1", "net2", "net3", "net4", "net5"] {
            seeded(&storage, "default", name).await;
        }

        let first = events.next().await.unwrap();
        assert!(matches!(first, Err(ApiError::Expired(_))));
        assert!(events.next().await.is_none());
    }
}
