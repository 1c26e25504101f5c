use std::{fmt::Debug, sync::Arc, time::Duration};

use data_encoding::BASE64URL_NOPAD;
use derive_builder::Builder;
use futures::{future::ready, stream::BoxStream, StreamExt};
use kube::{
    api::{DeleteParams, GetParams, ListParams, WatchParams},
    core::{ListMeta, ObjectList, WatchEvent},
};
use log::{debug, info};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::ApiError,
    helpers::{display_name, require_name},
    selection::{AttrFunc, SelectionPredicate},
    storage::{parse_revision, revision_of, ObjectKey, Storage, StorageObject, StoreEvent},
    strategy::{typer::TypeDescriptor, RequestContext, RestStrategy, StatusStrategy},
    validation::{FieldError, FieldPath},
};

pub mod handler;
pub mod network;
pub mod scheme;

const MAX_GENERATE_NAME_ATTEMPTS: usize = 8;
const NAME_FIELD: &str = "metadata.name";
const OPTIMISTIC_LOCK_ERROR: &str =
    "the object has been modified; please apply your changes to the latest version and try again";

/// Anything a [`ResourceStore`] can serve.
pub trait RegistryObject: StorageObject + Serialize + DeserializeOwned + Debug {}

impl<T> RegistryObject for T where T: StorageObject + Serialize + DeserializeOwned + Debug {}

pub type WatchStream<K> = BoxStream<'static, WatchEvent<K>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateTarget {
    Object,
    Status,
}

/// Server side CRUD and watch for one kind, driving its strategies against a
/// storage backend.
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct ResourceStore<K: RegistryObject> {
    strategy: Arc<dyn RestStrategy<K>>,
    status_strategy: Arc<dyn StatusStrategy<K>>,
    get_attrs: AttrFunc<K>,
    /// Field selectors may only name these.
    selectable_fields: &'static [&'static str],
    storage: Arc<dyn Storage<K>>,
}

impl<K: RegistryObject> ResourceStore<K> {
    pub fn builder() -> ResourceStoreBuilder<K> {
        ResourceStoreBuilder::default()
    }

    pub fn type_descriptor(&self) -> &TypeDescriptor {
        self.strategy.type_descriptor()
    }

    pub fn strategy(&self) -> &dyn RestStrategy<K> {
        self.strategy.as_ref()
    }

    fn kind(&self) -> &str {
        &self.type_descriptor().kind
    }

    pub async fn create(&self, ctx: &RequestContext, mut object: K) -> Result<K, ApiError> {
        self.admit_namespace(ctx, &mut object)?;

        if object
            .meta()
            .resource_version
            .as_deref()
            .map_or(false, |version| !version.is_empty())
        {
            return Err(ApiError::bad_request(
                "resourceVersion should not be set on objects to be created",
            ));
        }

        let generate_from = match object.meta().name.as_deref() {
            Some(name) if !name.is_empty() => None,
            _ => object
                .meta()
                .generate_name
                .clone()
                .filter(|base| !base.is_empty()),
        };

        let attempts = match generate_from {
            Some(_) => MAX_GENERATE_NAME_ATTEMPTS,
            None => 1,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut candidate = object.clone();
            if let Some(base) = &generate_from {
                candidate.meta_mut().name = Some(self.strategy.generate_name(base));
            }

            match self.create_once(ctx, candidate).await {
                Err(error) if error.is_already_exists() && attempt < attempts => {
                    debug!(
                        "Generated {} name collided, retrying ({attempt}/{attempts})",
                        self.kind()
                    );
                }
                result => return result,
            }
        }
    }

    async fn create_once(&self, ctx: &RequestContext, mut object: K) -> Result<K, ApiError> {
        let meta = object.meta_mut();
        meta.uid = None;
        meta.creation_timestamp = None;

        self.strategy.prepare_for_create(ctx, &mut object);

        let errors = self.strategy.validate(ctx, &object);
        if !errors.is_empty() {
            return Err(ApiError::invalid(self.kind(), display_name(&object), errors));
        }

        self.strategy.canonicalize(&mut object);

        let key = self.object_key(ctx, require_name(&object)?)?;
        let created = self.storage.create(&key, object).await?;

        info!("Created {} {key}", self.kind());

        Ok(created)
    }

    pub async fn update(&self, ctx: &RequestContext, name: &str, object: K) -> Result<K, ApiError> {
        self.update_target(ctx, name, object, UpdateTarget::Object)
            .await
    }

    /// Persists only the status of `object`; spec and metadata changes are
    /// dropped by the status strategy.
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        name: &str,
        object: K,
    ) -> Result<K, ApiError> {
        self.update_target(ctx, name, object, UpdateTarget::Status)
            .await
    }

    async fn update_target(
        &self,
        ctx: &RequestContext,
        name: &str,
        mut object: K,
        target: UpdateTarget,
    ) -> Result<K, ApiError> {
        self.admit_namespace(ctx, &mut object)?;

        match object.meta().name.as_deref() {
            None | Some("") => object.meta_mut().name = Some(name.to_owned()),
            Some(object_name) if object_name != name => {
                return Err(ApiError::bad_request(format!(
                    "the name of the object ({object_name}) does not match the name on the URL ({name})"
                )))
            }
            Some(_) => {}
        }

        let key = self.object_key(ctx, name)?;
        let allow_unconditional = match target {
            UpdateTarget::Object => self.strategy.allow_unconditional_update(),
            UpdateTarget::Status => self.status_strategy.allow_unconditional_update(),
        };

        let expected_revision = match object
            .meta()
            .resource_version
            .as_deref()
            .filter(|version| !version.is_empty())
        {
            Some(version) => Some(parse_revision(version)?),
            None if allow_unconditional => None,
            None => {
                return Err(ApiError::invalid(
                    self.kind(),
                    name,
                    vec![FieldError::required(
                        FieldPath::new("metadata").child("resourceVersion"),
                        "must be specified for an update",
                    )]
                    .into(),
                ))
            }
        };

        let try_update = |current: &K| -> Result<Option<K>, ApiError> {
            self.prepare_update(ctx, &object, current, expected_revision, target)
        };

        let result = self.storage.guaranteed_update(&key, &try_update).await;

        match result {
            Err(error)
                if error.is_not_found()
                    && target == UpdateTarget::Object
                    && self.strategy.allow_create_on_update() =>
            {
                object.meta_mut().resource_version = None;
                self.create(ctx, object).await
            }
            Ok(updated) => {
                if revision_of(&updated) != expected_revision {
                    info!("Updated {} {key}", self.kind());
                }
                Ok(updated)
            }
            Err(error) => Err(error),
        }
    }

    fn prepare_update(
        &self,
        ctx: &RequestContext,
        object: &K,
        current: &K,
        expected_revision: Option<u64>,
        target: UpdateTarget,
    ) -> Result<Option<K>, ApiError> {
        let name = display_name(current);

        if let Some(expected) = expected_revision {
            if revision_of(current) != Some(expected) {
                return Err(ApiError::conflict(self.kind(), name, OPTIMISTIC_LOCK_ERROR));
            }
        }

        if let Some(uid) = object.meta().uid.as_deref().filter(|uid| !uid.is_empty()) {
            if current.meta().uid.as_deref() != Some(uid) {
                return Err(ApiError::conflict(
                    self.kind(),
                    name,
                    format!(
                        "Precondition failed: UID in precondition: {uid}, UID in object meta: {}",
                        current.meta().uid.as_deref().unwrap_or_default()
                    ),
                ));
            }
        }

        let mut updated = object.clone();
        let meta = updated.meta_mut();
        meta.resource_version = current.meta().resource_version.clone();
        meta.uid = current.meta().uid.clone();
        meta.creation_timestamp = current.meta().creation_timestamp.clone();

        let errors = match target {
            UpdateTarget::Object => {
                self.strategy.prepare_for_update(ctx, &mut updated, current);
                self.strategy.validate_update(ctx, &updated, current)
            }
            UpdateTarget::Status => {
                self.status_strategy
                    .prepare_for_status_update(ctx, &mut updated, current);
                self.status_strategy
                    .validate_status_update(ctx, &updated, current)
            }
        };

        if !errors.is_empty() {
            return Err(ApiError::invalid(self.kind(), name, errors));
        }

        self.strategy.canonicalize(&mut updated);

        if serde_json::to_value(&updated)? == serde_json::to_value(current)? {
            debug!("{} {name} is unchanged, skipping the write", self.kind());
            return Ok(None);
        }

        Ok(Some(updated))
    }

    pub async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        params: &DeleteParams,
    ) -> Result<K, ApiError> {
        check_delete_params(params)?;

        let key = self.object_key(ctx, name)?;
        let deleted = self
            .storage
            .delete(&key, params.preconditions.as_ref())
            .await?;

        info!("Deleted {} {key}", self.kind());

        Ok(deleted)
    }

    /// Deletes everything `list_params` selects within the request's
    /// namespace, one object at a time. Objects removed concurrently are
    /// skipped, any other failure aborts the sweep and leaves the already
    /// deleted objects deleted.
    pub async fn delete_collection(
        &self,
        ctx: &RequestContext,
        params: &DeleteParams,
        list_params: &ListParams,
    ) -> Result<ObjectList<K>, ApiError> {
        self.request_namespace(ctx)?;
        check_delete_params(params)?;

        let listed = self.list(ctx, list_params).await?;
        let mut deleted = Vec::with_capacity(listed.items.len());

        for item in listed.items {
            let name = require_name(&item)?;

            match self.delete(ctx, name, params).await {
                Ok(object) => deleted.push(object),
                Err(error) if error.is_not_found() => {
                    debug!("{} {name} is already gone, skipping", self.kind())
                }
                Err(error) => return Err(error),
            }
        }

        Ok(ObjectList {
            metadata: ListMeta {
                resource_version: Some(self.storage.current_revision().await.to_string()),
                ..Default::default()
            },
            items: deleted,
        })
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        params: &GetParams,
    ) -> Result<K, ApiError> {
        // the store always serves its latest state, which satisfies any
        // well-formed minimum revision
        if let Some(version) = params
            .resource_version
            .as_deref()
            .filter(|version| !version.is_empty())
        {
            parse_revision(version)?;
        }

        self.storage.get(&self.object_key(ctx, name)?).await
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        params: &ListParams,
    ) -> Result<ObjectList<K>, ApiError> {
        let namespace = self.list_namespace(ctx)?;
        let predicate =
            self.predicate(params.label_selector.as_deref(), params.field_selector.as_deref())?;
        let limit = params.limit.filter(|limit| *limit > 0).map(|limit| limit as usize);
        let start_after = params
            .continue_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .map(decode_continue)
            .transpose()?;

        if let (Some(start), Some(namespace)) = (&start_after, namespace) {
            if start.namespace.as_deref() != Some(namespace) {
                return Err(ApiError::bad_request(format!(
                    "continue key was issued for another namespace than {namespace}"
                )));
            }
        }

        if let (None, Some(namespace), Some(name)) = (
            &start_after,
            namespace,
            predicate.field.requires_exact_match(NAME_FIELD),
        ) {
            return self.list_single(namespace, name, &predicate).await;
        }

        let page = match predicate.is_everything() {
            true => {
                self.storage
                    .list(namespace, start_after.as_ref(), limit)
                    .await?
            }
            false => {
                let mut page = self
                    .storage
                    .list(namespace, start_after.as_ref(), None)
                    .await?;
                let mut matching = page.items.into_iter().filter(|item| predicate.matches(item));
                page.items = match limit {
                    Some(limit) => matching.by_ref().take(limit).collect(),
                    None => matching.by_ref().collect(),
                };
                page.has_more = matching.next().is_some();
                page
            }
        };

        let continue_token = match page.has_more {
            true => page
                .items
                .last()
                .and_then(|item| ObjectKey::of(item))
                .map(|key| encode_continue(&key, page.revision))
                .transpose()?,
            false => None,
        };

        debug!(
            "Listed {} {} (continue: {})",
            page.items.len(),
            self.type_descriptor().plural,
            continue_token.is_some()
        );

        Ok(ObjectList {
            metadata: ListMeta {
                resource_version: Some(page.revision.to_string()),
                continue_: continue_token,
                ..Default::default()
            },
            items: page.items,
        })
    }

    async fn list_single(
        &self,
        namespace: &str,
        name: &str,
        predicate: &SelectionPredicate<K>,
    ) -> Result<ObjectList<K>, ApiError> {
        let revision = self.storage.current_revision().await;
        let items = match self
            .storage
            .get(&ObjectKey::namespaced(namespace, name))
            .await
        {
            Ok(object) if predicate.matches(&object) => vec![object],
            Ok(_) => Vec::new(),
            Err(error) if error.is_not_found() => Vec::new(),
            Err(error) => return Err(error),
        };

        Ok(ObjectList {
            metadata: ListMeta {
                resource_version: Some(revision.to_string()),
                ..Default::default()
            },
            items,
        })
    }

    /// Streams changes to matching objects after `version`, or from now on
    /// when it's `""` or `"0"`. An object that stops matching is reported as
    /// deleted, one that starts matching as added. Store errors are delivered
    /// as a final `Error` event.
    pub async fn watch(
        &self,
        ctx: &RequestContext,
        params: &WatchParams,
        version: &str,
    ) -> Result<WatchStream<K>, ApiError> {
        let namespace = self.list_namespace(ctx)?;
        let predicate =
            self.predicate(params.label_selector.as_deref(), params.field_selector.as_deref())?;
        let from_revision = match version {
            "" | "0" => None,
            version => Some(parse_revision(version)?),
        };

        debug!(
            "Watching {} in {} from {from_revision:?} ({predicate:?})",
            self.type_descriptor().plural,
            namespace.unwrap_or("all namespaces")
        );

        let events = self
            .storage
            .watch(namespace, from_revision)
            .await?
            .filter_map(move |event| {
                ready(match event {
                    Ok(event) => to_watch_event(&predicate, event),
                    Err(error) => Some(WatchEvent::Error(error.to_error_response())),
                })
            });

        Ok(match params.timeout {
            Some(seconds) => events
                .take_until(tokio::time::sleep(Duration::from_secs(seconds.into())))
                .boxed(),
            None => events.boxed(),
        })
    }

    fn predicate(
        &self,
        label_selector: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<SelectionPredicate<K>, ApiError> {
        let predicate = SelectionPredicate::parse(label_selector, field_selector, self.get_attrs)?;
        predicate.field.check_fields(self.selectable_fields)?;

        Ok(predicate)
    }

    fn object_key(&self, ctx: &RequestContext, name: &str) -> Result<ObjectKey, ApiError> {
        Ok(ObjectKey::new(self.request_namespace(ctx)?, name))
    }

    fn request_namespace<'a>(&self, ctx: &'a RequestContext) -> Result<Option<&'a str>, ApiError> {
        let namespace = ctx.namespace.as_deref().filter(|ns| !ns.is_empty());

        match (self.strategy.namespace_scoped(), namespace) {
            (true, None) => Err(ApiError::bad_request(format!(
                "{} is namespaced, the request needs a namespace",
                self.kind()
            ))),
            (false, Some(namespace)) => Err(ApiError::bad_request(format!(
                "{} is cluster scoped, the request can't target namespace {namespace}",
                self.kind()
            ))),
            (_, namespace) => Ok(namespace),
        }
    }

    /// Like [`Self::request_namespace`], but a namespaced kind may be listed
    /// across all namespaces.
    fn list_namespace<'a>(&self, ctx: &'a RequestContext) -> Result<Option<&'a str>, ApiError> {
        match ctx.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            None => Ok(None),
            Some(_) => self.request_namespace(ctx),
        }
    }

    fn admit_namespace(&self, ctx: &RequestContext, object: &mut K) -> Result<(), ApiError> {
        let namespace = self.request_namespace(ctx)?;
        let meta = object.meta_mut();

        match (namespace, meta.namespace.as_deref().filter(|ns| !ns.is_empty())) {
            (Some(expected), Some(actual)) if expected != actual => Err(ApiError::bad_request(
                "the namespace of the provided object does not match the namespace sent on the request",
            )),
            _ => {
                meta.namespace = namespace.map(str::to_owned);
                Ok(())
            }
        }
    }
}

/// Deletes take effect immediately and have no dependents, so only the
/// preconditions matter. A dry run is refused rather than performed.
fn check_delete_params(params: &DeleteParams) -> Result<(), ApiError> {
    match params.dry_run {
        true => Err(ApiError::bad_request("dryRun is not supported")),
        false => Ok(()),
    }
}

fn to_watch_event<K: RegistryObject>(
    predicate: &SelectionPredicate<K>,
    event: StoreEvent<K>,
) -> Option<WatchEvent<K>> {
    match event {
        StoreEvent::Added(object) => predicate
            .matches(&object)
            .then(|| WatchEvent::Added(object)),
        StoreEvent::Modified { previous, object } => {
            match (predicate.matches(&previous), predicate.matches(&object)) {
                (true, true) => Some(WatchEvent::Modified(object)),
                (false, true) => Some(WatchEvent::Added(object)),
                (true, false) => {
                    let mut previous = previous;
                    previous.meta_mut().resource_version = object.meta().resource_version.clone();
                    Some(WatchEvent::Deleted(previous))
                }
                (false, false) => None,
            }
        }
        StoreEvent::Deleted(object) => predicate
            .matches(&object)
            .then(|| WatchEvent::Deleted(object)),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ContinueToken {
    #[serde(rename = "rv")]
    revision: u64,
    #[serde(rename = "ns", default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    start: String,
}

fn encode_continue(key: &ObjectKey, revision: u64) -> Result<String, ApiError> {
    let token = ContinueToken {
        revision,
        namespace: key.namespace.clone(),
        start: key.name.to_owned(),
    };

    Ok(BASE64URL_NOPAD.encode(&serde_json::to_vec(&token)?))
}

fn decode_continue(token: &str) -> Result<ObjectKey, ApiError> {
    let invalid = || ApiError::bad_request("continue key is not valid");
    let bytes = BASE64URL_NOPAD
        .decode(token.as_bytes())
        .map_err(|_| invalid())?;
    let token: ContinueToken = serde_json::from_slice(&bytes).map_err(|_| invalid())?;

    Ok(ObjectKey {
        namespace: token.namespace,
        name: token.start,
    })
}
