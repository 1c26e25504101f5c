use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use kube::core::WatchEvent;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    api::request::{RestRequest, Verb, STATUS_SUBRESOURCE},
    error::ApiError,
    strategy::{typer::TypeDescriptor, RequestContext},
};

use super::{RegistryObject, ResourceStore};

pub type ValueWatchStream = BoxStream<'static, WatchEvent<Value>>;

/// Type erased entry point the scheme routes raw requests to.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn type_descriptor(&self) -> &TypeDescriptor;

    async fn handle(&self, request: RestRequest) -> Result<Value, ApiError>;

    async fn watch(&self, request: RestRequest) -> Result<ValueWatchStream, ApiError>;
}

#[async_trait]
impl<K: RegistryObject> ResourceHandler for ResourceStore<K> {
    fn type_descriptor(&self) -> &TypeDescriptor {
        ResourceStore::type_descriptor(self)
    }

    async fn handle(&self, request: RestRequest) -> Result<Value, ApiError> {
        debug!("{} {}", request.verb, request.path());

        let ctx = RequestContext {
            namespace: request.namespace.clone(),
        };

        match (
            request.verb,
            request.name.as_deref(),
            request.subresource.as_deref(),
        ) {
            (Verb::Create, None, None) => {
                let object = decode_body::<K>(request.body)?;
                encode(&self.create(&ctx, object).await?)
            }
            (Verb::Replace, Some(name), None) => {
                let object = decode_body::<K>(request.body)?;
                encode(&self.update(&ctx, name, object).await?)
            }
            (Verb::Replace, Some(name), Some(STATUS_SUBRESOURCE)) => {
                let object = decode_body::<K>(request.body)?;
                encode(&self.update_status(&ctx, name, object).await?)
            }
            (Verb::Get(params), Some(name), None | Some(STATUS_SUBRESOURCE)) => {
                encode(&self.get(&ctx, name, &params).await?)
            }
            (Verb::List(params), None, None) => encode(&self.list(&ctx, &params).await?),
            (Verb::Watch(..), None, None) => Err(ApiError::bad_request(
                "watch requests must be opened as a stream",
            )),
            (Verb::Delete(params), Some(name), None) => {
                encode(&self.delete(&ctx, name, &params).await?)
            }
            (Verb::DeleteCollection(params, list_params), None, None) => {
                encode(&self.delete_collection(&ctx, &params, &list_params).await?)
            }
            (verb, _, subresource) => Err(ApiError::bad_request(format!(
                "{verb} isn't supported on {}{}",
                self.type_descriptor().plural,
                subresource
                    .map(|subresource| format!("/{subresource}"))
                    .unwrap_or_default()
            ))),
        }
    }

    async fn watch(&self, request: RestRequest) -> Result<ValueWatchStream, ApiError> {
        let (params, version) = match (request.verb, request.name) {
            (Verb::Watch(params, version), None) => (params, version),
            _ => {
                return Err(ApiError::bad_request(
                    "watch is only supported on collections",
                ))
            }
        };

        let ctx = RequestContext {
            namespace: request.namespace,
        };
        let events = ResourceStore::watch(self, &ctx, &params, &version).await?;

        Ok(events.map(encode_event).boxed())
    }
}

fn decode_body<K: DeserializeOwned>(body: Option<Value>) -> Result<K, ApiError> {
    let body = body.ok_or_else(|| ApiError::bad_request("the request needs a body"))?;
    serde_json::from_value(body).map_err(|error| ApiError::bad_request(error.to_string()))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    Ok(serde_json::to_value(value)?)
}

fn encode_event<K: RegistryObject>(event: WatchEvent<K>) -> WatchEvent<Value> {
    let encoded = match event {
        WatchEvent::Added(object) => encode(&object).map(WatchEvent::Added),
        WatchEvent::Modified(object) => encode(&object).map(WatchEvent::Modified),
        WatchEvent::Deleted(object) => encode(&object).map(WatchEvent::Deleted),
        WatchEvent::Bookmark(bookmark) => Ok(WatchEvent::Bookmark(bookmark)),
        WatchEvent::Error(error) => Ok(WatchEvent::Error(error)),
    };

    encoded.unwrap_or_else(|error| WatchEvent::Error(error.to_error_response()))
}
