use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use netattach_core::{api::request::RestRequest, error::ApiError, registry::scheme::Scheme};
use serde_json::Value;

use super::{EventStream, Transport};

/// Serves requests from a [`Scheme`] living in the same process.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    scheme: Arc<Scheme>,
}

impl LocalTransport {
    pub fn new(scheme: Arc<Scheme>) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn execute(&self, request: RestRequest) -> Result<Value, ApiError> {
        self.scheme.execute(request).await
    }

    async fn watch(&self, request: RestRequest) -> Result<EventStream, ApiError> {
        Ok(self.scheme.watch(request).await?.map(Ok).boxed())
    }
}
