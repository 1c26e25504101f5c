use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::core::WatchEvent;
use netattach_core::{api::request::RestRequest, error::ApiError};
use serde_json::Value;

pub mod cluster;
pub mod local;

pub type EventStream = BoxStream<'static, Result<WatchEvent<Value>, ApiError>>;

/// Carries [`RestRequest`]s to whatever serves them.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: RestRequest) -> Result<Value, ApiError>;

    async fn watch(&self, request: RestRequest) -> Result<EventStream, ApiError>;
}
