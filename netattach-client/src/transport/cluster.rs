use async_trait::async_trait;
use futures::StreamExt;
use kube::{api::PostParams, core::Request, Client};
use log::debug;
use netattach_core::{
    api::request::{RestRequest, Verb},
    error::ApiError,
};
use serde_json::Value;

use super::{EventStream, Transport};

/// Talks to a cluster's API server through a [`kube::Client`].
#[derive(Clone)]
pub struct KubeTransport {
    client: Client,
}

impl KubeTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for KubeTransport {
    async fn execute(&self, request: RestRequest) -> Result<Value, ApiError> {
        let request = to_http_request(&request)?;

        Ok(self.client.request::<Value>(request).await?)
    }

    async fn watch(&self, request: RestRequest) -> Result<EventStream, ApiError> {
        let request = to_http_request(&request)?;
        let events = self.client.request_events::<Value>(request).await?;

        Ok(events
            .map(|event| event.map_err(ApiError::from))
            .boxed())
    }
}

pub fn to_http_request(request: &RestRequest) -> Result<http::Request<Vec<u8>>, ApiError> {
    debug!("{} {}", request.verb, request.path());

    let collection = Request::new(request.collection_path());
    let name = request.name.as_deref().unwrap_or_default();
    let post = PostParams::default();

    let built = match (&request.verb, request.subresource.as_deref()) {
        (Verb::Create, None) => collection.create(&post, body(request)?),
        (Verb::Replace, None) => collection.replace(name, &post, body(request)?),
        (Verb::Replace, Some(subresource)) => {
            collection.replace_subresource(subresource, name, &post, body(request)?)
        }
        (Verb::Get(params), None) => collection.get(name, params),
        (Verb::Get(_), Some(subresource)) => collection.get_subresource(subresource, name),
        (Verb::List(params), None) => collection.list(params),
        (Verb::Watch(params, version), None) => collection.watch(params, version),
        (Verb::Delete(params), None) => collection.delete(name, params),
        (Verb::DeleteCollection(params, list_params), None) => {
            collection.delete_collection(params, list_params)
        }
        (verb, Some(subresource)) => {
            return Err(ApiError::bad_request(format!(
                "{verb} isn't supported on subresource {subresource}"
            )))
        }
    };

    built.map_err(|error| ApiError::bad_request(error.to_string()))
}

fn body(request: &RestRequest) -> Result<Vec<u8>, ApiError> {
    match &request.body {
        Some(body) => Ok(serde_json::to_vec(body)?),
        None => Err(ApiError::bad_request(format!(
            "{} needs a body",
            request.verb
        ))),
    }
}

#[cfg(test)]
mod tests {
    use kube::api::{DeleteParams, ListParams, Preconditions, WatchParams};
    use netattach_core::{
        api::request::{RestRequest, Verb},
        resources::crd::v1alpha1::network::Network,
        strategy::typer::TypeDescriptor,
    };
    use serde_json::json;

    use super::to_http_request;

    fn request(verb: Verb) -> netattach_core::api::request::RestRequestBuilder {
        let mut builder = RestRequest::builder();
        builder
            .verb(verb)
            .for_type(&TypeDescriptor::of::<Network>(true))
            .namespace("default");
        builder
    }

    #[test]
    fn status_updates_put_to_the_subresource() {
        let status = request(Verb::Replace)
            .name("net1")
            .subresource("status")
            .body(json!({ "status": { "state": "Ready" } }))
            .build()
            .unwrap();

        let http_request = to_http_request(&status).unwrap();

        assert_eq!(http_request.method(), http::Method::PUT);
        assert_eq!(
            http_request.uri().path(),
            "/apis/netattach.dev/v1alpha1/namespaces/default/networks/net1/status"
        );
        assert_eq!(
            http_request.headers()[http::header::CONTENT_TYPE],
            "application/json"
        );
        assert!(!http_request.body().is_empty());
    }

    #[test]
    fn list_params_become_the_query() {
        let list = request(Verb::List(
            ListParams::default().labels("tier=edge").limit(2),
        ))
        .build()
        .unwrap();

        let http_request = to_http_request(&list).unwrap();

        assert_eq!(http_request.method(), http::Method::GET);
        assert_eq!(
            http_request.uri().query(),
            Some("&labelSelector=tier%3Dedge&limit=2")
        );
        assert!(http_request.body().is_empty());
    }

    #[test]
    fn watches_carry_the_resource_version() {
        let watch = request(Verb::Watch(WatchParams::default(), "12".to_owned()))
            .build()
            .unwrap();

        let query = to_http_request(&watch)
            .unwrap()
            .uri()
            .query()
            .unwrap_or_default()
            .to_owned();

        assert!(query.contains("watch=true"));
        assert!(query.contains("resourceVersion=12"));
    }

    #[test]
    fn delete_preconditions_travel_in_the_body() {
        let params = DeleteParams::default().preconditions(Preconditions {
            uid: Some("abc".to_owned()),
            resource_version: None,
        });
        let delete = request(Verb::Delete(params)).name("net1").build().unwrap();

        let http_request = to_http_request(&delete).unwrap();
        let body: serde_json::Value = serde_json::from_slice(http_request.body()).unwrap();

        assert_eq!(http_request.method(), http::Method::DELETE);
        assert_eq!(body, json!({ "preconditions": { "uid": "abc" } }));
    }

    #[test]
    fn writes_without_a_body_are_rejected() {
        let create = request(Verb::Create).build().unwrap();

        assert_eq!(to_http_request(&create).unwrap_err().code(), 400);
    }
}
