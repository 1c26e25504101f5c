use std::fmt::{Display, Formatter};

use derive_builder::Builder;
use kube::api::{DeleteParams, GetParams, ListParams, WatchParams};
use serde_json::Value;

use crate::{error::ApiError, strategy::typer::TypeDescriptor};

pub const STATUS_SUBRESOURCE: &str = "status";

/// What a request asks for, together with the parameters of that call.
#[derive(Debug, Clone)]
pub enum Verb {
    Create,
    Replace,
    Get(GetParams),
    List(ListParams),
    /// Watch from the given resourceVersion, `""` or `"0"` meaning now.
    Watch(WatchParams, String),
    Delete(DeleteParams),
    DeleteCollection(DeleteParams, ListParams),
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Replace => "update",
            Verb::Get(_) => "get",
            Verb::List(_) => "list",
            Verb::Watch(..) => "watch",
            Verb::Delete(_) => "delete",
            Verb::DeleteCollection(..) => "deletecollection",
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Verb::Create => "POST",
            Verb::Replace => "PUT",
            Verb::Get(_) | Verb::List(_) | Verb::Watch(..) => "GET",
            Verb::Delete(_) | Verb::DeleteCollection(..) => "DELETE",
        }
    }

    /// Object verbs address a single named object, the rest its collection.
    pub fn targets_object(&self) -> bool {
        matches!(self, Verb::Replace | Verb::Get(_) | Verb::Delete(_))
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport independent description of a single API call.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into, strip_option), build_fn(validate = "Self::validate"))]
pub struct RestRequest {
    pub verb: Verb,
    #[builder(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
    #[builder(default)]
    pub namespace: Option<String>,
    #[builder(default)]
    pub name: Option<String>,
    #[builder(default)]
    pub subresource: Option<String>,
    #[builder(default)]
    pub body: Option<Value>,
}

impl RestRequestBuilder {
    pub fn for_type(&mut self, typer: &TypeDescriptor) -> &mut Self {
        self.group(typer.group.as_str())
            .version(typer.version.as_str())
            .resource(typer.plural.as_str())
    }

    fn validate(&self) -> Result<(), String> {
        let has_name = matches!(&self.name, Some(Some(name)) if !name.is_empty());

        if let Some(Some(subresource)) = &self.subresource {
            if !has_name {
                return Err(format!(
                    "subresource '{subresource}' can't be requested without a name"
                ));
            }
        }

        if let Some(verb) = &self.verb {
            match (verb.targets_object(), has_name) {
                (true, false) => return Err(format!("{verb} needs a name")),
                (false, true) => return Err(format!("{verb} can't target a single object")),
                _ => {}
            }
        }

        if matches!(&self.resource, Some(resource) if resource.is_empty()) {
            return Err("resource can't be empty".to_owned());
        }

        Ok(())
    }
}

impl RestRequest {
    pub fn builder() -> RestRequestBuilder {
        RestRequestBuilder::default()
    }

    /// `/apis/{group}/{version}[/namespaces/{namespace}]/{resource}`, with the
    /// legacy `/api/{version}` prefix for the core group.
    pub fn collection_path(&self) -> String {
        let mut path = match self.group.is_empty() {
            true => format!("/api/{}", self.version),
            false => format!("/apis/{}/{}", self.group, self.version),
        };

        if let Some(namespace) = self.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            path.push_str("/namespaces/");
            path.push_str(namespace);
        }

        path.push('/');
        path.push_str(&self.resource);
        path
    }

    /// The collection path followed by `/{name}[/{subresource}]` when set.
    pub fn path(&self) -> String {
        let mut path = self.collection_path();

        if let Some(name) = self.name.as_deref() {
            path.push('/');
            path.push_str(name);

            if let Some(subresource) = self.subresource.as_deref() {
                path.push('/');
                path.push_str(subresource);
            }
        }

        path
    }

    pub fn route(&self) -> String {
        crate::strategy::typer::route(&self.group, &self.version, &self.resource)
    }

    pub fn is_status(&self) -> bool {
        self.subresource.as_deref() == Some(STATUS_SUBRESOURCE)
    }
}

impl From<RestRequestBuilderError> for ApiError {
    fn from(value: RestRequestBuilderError) -> Self {
        ApiError::bad_request(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use kube::api::{DeleteParams, GetParams, ListParams};

    use crate::{resources::crd::v1alpha1::network::Network, strategy::typer::TypeDescriptor};

    use super::{RestRequest, Verb};

    fn typer() -> TypeDescriptor {
        TypeDescriptor::of::<Network>(true)
    }

    #[test]
    fn paths_cover_collections_objects_and_subresources() {
        let collection = RestRequest::builder()
            .verb(Verb::List(ListParams::default()))
            .for_type(&typer())
            .namespace("default")
            .build()
            .unwrap();
        assert_eq!(
            collection.path(),
            "/apis/netattach.dev/v1alpha1/namespaces/default/networks"
        );

        let status = RestRequest::builder()
            .verb(Verb::Replace)
            .for_type(&typer())
            .namespace("default")
            .name("net1")
            .subresource("status")
            .build()
            .unwrap();
        assert_eq!(
            status.path(),
            "/apis/netattach.dev/v1alpha1/namespaces/default/networks/net1/status"
        );
        assert_eq!(
            status.collection_path(),
            "/apis/netattach.dev/v1alpha1/namespaces/default/networks"
        );
        assert!(status.is_status());
        assert_eq!(status.verb.method(), "PUT");
    }

    #[test]
    fn core_group_uses_the_legacy_prefix() {
        let request = RestRequest::builder()
            .verb(Verb::Get(GetParams::default()))
            .version("v1")
            .resource("pods")
            .name("pod1")
            .build()
            .unwrap();

        assert_eq!(request.path(), "/api/v1/pods/pod1");
    }

    #[test]
    fn subresources_require_a_name() {
        let result = RestRequest::builder()
            .verb(Verb::Replace)
            .for_type(&typer())
            .subresource("status")
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn verbs_agree_with_their_target() {
        let unnamed_delete = RestRequest::builder()
            .verb(Verb::Delete(DeleteParams::default()))
            .for_type(&typer())
            .namespace("default")
            .build();
        assert!(unnamed_delete.is_err());

        let named_list = RestRequest::builder()
            .verb(Verb::List(ListParams::default()))
            .for_type(&typer())
            .namespace("default")
            .name("net1")
            .build();
        assert!(named_list.is_err());
    }
}
