use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "netattach.dev",
    version = "v1alpha1",
    kind = "Network",
    namespaced,
    status = "NetworkStatus",
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Plugin", "type":"string", "jsonPath":".spec.plugin"}"#,
    printcolumn = r#"{"name":"CIDR", "type":"string", "jsonPath":".spec.cidrMask"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// name of the plugin responsible for attaching workloads to this network
    pub plugin: String,
    /// opaque plugin arguments
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
    /// CIDR range of this network, must be a network address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_mask: Option<String>,
    /// gateway address, must be part of `cidr_mask` when both are set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// network state
    pub state: NetworkState,
    /// human readable details about the current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// generation of the spec the state was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum NetworkState {
    #[default]
    Unknown,
    Pending,
    Ready,
    Failed,
}
