use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::validation::ErrorList;

use self::typer::TypeDescriptor;

pub mod naming;
pub mod network;
pub mod typer;

/// Request scoped data handed to every strategy hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub namespace: Option<String>,
}

impl RequestContext {
    pub fn namespaced(namespace: &str) -> Self {
        Self {
            namespace: Some(namespace.to_owned()),
        }
    }

    pub fn cluster() -> Self {
        Self::default()
    }
}

/// How an update treats changes to the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum UpdatePolicy {
    /// the spec is frozen after creation, spec changes are silently reverted
    ImmutableSpec,
    /// spec changes are accepted and bump `metadata.generation`
    GenerationTracked,
}

impl Display for UpdatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UpdatePolicy::ImmutableSpec => "ImmutableSpec",
            UpdatePolicy::GenerationTracked => "GenerationTracked",
        })
    }
}

impl FromStr for UpdatePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ImmutableSpec" | "immutable-spec" => Ok(UpdatePolicy::ImmutableSpec),
            "GenerationTracked" | "generation-tracked" => Ok(UpdatePolicy::GenerationTracked),
            other => Err(format!(
                "unknown update policy '{other}', expected ImmutableSpec or GenerationTracked"
            )),
        }
    }
}

/// Per-kind lifecycle policy driven by the registry on create and update.
pub trait RestStrategy<K>: Send + Sync {
    fn type_descriptor(&self) -> &TypeDescriptor;

    fn namespace_scoped(&self) -> bool;

    /// Clears fields the client isn't allowed to set and applies defaults.
    fn prepare_for_create(&self, ctx: &RequestContext, object: &mut K);

    /// Reconciles `new` with the stored `old` before validation.
    fn prepare_for_update(&self, ctx: &RequestContext, new: &mut K, old: &K);

    fn validate(&self, ctx: &RequestContext, object: &K) -> ErrorList;

    fn validate_update(&self, ctx: &RequestContext, new: &K, old: &K) -> ErrorList;

    fn canonicalize(&self, _object: &mut K) {}

    fn allow_create_on_update(&self) -> bool;

    fn allow_unconditional_update(&self) -> bool;

    fn generate_name(&self, base: &str) -> String;
}

/// Hooks used instead of the [`RestStrategy`] ones on the `status`
/// subresource.
pub trait StatusStrategy<K>: RestStrategy<K> {
    fn prepare_for_status_update(&self, ctx: &RequestContext, new: &mut K, old: &K);

    fn validate_status_update(&self, ctx: &RequestContext, new: &K, old: &K) -> ErrorList;
}
