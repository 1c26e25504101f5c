use std::sync::Arc;

use crate::{
    config::StrategyConfig,
    resources::crd::v1alpha1::network::Network,
    validation::{
        network::{validate_network, validate_network_status_update, validate_network_update},
        ErrorList,
    },
};

use super::{
    naming::{NameGenerator, SimpleNameGenerator},
    typer::TypeDescriptor,
    RequestContext, RestStrategy, StatusStrategy, UpdatePolicy,
};

/// Lifecycle rules of [`Network`] objects.
#[derive(Clone)]
pub struct NetworkStrategy {
    typer: TypeDescriptor,
    names: Arc<dyn NameGenerator>,
    config: StrategyConfig,
}

impl NetworkStrategy {
    pub fn new(config: StrategyConfig) -> Self {
        Self::with_name_generator(config, Arc::new(SimpleNameGenerator))
    }

    pub fn with_name_generator(config: StrategyConfig, names: Arc<dyn NameGenerator>) -> Self {
        Self {
            typer: TypeDescriptor::of::<Network>(true),
            names,
            config,
        }
    }

    pub fn update_policy(&self) -> UpdatePolicy {
        self.config.update_policy
    }
}

impl std::fmt::Debug for NetworkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkStrategy")
            .field("typer", &self.typer)
            .field("config", &self.config)
            .finish()
    }
}

impl RestStrategy<Network> for NetworkStrategy {
    fn type_descriptor(&self) -> &TypeDescriptor {
        &self.typer
    }

    fn namespace_scoped(&self) -> bool {
        true
    }

    fn prepare_for_create(&self, _ctx: &RequestContext, network: &mut Network) {
        network.metadata.generation = Some(1);
        network.status = None;
    }

    fn prepare_for_update(&self, _ctx: &RequestContext, new: &mut Network, old: &Network) {
        // status only changes through the status subresource
        new.status = old.status.clone();

        match self.config.update_policy {
            UpdatePolicy::ImmutableSpec => {
                new.spec = old.spec.clone();
                new.metadata.generation = old.metadata.generation;
            }
            UpdatePolicy::GenerationTracked => {
                let generation = old.metadata.generation.unwrap_or(1);
                new.metadata.generation = match new.spec != old.spec {
                    true => Some(generation + 1),
                    false => Some(generation),
                };
            }
        }
    }

    fn validate(&self, _ctx: &RequestContext, network: &Network) -> ErrorList {
        validate_network(network)
    }

    fn validate_update(&self, _ctx: &RequestContext, new: &Network, old: &Network) -> ErrorList {
        let mut errors = validate_network(new);
        errors.extend(validate_network_update(new, old));

        errors
    }

    fn allow_create_on_update(&self) -> bool {
        false
    }

    fn allow_unconditional_update(&self) -> bool {
        self.config.allow_unconditional_update
    }

    fn generate_name(&self, base: &str) -> String {
        self.names.generate_name(base)
    }
}

impl StatusStrategy<Network> for NetworkStrategy {
    fn prepare_for_status_update(&self, _ctx: &RequestContext, new: &mut Network, old: &Network) {
        let status = new.status.take();
        let resource_version = new.metadata.resource_version.take();

        *new = old.clone();
        new.status = status;
        new.metadata.resource_version = resource_version;
    }

    fn validate_status_update(&self, _ctx: &RequestContext, new: &Network, old: &Network) -> ErrorList {
        validate_network_status_update(new, old)
    }
}
