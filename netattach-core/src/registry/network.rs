use std::sync::Arc;

use crate::{
    config::{StorageConfig, StrategyConfig},
    resources::crd::v1alpha1::network::Network,
    selection::network::{get_attrs, SELECTABLE_FIELDS},
    storage::{memory::MemoryStorage, Storage},
    strategy::network::NetworkStrategy,
};

use super::{scheme::Scheme, ResourceStore, ResourceStoreBuilderError};

pub fn network_store(
    strategy_config: StrategyConfig,
    storage: Arc<dyn Storage<Network>>,
) -> Result<ResourceStore<Network>, ResourceStoreBuilderError> {
    let strategy = Arc::new(NetworkStrategy::new(strategy_config));

    ResourceStore::builder()
        .strategy(strategy.clone())
        .status_strategy(strategy)
        .get_attrs(get_attrs)
        .selectable_fields(SELECTABLE_FIELDS)
        .storage(storage)
        .build()
}

/// Scheme serving Networks from a fresh in-memory store.
pub fn network_scheme(
    strategy_config: StrategyConfig,
    storage_config: StorageConfig,
) -> Result<Scheme, ResourceStoreBuilderError> {
    let storage = Arc::new(MemoryStorage::<Network>::new(storage_config));

    Ok(Scheme::builder()
        .register(network_store(strategy_config, storage)?)
        .build())
}
