use std::env::var;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::UpdatePolicy;

pub const UPDATE_POLICY_VAR: &str = "NETATTACH_UPDATE_POLICY";
pub const ALLOW_UNCONDITIONAL_UPDATE_VAR: &str = "NETATTACH_ALLOW_UNCONDITIONAL_UPDATE";
pub const WATCH_BUFFER_SIZE_VAR: &str = "NETATTACH_WATCH_BUFFER_SIZE";
pub const EVENT_HISTORY_SIZE_VAR: &str = "NETATTACH_EVENT_HISTORY_SIZE";
pub const NAMESPACE_VAR: &str = "NETATTACH_NAMESPACE";

pub const DEFAULT_WATCH_BUFFER_SIZE: usize = 256;
pub const DEFAULT_EVENT_HISTORY_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum FromError {
    #[error("Env var {} unavailable: {}", .0, .1)]
    VarUnset(&'static str, std::env::VarError),
    #[error("Env var {} couldn't be parsed: {}", .0, .1)]
    VarParse(&'static str, String),
    #[error("Config couldn't be parsed: {}", .0)]
    Yaml(serde_yaml::Error),
}

/// Lifecycle policy knobs. Both have to be chosen by the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyConfig {
    pub update_policy: UpdatePolicy,
    pub allow_unconditional_update: bool,
}

impl StrategyConfig {
    pub fn new(update_policy: UpdatePolicy, allow_unconditional_update: bool) -> Self {
        Self {
            update_policy,
            allow_unconditional_update,
        }
    }

    pub fn from_env() -> Result<Self, FromError> {
        Ok(Self {
            update_policy: required_var(UPDATE_POLICY_VAR)?
                .parse()
                .map_err(|error| FromError::VarParse(UPDATE_POLICY_VAR, error))?,
            allow_unconditional_update: required_var(ALLOW_UNCONDITIONAL_UPDATE_VAR)?
                .parse()
                .map_err(|error: std::str::ParseBoolError| {
                    FromError::VarParse(ALLOW_UNCONDITIONAL_UPDATE_VAR, error.to_string())
                })?,
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, FromError> {
        serde_yaml::from_str(yaml).map_err(FromError::Yaml)
    }
}

/// Sizing of the in-memory store's watch machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// events a single watcher may fall behind before it's expired
    pub watch_buffer_size: usize,
    /// events kept around for watches resuming from an older revision
    pub event_history_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            watch_buffer_size: DEFAULT_WATCH_BUFFER_SIZE,
            event_history_size: DEFAULT_EVENT_HISTORY_SIZE,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, FromError> {
        let defaults = Self::default();

        Ok(Self {
            watch_buffer_size: optional_size_var(WATCH_BUFFER_SIZE_VAR)?
                .unwrap_or(defaults.watch_buffer_size),
            event_history_size: optional_size_var(EVENT_HISTORY_SIZE_VAR)?
                .unwrap_or(defaults.event_history_size),
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, FromError> {
        serde_yaml::from_str(yaml).map_err(FromError::Yaml)
    }
}

pub fn namespace_from_env() -> Option<String> {
    var(NAMESPACE_VAR).ok().filter(|namespace| !namespace.is_empty())
}

fn required_var(name: &'static str) -> Result<String, FromError> {
    var(name).map_err(|error| FromError::VarUnset(name, error))
}

fn optional_size_var(name: &'static str) -> Result<Option<usize>, FromError> {
    match var(name) {
        Ok(value) => {
            let size = value
                .parse::<usize>()
                .map_err(|error| FromError::VarParse(name, error.to_string()))?;
            match size {
                0 => Err(FromError::VarParse(name, "must be greater than 0".to_owned())),
                size => Ok(Some(size)),
            }
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use crate::strategy::UpdatePolicy;

    use super::{StorageConfig, StrategyConfig};

    #[test]
    fn strategy_config_is_read_from_yaml() {
        let config = StrategyConfig::from_yaml(
            "updatePolicy: GenerationTracked\nallowUnconditionalUpdate: true\n",
        )
        .unwrap();

        assert_eq!(config.update_policy, UpdatePolicy::GenerationTracked);
        assert!(config.allow_unconditional_update);
    }

    #[test]
    fn strategy_config_has_no_default_policy() {
        assert!(StrategyConfig::from_yaml("allowUnconditionalUpdate: true\n").is_err());
    }

    #[test]
    fn storage_config_falls_back_to_defaults() {
        let config = StorageConfig::from_yaml("watchBufferSize: 8\n").unwrap();

        assert_eq!(config.watch_buffer_size, 8);
        assert_eq!(config.event_history_size, StorageConfig::default().event_history_size);
    }

    #[test]
    fn update_policy_parses_both_spellings() {
        assert_eq!(
            "ImmutableSpec".parse::<UpdatePolicy>().unwrap(),
            UpdatePolicy::ImmutableSpec
        );
        assert_eq!(
            "generation-tracked".parse::<UpdatePolicy>().unwrap(),
            UpdatePolicy::GenerationTracked
        );
        assert!("whatever".parse::<UpdatePolicy>().is_err());
    }
}
