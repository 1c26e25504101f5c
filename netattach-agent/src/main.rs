use std::process::exit;

use anyhow::Context;
use kube::{api::PatchParams, Client};
use log::{info, warn};
use netattach_core::{
    config::{namespace_from_env, StrategyConfig},
    resources::crd::v1alpha1::create_v1alpha1_crds,
    strategy::network::NetworkStrategy,
};

use crate::auditor::{network_watcher, Auditor};

mod auditor;

pub const INSTALL_CRDS_VAR: &str = "NETATTACH_INSTALL_CRDS";
pub const FIELD_MANAGER: &str = "netattach-agent";

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    configure_logger();

    let config = get_strategy_config();
    let client = create_client().await;
    let namespace =
        namespace_from_env().unwrap_or_else(|| client.default_namespace().to_owned());

    if should_install_crds() {
        create_v1alpha1_crds(&client, &PatchParams::apply(FIELD_MANAGER).force())
            .await
            .context("Couldn't install the CRDs!")?;
    }

    info!(
        "Auditing Networks in {namespace} ({} updates)",
        config.update_policy
    );

    let auditor = Auditor::new(NetworkStrategy::new(config), &namespace);
    let events = network_watcher(client, &namespace);

    tokio::select! {
        summary = auditor.run(events) => {
            warn!("Network watch ended after auditing {} Networks!", summary.audited);
        },
        signal = tokio::signal::ctrl_c() => {
            signal.context("Couldn't listen for the shutdown signal!")?;
            info!("Shutting down...");
        }
    }

    Ok(())
}

async fn create_client() -> Client {
    match Client::try_default().await {
        Ok(client) => client,
        Err(error) => {
            log::error!("Couldn't create client! {error:?}");
            exit(6)
        }
    }
}

fn get_strategy_config() -> StrategyConfig {
    match StrategyConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            log::error!("Couldn't retrieve the strategy config! {error}");
            exit(7)
        }
    }
}

fn should_install_crds() -> bool {
    std::env::var(INSTALL_CRDS_VAR)
        .map(|value| value == "true" || value == "1")
        .unwrap_or(false)
}

fn configure_logger() {
    env_logger::builder()
        .default_format()
        .format_module_path(false)
        .filter_level(log::LevelFilter::Info)
        .init()
}
