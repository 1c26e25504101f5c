use futures::{Stream, StreamExt};
use kube::{
    runtime::{
        watcher::{self, watcher, Config, Event},
        WatchStreamExt,
    },
    Api, Client,
};
use log::{debug, info, warn};
use netattach_core::{
    helpers::display_name,
    resources::crd::v1alpha1::network::Network,
    strategy::{network::NetworkStrategy, RequestContext, RestStrategy},
    validation::ErrorList,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuditSummary {
    pub audited: usize,
    pub invalid: usize,
    /// watch failures the stream recovered from
    pub interruptions: usize,
}

impl AuditSummary {
    fn record(&mut self, errors: &ErrorList) {
        self.audited += 1;
        if !errors.is_empty() {
            self.invalid += 1;
        }
    }
}

/// Watches Networks in one namespace, relisting on expiry and backing off
/// between failed attempts.
pub fn network_watcher(
    client: Client,
    namespace: &str,
) -> impl Stream<Item = Result<Event<Network>, watcher::Error>> + Send {
    watcher(Api::<Network>::namespaced(client, namespace), Config::default())
        .backoff(watcher::default_backoff())
}

/// Re-validates live Networks with the strategy the API applies and logs
/// the ones that no longer pass.
pub struct Auditor {
    strategy: NetworkStrategy,
    ctx: RequestContext,
}

impl Auditor {
    pub fn new(strategy: NetworkStrategy, namespace: &str) -> Self {
        Self {
            strategy,
            ctx: RequestContext::namespaced(namespace),
        }
    }

    pub fn audit(&self, network: &Network) -> ErrorList {
        let errors = self.strategy.validate(&self.ctx, network);

        if !errors.is_empty() {
            warn!("Network {} is invalid: {errors}", display_name(network));
        }

        errors
    }

    /// Audits everything the watcher reports until its stream ends.
    pub async fn run(
        &self,
        events: impl Stream<Item = Result<Event<Network>, watcher::Error>>,
    ) -> AuditSummary {
        let mut events = Box::pin(events);
        let mut summary = AuditSummary::default();

        while let Some(event) = events.next().await {
            match event {
                Ok(Event::Restarted(networks)) => {
                    let mut relisted = AuditSummary::default();
                    for network in &networks {
                        relisted.record(&self.audit(network));
                    }

                    info!(
                        "Audited {} Networks in {}, {} invalid",
                        relisted.audited,
                        self.namespace(),
                        relisted.invalid
                    );

                    summary.audited += relisted.audited;
                    summary.invalid += relisted.invalid;
                }
                Ok(Event::Applied(network)) => summary.record(&self.audit(&network)),
                Ok(Event::Deleted(network)) => {
                    debug!("Network {} was deleted", display_name(&network))
                }
                Err(error) => {
                    warn!("Network watch interrupted, backing off! {error}");
                    summary.interruptions += 1;
                }
            }
        }

        summary
    }

    fn namespace(&self) -> &str {
        self.ctx.namespace.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use futures::stream;
    use kube::{
        core::{ErrorResponse, ObjectMeta},
        runtime::watcher::{self, Event},
    };
    use netattach_core::{
        config::StrategyConfig,
        resources::crd::v1alpha1::network::{Network, NetworkSpec},
        strategy::{network::NetworkStrategy, UpdatePolicy},
    };

    use super::{AuditSummary, Auditor};

    fn auditor() -> Auditor {
        let config = StrategyConfig::new(UpdatePolicy::GenerationTracked, false);

        Auditor::new(NetworkStrategy::new(config), "default")
    }

    fn network(name: &str) -> Network {
        Network {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("default".to_owned()),
                ..Default::default()
            },
            spec: NetworkSpec {
                plugin: "vendorA".to_owned(),
                args: BTreeMap::new(),
                cidr_mask: Some("11.22.192.0/18".to_owned()),
                gateway: Some("11.22.192.1".to_owned()),
            },
            status: None,
        }
    }

    fn broken(name: &str) -> Network {
        let mut network = network(name);
        network.spec.cidr_mask = Some("11.22.192.7/18".to_owned());
        network
    }

    #[test]
    fn audit_reports_broken_networks() {
        let auditor = auditor();

        assert!(auditor.audit(&network("net1")).is_empty());
        assert!(auditor.audit(&broken("net1")).contains_path("spec.cidrMask"));
    }

    #[tokio::test]
    async fn run_audits_relists_and_changes() {
        let events = stream::iter(vec![
            Ok(Event::Restarted(vec![network("net1"), broken("net2")])),
            Ok(Event::Applied(network("net3"))),
            Ok(Event::Deleted(network("net1"))),
        ]);

        let summary = auditor().run(events).await;

        assert_eq!(
            summary,
            AuditSummary {
                audited: 3,
                invalid: 1,
                interruptions: 0,
            }
        );
    }

    #[tokio::test]
    async fn run_keeps_going_after_watch_errors() {
        let expired = ErrorResponse {
            status: "Failure".to_owned(),
            message: "too old resource version".to_owned(),
            reason: "Expired".to_owned(),
            code: 410,
        };
        let events = stream::iter(vec![
            Ok(Event::Restarted(vec![network("net1")])),
            Err(watcher::Error::WatchError(expired)),
            Ok(Event::Restarted(vec![network("net1"), broken("net2")])),
        ]);

        let summary = auditor().run(events).await;

        assert_eq!(summary.interruptions, 1);
        assert_eq!(summary.audited, 3);
        assert_eq!(summary.invalid, 1);
    }
}
