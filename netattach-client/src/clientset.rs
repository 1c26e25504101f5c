use std::{sync::Arc, time::Duration};

use netattach_core::{
    registry::{scheme::Scheme, RegistryObject},
    resources::crd::v1alpha1::network::Network,
};

use crate::{
    resource::ResourceClient,
    transport::{cluster::KubeTransport, local::LocalTransport, Transport},
};

/// Hands out typed clients sharing one transport.
#[derive(Clone)]
pub struct NetattachClient {
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
}

impl NetattachClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            timeout: None,
        }
    }

    pub fn from_kube(client: kube::Client) -> Self {
        Self::new(Arc::new(KubeTransport::new(client)))
    }

    pub fn local(scheme: Arc<Scheme>) -> Self {
        Self::new(Arc::new(LocalTransport::new(scheme)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn resource<K: RegistryObject>(&self, namespace: &str) -> ResourceClient<K> {
        let client = ResourceClient::new(self.transport.clone(), namespace);

        match self.timeout {
            Some(timeout) => client.with_timeout(timeout),
            None => client,
        }
    }
}

pub trait NetworksGetter {
    fn networks(&self, namespace: &str) -> ResourceClient<Network>;
}

impl NetworksGetter for NetattachClient {
    fn networks(&self, namespace: &str) -> ResourceClient<Network> {
        self.resource(namespace)
    }
}
