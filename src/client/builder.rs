// ABOUTME: Convenience constructors for the common standalone and cluster setups
// ABOUTME: Thin sugar over ClientConfig plus connect

use crate::bridge::EngineBridge;
use crate::client::error::ClientResult;
use crate::client::types::ClientConfig;
use crate::connection::Connection;
use crate::messages::{AuthInfo, NodeAddress};
use std::sync::Arc;

/// Builder collecting a [`ClientConfig`] before connecting.
#[derive(Clone, Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Standalone client seeded with a single address.
    pub fn standalone(address: NodeAddress) -> Self {
        ClientBuilder {
            config: ClientConfig::new(vec![address]),
        }
    }

    /// Cluster client seeded with any number of addresses.
    pub fn cluster(addresses: Vec<NodeAddress>) -> Self {
        ClientBuilder {
            config: ClientConfig::new(addresses).with_cluster_mode(),
        }
    }

    pub fn tls(mut self) -> Self {
        self.config = self.config.with_tls(true);
        self
    }

    pub fn credentials(mut self, username: Option<String>, password: impl Into<String>) -> Self {
        self.config = self.config.with_credentials(AuthInfo {
            username,
            password: password.into(),
        });
        self
    }

    /// Apply any remaining options directly on the config.
    pub fn configure(mut self, f: impl FnOnce(ClientConfig) -> ClientConfig) -> Self {
        self.config = f(self.config);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run the bootstrap handshake and return a ready connection.
    pub async fn connect(self, bridge: Arc<dyn EngineBridge>) -> ClientResult<Connection> {
        crate::client::connect(self.config, bridge).await
    }
}
