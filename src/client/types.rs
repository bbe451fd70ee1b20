// ABOUTME: User-facing configuration for connecting to the native engine
// ABOUTME: Converted into the handshake message; validation happens before any socket work

use crate::client::error::{ClientError, ClientResult};
use crate::messages::{
    AuthInfo, BackoffInfo, ConnectionRequest, NodeAddress, PeriodicChecks, PubSubSubscription,
    ReadFrom, TlsMode,
};
use crate::otel::OpenTelemetryConfig;
use std::time::Duration;

/// Handshake deadline applied when the configuration does not set one.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Options below the usual surface, mirrored from the advanced section of
/// the public configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdvancedConfig {
    /// Skip certificate verification. Only meaningful with TLS enabled.
    pub insecure_tls: bool,
}

/// Options for a batch submission.
#[derive(Clone, Debug, Default)]
pub struct BatchOptions {
    /// Reject the whole batch on the first failing sub-command instead of
    /// returning per-command errors in the result array.
    pub raise_on_error: bool,
    /// Server-side deadline for the batch, enforced by the native engine.
    pub timeout: Option<Duration>,
}

/// Everything needed to establish a connection.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub addresses: Vec<NodeAddress>,
    pub use_tls: bool,
    pub credentials: Option<AuthInfo>,
    /// Per-request deadline enforced by the native engine.
    pub request_timeout: Option<Duration>,
    /// Deadline for the bootstrap handshake.
    pub connection_timeout: Duration,
    pub connection_backoff: Option<BackoffInfo>,
    pub read_from: ReadFrom,
    pub cluster_mode_enabled: bool,
    /// Standalone only; must stay zero in cluster mode.
    pub database_id: u32,
    pub periodic_checks: PeriodicChecks,
    pub pubsub_subscriptions: Vec<PubSubSubscription>,
    pub advanced: AdvancedConfig,
    pub otel: Option<OpenTelemetryConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addresses: Vec::new(),
            use_tls: false,
            credentials: None,
            request_timeout: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            connection_backoff: None,
            read_from: ReadFrom::default(),
            cluster_mode_enabled: false,
            database_id: 0,
            periodic_checks: PeriodicChecks::default(),
            pubsub_subscriptions: Vec::new(),
            advanced: AdvancedConfig::default(),
            otel: None,
        }
    }
}

impl ClientConfig {
    pub fn new(addresses: Vec<NodeAddress>) -> Self {
        ClientConfig {
            addresses,
            ..ClientConfig::default()
        }
    }

    pub fn with_address(mut self, address: NodeAddress) -> Self {
        self.addresses.push(address);
        self
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_insecure_tls(mut self) -> Self {
        self.use_tls = true;
        self.advanced.insecure_tls = true;
        self
    }

    pub fn with_credentials(mut self, credentials: AuthInfo) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffInfo) -> Self {
        self.connection_backoff = Some(backoff);
        self
    }

    pub fn with_read_from(mut self, read_from: ReadFrom) -> Self {
        self.read_from = read_from;
        self
    }

    pub fn with_cluster_mode(mut self) -> Self {
        self.cluster_mode_enabled = true;
        self
    }

    pub fn with_database_id(mut self, database_id: u32) -> Self {
        self.database_id = database_id;
        self
    }

    pub fn with_periodic_checks(mut self, periodic_checks: PeriodicChecks) -> Self {
        self.periodic_checks = periodic_checks;
        self
    }

    pub fn with_subscription(mut self, subscription: PubSubSubscription) -> Self {
        self.pubsub_subscriptions.push(subscription);
        self
    }

    pub fn with_otel(mut self, otel: OpenTelemetryConfig) -> Self {
        self.otel = Some(otel);
        self
    }

    /// Check the configuration before any native or socket work starts.
    pub fn validate(&self) -> ClientResult<()> {
        if self.addresses.is_empty() {
            return Err(ClientError::Configuration(
                "at least one address is required".to_string(),
            ));
        }
        if let Some(address) = self.addresses.iter().find(|a| a.host.is_empty()) {
            return Err(ClientError::Configuration(format!(
                "address with port {} has an empty host",
                address.port
            )));
        }
        if self.advanced.insecure_tls && !self.use_tls {
            return Err(ClientError::Configuration(
                "insecure TLS requires TLS to be enabled".to_string(),
            ));
        }
        if self.cluster_mode_enabled && self.database_id != 0 {
            return Err(ClientError::Configuration(
                "database id is only supported in standalone mode".to_string(),
            ));
        }
        if let Some(otel) = &self.otel {
            otel.validate()?;
        }
        Ok(())
    }

    fn tls_mode(&self) -> TlsMode {
        match (self.use_tls, self.advanced.insecure_tls) {
            (false, _) => TlsMode::NoTls,
            (true, false) => TlsMode::Secure,
            (true, true) => TlsMode::Insecure,
        }
    }

    /// Build the handshake message sent as the first frame on the socket.
    pub(crate) fn to_connection_request(&self) -> ConnectionRequest {
        ConnectionRequest {
            addresses: self.addresses.clone(),
            tls_mode: self.tls_mode(),
            cluster_mode_enabled: self.cluster_mode_enabled,
            request_timeout_ms: self.request_timeout.map(|d| d.as_millis() as u32),
            connection_timeout_ms: Some(self.connection_timeout.as_millis() as u32),
            read_from: self.read_from,
            connection_backoff: self.connection_backoff.clone(),
            database_id: self.database_id,
            credentials: self.credentials.clone(),
            periodic_checks: self.periodic_checks,
            pubsub_subscriptions: self.pubsub_subscriptions.clone(),
            otel: self.otel.clone(),
        }
    }
}
