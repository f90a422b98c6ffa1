//! Connector configuration.

use std::time::Duration;

use crate::version::API_VERSION;

/// Server address used by [`NexusConfig::default`].
pub const DEFAULT_SERVER_ADDRESS: &str = "ws://127.0.0.1:3000";

/// Default timeout for opening the WebSocket connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a [`Connector`](crate::Connector).
///
/// # Example
///
/// ```
/// use nexus_client::NexusConfig;
///
/// let config = NexusConfig::new("ws://relay.example:3000")
///     .with_debug(true)
///     .with_suppress_missed_warnings(true);
/// assert_eq!(config.server_address, "ws://relay.example:3000");
/// assert_eq!(config.api_version, "1.0.0");
/// ```
#[derive(Debug, Clone)]
pub struct NexusConfig {
    /// URI of the relay server.
    pub server_address: String,
    /// API version compared against the server's `SERVER_INFO`.
    ///
    /// Defaults to the version this crate implements.
    pub api_version: String,
    /// Silence the warning logged when a notification fires with no subscriber.
    pub suppress_missed_warnings: bool,
    /// Log every inbound frame at `debug` level.
    pub debug: bool,
    /// Upper bound for opening the connection in
    /// [`Session::connect`](crate::Session).
    ///
    /// Defaults to **10 seconds**.
    pub connect_timeout: Duration,
}

impl NexusConfig {
    /// Create a configuration for the given server address with default values.
    pub fn new(server_address: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            api_version: API_VERSION.to_string(),
            suppress_missed_warnings: false,
            debug: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the client API version.
    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Silence or enable missed-notification warnings.
    #[must_use]
    pub fn with_suppress_missed_warnings(mut self, suppress: bool) -> Self {
        self.suppress_missed_warnings = suppress;
        self
    }

    /// Enable or disable per-frame debug logging.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_ADDRESS)
    }
}
