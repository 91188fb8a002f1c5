use slicewire::stream::StreamConfig;
use std::time::Duration;

/// Idle time after which the server pings a client.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long a client may stay silent (pongs included) before it is dropped.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
    /// Applied to the adapter and to each connection's message decoder.
    pub stream_config: StreamConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            stream_config: StreamConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn with_heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    pub fn with_client_timeout(mut self, client_timeout: Duration) -> Self {
        self.client_timeout = client_timeout;
        self
    }

    pub fn with_stream_config(mut self, stream_config: StreamConfig) -> Self {
        self.stream_config = stream_config;
        self
    }
}
