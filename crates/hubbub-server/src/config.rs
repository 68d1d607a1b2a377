//! Server configuration, resolved from [`HubbubSettings`].

use std::time::Duration;

use hubbub_settings::{HubbubSettings, Mode};

use crate::hub::DEFAULT_REQUEST_BUFFER;
use crate::session::SessionConfig;

/// Configuration for [`HubServer`](crate::server::HubServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind, `host:port`. Port `0` picks a free port.
    pub addr: String,
    /// Deployment mode, reported by `/health` and used to pick CORS policy.
    pub mode: Mode,
    /// Per-session tunables.
    pub session: SessionConfig,
    /// How long shutdown waits for sessions to drain.
    pub shutdown_timeout: Duration,
    /// Depth of the hub's bounded request queues.
    pub request_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:0".into(),
            mode: Mode::Dev,
            session: SessionConfig::default(),
            shutdown_timeout: Duration::from_secs(10),
            request_buffer: DEFAULT_REQUEST_BUFFER,
        }
    }
}

impl From<&HubbubSettings> for ServerConfig {
    fn from(settings: &HubbubSettings) -> Self {
        Self {
            addr: settings.server.addr.clone(),
            mode: settings.server.mode,
            session: SessionConfig::from(&settings.hub),
            shutdown_timeout: settings.server.shutdown_timeout(),
            request_buffer: DEFAULT_REQUEST_BUFFER,
        }
    }
}
