//! `/health` endpoint.

use std::time::Instant;

use hubbub_settings::Mode;
use serde::Serialize;

use crate::hub::HubSnapshot;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the hub runs, `"unavailable"` once it has stopped.
    pub status: &'static str,
    /// Deployment mode.
    pub mode: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered sessions.
    pub sessions: usize,
    /// Broadcasts processed.
    pub broadcasts: u64,
    /// Slow sessions evicted.
    pub evictions: u64,
}

impl HealthResponse {
    /// Whether the hub answered.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Build a health response. `None` means the hub did not answer.
pub fn health_check(start_time: Instant, mode: Mode, snapshot: Option<&HubSnapshot>) -> HealthResponse {
    let uptime_secs = start_time.elapsed().as_secs();
    match snapshot {
        Some(snapshot) => HealthResponse {
            status: "ok",
            mode: mode.as_str(),
            uptime_secs,
            sessions: snapshot.len(),
            broadcasts: snapshot.broadcasts,
            evictions: snapshot.evictions,
        },
        None => HealthResponse {
            status: "unavailable",
            mode: mode.as_str(),
            uptime_secs,
            sessions: 0,
            broadcasts: 0,
            evictions: 0,
        },
    }
}
