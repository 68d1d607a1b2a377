//! Client sessions: one per connection, bridging it to the hub.
//!
//! A session owns its outbound mailbox and runs two tasks:
//!
//! - the inbound loop ([`inbound`]) reads frames, forwards data to the hub and
//!   unregisters the session when it stops;
//! - the outbound loop ([`outbound`]) drains the mailbox to the connection and
//!   sends heartbeat pings.
//!
//! The loops share a close signal (a [`CancellationToken`] derived from the
//! server's shutdown token). Whichever loop stops first cancels it, which
//! makes the other observe closure and stop as well.

mod inbound;
mod outbound;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hubbub_settings::{Framing, HubSettings};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;
use uuid::Uuid;

use crate::adapter::Connection;
use crate::error::HubError;
use crate::hub::HubHandle;
use crate::metrics::WS_CONNECTIONS_TOTAL;

/// Opaque session identity, `sess_<uuid v7>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(format!("sess_{}", Uuid::now_v7()))
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-session tunables, resolved from [`HubSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Outbound mailbox capacity.
    pub mailbox_capacity: usize,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Read deadline, extended by each pong.
    pub pong_wait: Duration,
    /// Heartbeat period.
    pub ping_period: Duration,
    /// Deadline for one outbound write.
    pub write_wait: Duration,
    /// How coalesced messages are written.
    pub framing: Framing,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&HubSettings::default())
    }
}

impl From<&HubSettings> for SessionConfig {
    fn from(hub: &HubSettings) -> Self {
        Self {
            mailbox_capacity: hub.mailbox_capacity,
            max_message_size: hub.max_message_size,
            pong_wait: hub.pong_wait(),
            ping_period: hub.ping_period(),
            write_wait: hub.write_wait(),
            framing: hub.framing,
        }
    }
}

/// Everything a new session needs from the server.
#[derive(Clone)]
pub struct SessionContext {
    /// Hub to register with.
    pub hub: HubHandle,
    /// Shared tunables.
    pub config: Arc<SessionConfig>,
    /// Tracker the session tasks are spawned on, so shutdown can wait for them.
    pub tracker: TaskTracker,
    /// Server shutdown token; each session's close signal is a child of it.
    pub shutdown: CancellationToken,
}

/// Handle to a running session's tasks.
pub struct SessionHandle {
    id: SessionId,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
    close: CancellationToken,
}

impl SessionHandle {
    /// The session's id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Fire the close signal. Both loops stop and the session unregisters.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether the close signal has fired.
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Wait for both loops to finish.
    pub async fn join(self) {
        let _ = self.inbound.await;
        let _ = self.outbound.await;
    }
}

/// Bind `conn` to the hub and start its loops.
///
/// The session is registered, and the registration acknowledged, before
/// either loop starts, so nothing it sends can be broadcast before it is able
/// to receive. If the hub is gone the connection is dropped and no task is
/// spawned.
pub async fn start<C: Connection>(
    conn: C,
    ctx: &SessionContext,
) -> Result<SessionHandle, HubError> {
    let id = SessionId::new();
    let (mailbox, inbox) = mpsc::channel(ctx.config.mailbox_capacity.max(1));
    ctx.hub.register(id.clone(), mailbox).await?;

    let close = ctx.shutdown.child_token();
    let (reader, writer) = conn.split();

    let outbound = ctx.tracker.spawn(outbound::run_outbound(
        id.clone(),
        writer,
        inbox,
        close.clone(),
        Arc::clone(&ctx.config),
    ));
    let inbound = ctx.tracker.spawn(inbound::run_inbound(
        id.clone(),
        reader,
        ctx.hub.clone(),
        close.clone(),
        Arc::clone(&ctx.config),
    ));

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(session_id = %id, "session started");

    Ok(SessionHandle {
        id,
        inbound,
        outbound,
        close,
    })
}
