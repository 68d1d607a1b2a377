//! The hub: single owner of session membership and message fan-out.
//!
//! [`Hub::run`] is the only code that touches the membership map. Every
//! other task talks to it through a cloneable [`HubHandle`], so register,
//! unregister and broadcast requests are applied strictly one at a time and
//! a fan-out never interleaves with a membership change.

use std::collections::HashMap;

use bytes::Bytes;
use metrics::{counter, gauge};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::HubError;
use crate::metrics::{
    HUB_BROADCASTS_TOTAL, HUB_DELIVERIES_TOTAL, HUB_EVICTIONS_TOTAL, HUB_SESSIONS_ACTIVE,
};
use crate::session::SessionId;

/// Default depth of the register, broadcast and inspect request queues.
pub const DEFAULT_REQUEST_BUFFER: usize = 64;

/// Sending side of a session's outbound mailbox.
pub type Mailbox = mpsc::Sender<Bytes>;

struct Registration {
    id: SessionId,
    mailbox: Mailbox,
    ack: oneshot::Sender<()>,
}

/// Point-in-time view of the hub, produced inside its loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubSnapshot {
    /// Currently registered sessions, in no particular order.
    pub members: Vec<SessionId>,
    /// Broadcast requests processed since start.
    pub broadcasts: u64,
    /// Sessions evicted for a full mailbox since start.
    pub evictions: u64,
}

impl HubSnapshot {
    /// Whether `id` is registered.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.members.contains(id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Mailboxes the message was queued on.
    pub delivered: usize,
    /// Sessions evicted because their mailbox was full.
    pub evicted: usize,
    /// Sessions dropped because their mailbox receiver was already gone.
    pub gone: usize,
}

/// Cloneable entry point to the hub's loop.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::UnboundedSender<SessionId>,
    broadcast_tx: mpsc::Sender<Bytes>,
    inspect_tx: mpsc::Sender<oneshot::Sender<HubSnapshot>>,
}

impl HubHandle {
    /// Add a session and wait until the hub has applied it.
    ///
    /// Once this returns the session receives every later broadcast, so the
    /// caller may start its loops.
    pub async fn register(&self, id: SessionId, mailbox: Mailbox) -> Result<(), HubError> {
        let (ack, acked) = oneshot::channel();
        self.register_tx
            .send(Registration { id, mailbox, ack })
            .await
            .map_err(|_| HubError::Closed)?;
        acked.await.map_err(|_| HubError::Closed)
    }

    /// Remove a session. Idempotent; never blocks.
    ///
    /// Synchronous so it can be issued from a `Drop` guard.
    pub fn unregister(&self, id: &SessionId) -> Result<(), HubError> {
        self.unregister_tx
            .send(id.clone())
            .map_err(|_| HubError::Closed)
    }

    /// Queue a message for fan-out to every registered session.
    pub async fn broadcast(&self, message: Bytes) -> Result<(), HubError> {
        self.broadcast_tx
            .send(message)
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Ask the hub for a [`HubSnapshot`].
    pub async fn snapshot(&self) -> Result<HubSnapshot, HubError> {
        let (reply, rx) = oneshot::channel();
        self.inspect_tx
            .send(reply)
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }
}

/// The coordinating loop's state.
pub struct Hub {
    members: HashMap<SessionId, Mailbox>,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<SessionId>,
    broadcast_rx: mpsc::Receiver<Bytes>,
    inspect_rx: mpsc::Receiver<oneshot::Sender<HubSnapshot>>,
    broadcasts: u64,
    evictions: u64,
}

impl Hub {
    /// Create a hub and the handle used to reach it.
    ///
    /// `request_buffer` bounds the register, broadcast and inspect queues;
    /// the unregister queue is unbounded.
    pub fn new(request_buffer: usize) -> (Self, HubHandle) {
        let buffer = request_buffer.max(1);
        let (register_tx, register_rx) = mpsc::channel(buffer);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(buffer);
        let (inspect_tx, inspect_rx) = mpsc::channel(buffer);

        let hub = Self {
            members: HashMap::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            inspect_rx,
            broadcasts: 0,
            evictions: 0,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            inspect_tx,
        };
        (hub, handle)
    }

    /// Process requests until `shutdown` fires or every handle is dropped.
    ///
    /// Ready requests are taken in a fixed order: unregister, register,
    /// broadcast, inspect. A request is therefore applied before any
    /// snapshot asked for after it was submitted.
    ///
    /// On exit all remaining mailboxes are closed, which ends each session's
    /// outbound loop with a close frame.
    #[instrument(skip_all, name = "hub")]
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("hub started");
        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    debug!("hub shutdown requested");
                    break;
                }
                Some(id) = self.unregister_rx.recv() => {
                    let _ = self.unregister(&id);
                }
                registration = self.register_rx.recv() => {
                    // Every sender lives in `HubHandle`: one queue closing
                    // means all handles are gone.
                    let Some(registration) = registration else {
                        debug!("every hub handle dropped");
                        break;
                    };
                    self.register(registration.id, registration.mailbox);
                    let _ = registration.ack.send(());
                }
                Some(message) = self.broadcast_rx.recv() => {
                    let _ = self.broadcast(&message);
                }
                Some(reply) = self.inspect_rx.recv() => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }
        let remaining = self.members.len();
        self.members.clear();
        self.record_size();
        info!(remaining, "hub stopped");
    }

    /// Add `id`, replacing (and closing) any previous mailbox under that id.
    fn register(&mut self, id: SessionId, mailbox: Mailbox) {
        if self.members.insert(id.clone(), mailbox).is_some() {
            warn!(session_id = %id, "session re-registered, previous mailbox closed");
        }
        debug!(session_id = %id, members = self.members.len(), "session registered");
        self.record_size();
    }

    /// Remove `id` if present. Returns whether it was a member.
    ///
    /// Dropping the sender is what closes the mailbox, so it can only
    /// happen once per registration.
    fn unregister(&mut self, id: &SessionId) -> bool {
        let removed = self.members.remove(id).is_some();
        if removed {
            debug!(session_id = %id, members = self.members.len(), "session unregistered");
            self.record_size();
        }
        removed
    }

    /// Offer `message` to every member without blocking.
    ///
    /// A full mailbox means the session is not keeping up; it is evicted on
    /// the spot rather than allowed to stall everyone else.
    fn broadcast(&mut self, message: &Bytes) -> FanOut {
        self.broadcasts += 1;
        let mut outcome = FanOut::default();

        self.members.retain(|id, mailbox| match mailbox.try_send(message.clone()) {
            Ok(()) => {
                outcome.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(session_id = %id, "mailbox full, evicting slow session");
                outcome.evicted += 1;
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session_id = %id, "mailbox receiver gone, dropping session");
                outcome.gone += 1;
                false
            }
        });

        self.evictions += outcome.evicted as u64;
        counter!(HUB_BROADCASTS_TOTAL).increment(1);
        counter!(HUB_DELIVERIES_TOTAL).increment(outcome.delivered as u64);
        if outcome.evicted > 0 {
            counter!(HUB_EVICTIONS_TOTAL).increment(outcome.evicted as u64);
        }
        if outcome.evicted + outcome.gone > 0 {
            self.record_size();
        }
        debug!(
            len = message.len(),
            delivered = outcome.delivered,
            evicted = outcome.evicted,
            "broadcast fanned out"
        );
        outcome
    }

    fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            members: self.members.keys().cloned().collect(),
            broadcasts: self.broadcasts,
            evictions: self.evictions,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_size(&self) {
        gauge!(HUB_SESSIONS_ACTIVE).set(self.members.len() as f64);
    }
}

#[cfg(test)]
mod tests;
