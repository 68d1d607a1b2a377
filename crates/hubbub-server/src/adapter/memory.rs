//! In-process [`Connection`] backed by channels.
//!
//! [`pair`] returns the session side and a [`MemoryPeer`] that plays the
//! remote client: it pushes frames in, observes what the session writes, and
//! can hang up. Used to drive sessions without a network.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Connection, ConnectionReader, ConnectionWriter, Frame, Outgoing};
use crate::error::ConnectionError;

type Inbound = Result<Frame, ConnectionError>;

/// Session side of an in-process connection.
pub struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::UnboundedSender<Outgoing>,
}

/// Remote side of an in-process connection.
pub struct MemoryPeer {
    to_session: mpsc::UnboundedSender<Inbound>,
    from_session: mpsc::UnboundedReceiver<Outgoing>,
}

/// Create a connected pair.
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (to_session, inbound) = mpsc::unbounded_channel();
    let (outbound, from_session) = mpsc::unbounded_channel();
    (
        MemoryConnection { inbound, outbound },
        MemoryPeer {
            to_session,
            from_session,
        },
    )
}

/// Reader half of a [`MemoryConnection`].
pub struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

/// Writer half of a [`MemoryConnection`].
pub struct MemoryWriter {
    outbound: Option<mpsc::UnboundedSender<Outgoing>>,
    pending: Vec<Outgoing>,
}

impl Connection for MemoryConnection {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn split(self) -> (MemoryReader, MemoryWriter) {
        (
            MemoryReader {
                inbound: self.inbound,
            },
            MemoryWriter {
                outbound: Some(self.outbound),
                pending: Vec::new(),
            },
        )
    }
}

#[async_trait]
impl ConnectionReader for MemoryReader {
    async fn recv(&mut self) -> Result<Frame, ConnectionError> {
        match self.inbound.recv().await {
            Some(next) => next,
            None => Err(ConnectionError::PeerClosed { code: None }),
        }
    }
}

#[async_trait]
impl ConnectionWriter for MemoryWriter {
    async fn feed(&mut self, frame: Outgoing) -> Result<(), ConnectionError> {
        if self.outbound.is_none() {
            return Err(ConnectionError::Closed);
        }
        self.pending.push(frame);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnectionError> {
        let Some(outbound) = &self.outbound else {
            return Err(ConnectionError::Closed);
        };
        for frame in self.pending.drain(..) {
            outbound
                .send(frame)
                .map_err(|_| ConnectionError::Transport("peer hung up".into()))?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.pending.clear();
        self.outbound = None;
    }
}

impl MemoryPeer {
    /// Send an application payload to the session.
    pub fn send(&self, payload: impl Into<Bytes>) -> bool {
        self.to_session.send(Ok(Frame::Data(payload.into()))).is_ok()
    }

    /// Answer a ping.
    pub fn pong(&self) -> bool {
        self.to_session.send(Ok(Frame::Pong)).is_ok()
    }

    /// Send a close frame with the given code.
    pub fn close(&self, code: u16) -> bool {
        self.to_session
            .send(Err(ConnectionError::PeerClosed { code: Some(code) }))
            .is_ok()
    }

    /// Inject a transport failure.
    pub fn fail(&self, reason: &str) -> bool {
        self.to_session
            .send(Err(ConnectionError::Transport(reason.to_string())))
            .is_ok()
    }

    /// Next frame written by the session, `None` once the writer is gone.
    pub async fn recv(&mut self) -> Option<Outgoing> {
        self.from_session.recv().await
    }

    /// Next data payload, skipping pings. `None` on close or writer gone.
    pub async fn recv_data(&mut self) -> Option<Bytes> {
        loop {
            match self.from_session.recv().await? {
                Outgoing::Data(payload) => return Some(payload),
                Outgoing::Ping => {}
                Outgoing::Close => return None,
            }
        }
    }

    /// A frame already written by the session, without waiting.
    pub fn try_recv(&mut self) -> Option<Outgoing> {
        self.from_session.try_recv().ok()
    }
}
