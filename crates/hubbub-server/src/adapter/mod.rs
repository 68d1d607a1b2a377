//! Connection adapters: the seam between the session loops and a transport.
//!
//! A [`Connection`] is split once into a reader half and a writer half. The
//! inbound loop takes sole ownership of the reader and the outbound loop of
//! the writer, so a connection can never have two concurrent readers or two
//! concurrent writers.

pub mod memory;
pub mod ws;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ConnectionError;

/// A frame received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Application payload, text or binary.
    Data(Bytes),
    /// Liveness probe from the peer. The transport answers it.
    Ping,
    /// Answer to one of our pings.
    Pong,
}

/// A frame written to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Application payload. Sent as text when valid UTF-8, binary otherwise.
    Data(Bytes),
    /// Liveness probe.
    Ping,
    /// Close notification.
    Close,
}

/// Receiving half of a connection.
#[async_trait]
pub trait ConnectionReader: Send + 'static {
    /// Wait for the next frame.
    ///
    /// A close frame or end of stream is reported as
    /// [`ConnectionError::PeerClosed`].
    async fn recv(&mut self) -> Result<Frame, ConnectionError>;
}

/// Sending half of a connection.
#[async_trait]
pub trait ConnectionWriter: Send + 'static {
    /// Queue a frame without flushing it.
    async fn feed(&mut self, frame: Outgoing) -> Result<(), ConnectionError>;

    /// Flush every queued frame to the transport.
    async fn flush(&mut self) -> Result<(), ConnectionError>;

    /// Shut the sending side down. Errors are ignored.
    async fn close(&mut self);
}

/// A bidirectional connection that can be split into its two halves.
pub trait Connection: Send + 'static {
    /// Reader half.
    type Reader: ConnectionReader;
    /// Writer half.
    type Writer: ConnectionWriter;

    /// Split into independently owned halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}
