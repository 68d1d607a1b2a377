//! Error types for the hub, connections and the HTTP surface.

use std::io;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

/// The hub's coordinating loop is no longer accepting requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    /// The loop has stopped (shutdown, or every handle was dropped).
    #[error("hub is not running")]
    Closed,
}

/// Close code sent by a peer that is going away (page unload, shutdown).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Reserved close code meaning the stream ended without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Failures on a single connection. Always local to one session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The peer sent a close frame or the stream ended.
    #[error("connection closed by peer (code {code:?})")]
    PeerClosed {
        /// Close code, `None` when the stream ended without a close frame.
        code: Option<u16>,
    },
    /// The session's close signal fired (the other loop or shutdown closed it).
    #[error("connection closed")]
    Closed,
    /// No pong arrived before the read deadline.
    #[error("read deadline elapsed")]
    ReadTimeout,
    /// A write did not complete before the write deadline.
    #[error("write deadline elapsed")]
    WriteTimeout,
    /// An inbound message exceeded the size ceiling.
    #[error("message of {len} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Received size.
        len: usize,
        /// Configured ceiling.
        limit: usize,
    },
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Whether this is an ordinary way for a connection to end.
    ///
    /// Going-away, normal and abnormal (no close frame) closures, as well as
    /// local closes, are routine; everything else is worth a warning.
    pub fn is_expected(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::PeerClosed { code } => matches!(
                code,
                None | Some(CLOSE_NORMAL | CLOSE_GOING_AWAY | CLOSE_ABNORMAL)
            ),
            Self::ReadTimeout | Self::WriteTimeout | Self::TooLarge { .. } | Self::Transport(_) => {
                false
            }
        }
    }

    /// Short label for logs and the disconnection counter.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::PeerClosed { .. } => "peer_closed",
            Self::Closed => "closed",
            Self::ReadTimeout => "read_timeout",
            Self::WriteTimeout => "write_timeout",
            Self::TooLarge { .. } => "too_large",
            Self::Transport(_) => "transport",
        }
    }
}

impl From<axum::Error> for ConnectionError {
    fn from(err: axum::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Errors starting the HTTP listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listen address failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Reading back the bound address failed.
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] io::Error),
}

/// JSON body returned when a WebSocket handshake is rejected.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub error: &'static str,
    /// Human-readable reason.
    pub message: String,
}

/// A rejected upgrade, rendered as a client-error status plus [`ErrorBody`].
#[derive(Debug)]
pub struct UpgradeRejected {
    status: StatusCode,
    message: String,
}

impl UpgradeRejected {
    /// HTTP status the originator receives.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<WebSocketUpgradeRejection> for UpgradeRejected {
    fn from(rejection: WebSocketUpgradeRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for UpgradeRejected {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: "upgrade_failed",
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
