//! Inbound loop: connection → hub.

use std::sync::Arc;

use metrics::{counter, histogram};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{SessionConfig, SessionId};
use crate::adapter::{ConnectionReader, Frame};
use crate::error::ConnectionError;
use crate::hub::HubHandle;
use crate::metrics::{WS_DISCONNECTIONS_TOTAL, WS_SESSION_DURATION_SECONDS};

/// Runs when the inbound loop ends, however it ends.
///
/// Unregisters the session and fires the close signal so the outbound loop
/// shuts the writer down.
struct Cleanup {
    id: SessionId,
    hub: HubHandle,
    close: CancellationToken,
    started: Instant,
    reason: &'static str,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if self.hub.unregister(&self.id).is_err() {
            debug!(session_id = %self.id, "hub already stopped, nothing to unregister");
        }
        self.close.cancel();
        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => self.reason).increment(1);
        histogram!(WS_SESSION_DURATION_SECONDS).record(self.started.elapsed().as_secs_f64());
        info!(session_id = %self.id, reason = self.reason, "session ended");
    }
}

#[instrument(skip_all, name = "inbound", fields(session_id = %id))]
pub(super) async fn run_inbound<R: ConnectionReader>(
    id: SessionId,
    mut reader: R,
    hub: HubHandle,
    close: CancellationToken,
    config: Arc<SessionConfig>,
) {
    let mut cleanup = Cleanup {
        id,
        hub: hub.clone(),
        close: close.clone(),
        started: Instant::now(),
        reason: "closed",
    };

    let err = pump(&mut reader, &hub, &close, &config).await;
    if err.is_expected() {
        debug!(error = %err, "inbound loop stopped");
    } else {
        warn!(error = %err, "inbound loop failed");
    }
    cleanup.reason = err.reason();
}

/// Read until something goes wrong. Never returns success.
async fn pump<R: ConnectionReader>(
    reader: &mut R,
    hub: &HubHandle,
    close: &CancellationToken,
    config: &SessionConfig,
) -> ConnectionError {
    let mut deadline = Instant::now() + config.pong_wait;
    loop {
        let frame = tokio::select! {
            () = close.cancelled() => return ConnectionError::Closed,
            read = time::timeout_at(deadline, reader.recv()) => match read {
                Err(_) => return ConnectionError::ReadTimeout,
                Ok(Err(e)) => return e,
                Ok(Ok(frame)) => frame,
            },
        };

        match frame {
            Frame::Pong => deadline = Instant::now() + config.pong_wait,
            // Answered by the transport.
            Frame::Ping => {}
            Frame::Data(payload) => {
                if payload.len() > config.max_message_size {
                    return ConnectionError::TooLarge {
                        len: payload.len(),
                        limit: config.max_message_size,
                    };
                }
                tokio::select! {
                    () = close.cancelled() => return ConnectionError::Closed,
                    sent = hub.broadcast(payload) => {
                        if sent.is_err() {
                            return ConnectionError::Closed;
                        }
                    }
                }
            }
        }
    }
}
