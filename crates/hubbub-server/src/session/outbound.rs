//! Outbound loop: mailbox → connection, plus the heartbeat.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use hubbub_settings::Framing;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use super::{SessionConfig, SessionId};
use crate::adapter::{ConnectionWriter, Outgoing};
use crate::error::ConnectionError;

#[instrument(skip_all, name = "outbound", fields(session_id = %id))]
pub(super) async fn run_outbound<W: ConnectionWriter>(
    id: SessionId,
    mut writer: W,
    mut mailbox: mpsc::Receiver<Bytes>,
    close: CancellationToken,
    config: Arc<SessionConfig>,
) {
    match pump(&mut writer, &mut mailbox, &close, &config).await {
        Ok(()) => debug!("mailbox closed, close frame sent"),
        Err(e) if e.is_expected() => debug!(error = %e, "outbound loop stopped"),
        Err(e) => warn!(error = %e, "outbound loop failed"),
    }
    if time::timeout(config.write_wait, writer.close()).await.is_err() {
        debug!("writer did not close within the write deadline");
    }
    close.cancel();
}

/// Drain the mailbox until it closes (`Ok`) or a write fails.
async fn pump<W: ConnectionWriter>(
    writer: &mut W,
    mailbox: &mut mpsc::Receiver<Bytes>,
    close: &CancellationToken,
    config: &SessionConfig,
) -> Result<(), ConnectionError> {
    let mut heartbeat = time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = close.cancelled() => return Err(ConnectionError::Closed),
            next = mailbox.recv() => {
                let Some(first) = next else {
                    write_frames(writer, vec![Outgoing::Close], config.write_wait).await?;
                    return Ok(());
                };
                let frames = coalesce(first, mailbox, config.framing);
                trace!(frames = frames.len(), "writing queued messages");
                write_frames(writer, frames, config.write_wait).await?;
            }
            _ = heartbeat.tick() => {
                write_frames(writer, vec![Outgoing::Ping], config.write_wait).await?;
            }
        }
    }
}

/// Take `first` plus whatever is already queued behind it.
///
/// Only messages present right now are taken, so a busy hub cannot keep
/// one write open indefinitely.
pub(super) fn coalesce(
    first: Bytes,
    mailbox: &mut mpsc::Receiver<Bytes>,
    framing: Framing,
) -> Vec<Outgoing> {
    let queued = mailbox.len();
    if queued == 0 {
        return vec![Outgoing::Data(first)];
    }

    let mut rest = Vec::with_capacity(queued);
    for _ in 0..queued {
        match mailbox.try_recv() {
            Ok(msg) => rest.push(msg),
            Err(_) => break,
        }
    }

    match framing {
        Framing::Frame => std::iter::once(first)
            .chain(rest)
            .map(Outgoing::Data)
            .collect(),
        Framing::Newline => {
            let len = first.len() + rest.iter().map(|m| m.len() + 1).sum::<usize>();
            let mut joined = BytesMut::with_capacity(len);
            joined.extend_from_slice(&first);
            for msg in rest {
                joined.extend_from_slice(b"\n");
                joined.extend_from_slice(&msg);
            }
            vec![Outgoing::Data(joined.freeze())]
        }
    }
}

/// Feed `frames` and flush them, all within `write_wait`.
async fn write_frames<W: ConnectionWriter>(
    writer: &mut W,
    frames: Vec<Outgoing>,
    write_wait: Duration,
) -> Result<(), ConnectionError> {
    let write = async {
        for frame in frames {
            writer.feed(frame).await?;
        }
        writer.flush().await
    };
    time::timeout(write_wait, write)
        .await
        .map_err(|_| ConnectionError::WriteTimeout)?
}
