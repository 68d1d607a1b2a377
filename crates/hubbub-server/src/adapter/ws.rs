//! [`Connection`] over an axum WebSocket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use super::{Connection, ConnectionReader, ConnectionWriter, Frame, Outgoing};
use crate::error::ConnectionError;

/// Read half of an upgraded WebSocket.
pub struct WsReader {
    stream: SplitStream<WebSocket>,
}

/// Write half of an upgraded WebSocket.
pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
}

impl Connection for WebSocket {
    type Reader = WsReader;
    type Writer = WsWriter;

    fn split(self) -> (WsReader, WsWriter) {
        let (sink, stream) = StreamExt::split(self);
        (WsReader { stream }, WsWriter { sink })
    }
}

#[async_trait]
impl ConnectionReader for WsReader {
    async fn recv(&mut self) -> Result<Frame, ConnectionError> {
        match self.stream.next().await {
            None => Err(ConnectionError::PeerClosed { code: None }),
            Some(Err(e)) => Err(e.into()),
            Some(Ok(message)) => Ok(match message {
                Message::Text(text) => Frame::Data(Bytes::copy_from_slice(text.as_str().as_bytes())),
                Message::Binary(data) => Frame::Data(data),
                Message::Ping(_) => Frame::Ping,
                Message::Pong(_) => Frame::Pong,
                Message::Close(close) => {
                    return Err(ConnectionError::PeerClosed {
                        code: close.map(|frame| frame.code),
                    });
                }
            }),
        }
    }
}

#[async_trait]
impl ConnectionWriter for WsWriter {
    async fn feed(&mut self, frame: Outgoing) -> Result<(), ConnectionError> {
        self.sink.feed(to_message(frame)).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnectionError> {
        self.sink.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

/// Map an outgoing frame onto a WebSocket message.
fn to_message(frame: Outgoing) -> Message {
    match frame {
        Outgoing::Data(payload) => match std::str::from_utf8(&payload) {
            Ok(text) => Message::Text(text.into()),
            Err(_) => Message::Binary(payload),
        },
        Outgoing::Ping => Message::Ping(Bytes::new()),
        Outgoing::Close => Message::Close(None),
    }
}
