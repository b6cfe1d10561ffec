//! `tokio-tungstenite` socket implementation.
//!
//! tungstenite hands out whole messages, so every received message is a
//! single end-of-message fragment. Outbound fragments are collected until
//! their end-of-message fragment and sent as one message.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as TungsteniteError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::trace;

use super::socket::{
    CloseStatus, SocketEvent, SocketMessageType, SocketReceiver, SocketSender, WebSocket,
};
use crate::error::{Result, WsPipeError};

/// A `tokio-tungstenite` stream usable by the transport adapter.
pub struct TungsteniteSocket<S> {
    stream: WebSocketStream<S>,
}

impl<S> TungsteniteSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an already-handshaken stream.
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

impl<S> WebSocket for TungsteniteSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Receiver = TungsteniteReceiver<S>;
    type Sender = TungsteniteSender<S>;

    fn split(self) -> (Self::Receiver, Self::Sender) {
        let (sink, stream) = self.stream.split();
        (
            TungsteniteReceiver { stream },
            TungsteniteSender {
                sink,
                pending: BytesMut::new(),
                closed: false,
            },
        )
    }
}

/// Receiving half of a [`TungsteniteSocket`].
pub struct TungsteniteReceiver<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> SocketReceiver for TungsteniteReceiver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn receive(&mut self) -> Result<SocketEvent> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(SocketEvent::Data {
                        payload: Bytes::from(text),
                        message_type: SocketMessageType::Text,
                        end_of_message: true,
                    });
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(SocketEvent::Data {
                        payload: data,
                        message_type: SocketMessageType::Binary,
                        end_of_message: true,
                    });
                }
                Some(Ok(Message::Close(frame))) => {
                    return Ok(SocketEvent::Close {
                        code: frame.map(|f| u16::from(f.code)),
                    });
                }
                // tungstenite queues the pong reply itself.
                Some(Ok(Message::Ping(_))) => return Ok(SocketEvent::Ping),
                Some(Ok(Message::Pong(_))) => return Ok(SocketEvent::Pong),
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(
                    TungsteniteError::ConnectionClosed
                    | TungsteniteError::AlreadyClosed
                    | TungsteniteError::Protocol(ProtocolError::ResetWithoutClosingHandshake),
                ))
                | None => return Err(WsPipeError::ConnectionClosed),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// Sending half of a [`TungsteniteSocket`].
pub struct TungsteniteSender<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    /// Fragments of a message whose last fragment has not arrived yet.
    pending: BytesMut,
    closed: bool,
}

impl<S> TungsteniteSender<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_message(&mut self, message: Message) -> Result<()> {
        if let Err(e) = self.sink.send(message).await {
            self.closed = true;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl<S> SocketSender for TungsteniteSender<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(
        &mut self,
        payload: Bytes,
        message_type: SocketMessageType,
        end_of_message: bool,
    ) -> Result<()> {
        if !end_of_message {
            self.pending.extend_from_slice(&payload);
            return Ok(());
        }

        let payload = if self.pending.is_empty() {
            payload
        } else {
            self.pending.extend_from_slice(&payload);
            self.pending.split().freeze()
        };

        let message = match message_type {
            SocketMessageType::Text => Message::text(String::from_utf8(payload.to_vec())?),
            SocketMessageType::Binary => Message::binary(payload),
        };
        self.send_message(message).await
    }

    async fn close(&mut self, status: CloseStatus) -> Result<()> {
        let code = match status {
            CloseStatus::Normal => CloseCode::Normal,
            CloseStatus::InternalError => CloseCode::Error,
        };
        let frame = CloseFrame {
            code,
            reason: "".into(),
        };

        let result = self.sink.send(Message::Close(Some(frame))).await;
        self.closed = true;
        match result {
            Ok(()) => Ok(()),
            Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed) => {
                trace!("Close frame not sent, socket already closed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn ping(&mut self) -> Result<()> {
        self.send_message(Message::Ping(Bytes::new())).await
    }

    fn can_send(&self) -> bool {
        !self.closed
    }
}
