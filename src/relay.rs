use anyhow::Error;
use futures_util::{Stream, StreamExt};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Error as WsError, Message, error::ProtocolError},
};
use tracing::{debug, info, trace, warn};

use crate::frame::FrameWriter;

/// Largest chunk read from the TCP side, and so the largest binary frame sent.
pub const BUFFER_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    WebSocketToTcp,
    TcpToWebSocket,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocketToTcp => f.write_str("websocket->tcp"),
            Self::TcpToWebSocket => f.write_str("tcp->websocket"),
        }
    }
}

/// Why a tunnel session ended. Only the first direction to finish is reported.
#[derive(Debug)]
pub enum Termination {
    /// The TCP side reached end of stream.
    TcpClosed,
    /// The WebSocket peer closed, or the connection went away without a close handshake.
    WebSocketClosed,
    Failed { direction: Direction, error: Error },
}

impl Termination {
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::TcpClosed | Self::WebSocketClosed)
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        match self {
            Self::TcpClosed => Direction::TcpToWebSocket,
            Self::WebSocketClosed => Direction::WebSocketToTcp,
            Self::Failed { direction, .. } => *direction,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TcpClosed => f.write_str("TCP peer closed the connection"),
            Self::WebSocketClosed => f.write_str("WebSocket peer closed the connection"),
            Self::Failed { direction, error } => write!(f, "{direction} failed: {error:#}"),
        }
    }
}

/// Binds one TCP-side stream to one WebSocket for the lifetime of a tunnel session.
///
/// The TCP stream is read only by the egress direction and written only by the
/// ingress direction; the WebSocket is split the opposite way. Whichever
/// direction finishes first ends the session, and the other direction is
/// dropped, closing its halves.
pub struct Relay<T, S> {
    tcp: T,
    websocket: WebSocketStream<S>,
}

impl<T, S> Relay<T, S>
where
    T: AsyncRead + AsyncWrite,
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(tcp: T, websocket: WebSocketStream<S>) -> Self {
        Self { tcp, websocket }
    }

    pub async fn run(self) -> Termination {
        let (tcp_reader, tcp_writer) = tokio::io::split(self.tcp);
        let (ws_sink, ws_stream) = self.websocket.split();

        let termination = tokio::select! {
            termination = pump_websocket_to_tcp(ws_stream, tcp_writer) => termination,
            termination = pump_tcp_to_websocket(tcp_reader, FrameWriter::new(ws_sink)) => termination,
        };

        if termination.is_clean() {
            info!(reason = %termination, "Tunnel session closed");
        } else {
            warn!(reason = %termination, "Tunnel session failed");
        }
        termination
    }
}

/// Writes the payload of every binary frame to `tcp` until the WebSocket side ends.
///
/// Non-binary frames are dropped. The TCP write side is shut down before returning.
pub async fn pump_websocket_to_tcp<St, W>(mut frames: St, mut tcp: W) -> Termination
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    W: AsyncWrite + Unpin,
{
    let termination = loop {
        match frames.next().await {
            Some(Ok(Message::Binary(data))) => {
                trace!(bytes = data.len(), "Forwarding data from WebSocket to TCP");
                if let Err(e) = tcp.write_all(&data).await {
                    break Termination::Failed {
                        direction: Direction::WebSocketToTcp,
                        error: Error::new(e)
                            .context("Failed to write WebSocket data to TCP connection"),
                    };
                }
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "WebSocket close frame received");
                break Termination::WebSocketClosed;
            }
            Some(Ok(other)) => {
                debug!(bytes = other.len(), "Ignoring non-binary frame");
            }
            Some(Err(
                e @ (WsError::ConnectionClosed
                | WsError::AlreadyClosed
                | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)),
            )) => {
                debug!("WebSocket peer disconnected: {e}");
                break Termination::WebSocketClosed;
            }
            Some(Err(e)) => {
                break Termination::Failed {
                    direction: Direction::WebSocketToTcp,
                    error: Error::new(e).context("Failed to read from WebSocket"),
                };
            }
            None => break Termination::WebSocketClosed,
        }
    };

    if let Err(e) = tcp.shutdown().await {
        debug!(error = %e, "TCP shutdown failed");
    }
    termination
}

/// Copies `tcp` into `frames` chunk by chunk until end of stream or error, then
/// shuts `frames` down.
pub async fn pump_tcp_to_websocket<R, W>(tcp: R, mut frames: W) -> Termination
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, tcp);
    let copied = tokio::io::copy_buf(&mut reader, &mut frames).await;

    if let Err(e) = frames.shutdown().await {
        debug!(error = %e, "WebSocket close failed");
    }

    match copied {
        Ok(bytes) => {
            debug!(bytes, "TCP stream reached end of stream");
            Termination::TcpClosed
        }
        Err(e) => Termination::Failed {
            direction: Direction::TcpToWebSocket,
            error: Error::new(e).context("Failed to relay TCP data to WebSocket"),
        },
    }
}
