use futures_util::{Sink, SinkExt};
use std::{
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::io::AsyncWrite;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::trace;

/// Presents the write half of a WebSocket as a byte sink.
///
/// Every successful `poll_write` sends the whole buffer as one binary message
/// and flushes it before reporting completion, so a copy loop driving this
/// writer produces exactly one frame per chunk it reads. Shutting the writer
/// down sends a close frame.
pub struct FrameWriter<K> {
    sink: K,
    /// Length of a message already handed to the sink but not yet flushed.
    in_flight: Option<usize>,
}

impl<K> FrameWriter<K>
where
    K: Sink<Message, Error = WsError> + Unpin,
{
    pub fn new(sink: K) -> Self {
        Self {
            sink,
            in_flight: None,
        }
    }
}

fn into_io_error(err: WsError) -> io::Error {
    match err {
        WsError::Io(e) => e,
        closed @ (WsError::ConnectionClosed | WsError::AlreadyClosed) => {
            io::Error::new(io::ErrorKind::BrokenPipe, closed)
        }
        other => io::Error::other(other),
    }
}

impl<K> AsyncWrite for FrameWriter<K>
where
    K: Sink<Message, Error = WsError> + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        // A pending flush means the caller is retrying the same chunk; the
        // message is already queued and must not be sent twice.
        if this.in_flight.is_none() {
            if buf.is_empty() {
                return Poll::Ready(Ok(0));
            }
            ready!(this.sink.poll_ready_unpin(cx)).map_err(into_io_error)?;
            this.sink
                .start_send_unpin(Message::binary(buf.to_vec()))
                .map_err(into_io_error)?;
            this.in_flight = Some(buf.len());
        }

        let flushed = ready!(this.sink.poll_flush_unpin(cx));
        let len = this.in_flight.take().unwrap_or_default();
        flushed.map_err(into_io_error)?;

        trace!(bytes = len, "Sent binary frame");
        Poll::Ready(Ok(len))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut()
            .sink
            .poll_flush_unpin(cx)
            .map_err(into_io_error)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut()
            .sink
            .poll_close_unpin(cx)
            .map_err(into_io_error)
    }
}
