//! Protocol stream over an iroh bidirectional QUIC stream

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use iroh::endpoint::{RecvStream, SendStream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::trace;

use delegate_core::{PeerIdentity, ProtocolStream, TransportError};

use crate::identity::IrohIdentity;

/// One routing exchange with one peer
///
/// Writes go to the QUIC send half, reads come from the receive half.
/// [`ProtocolStream::close`] stops the receive half, finishes the send half
/// and waits (up to `close_timeout`) until the peer has acknowledged every
/// byte written, so closing the connection afterwards loses nothing. The
/// underlying connection stays pooled.
#[derive(Debug)]
pub struct IrohStream {
    send: SendStream,
    recv: RecvStream,
    remote: IrohIdentity,
    protocol: String,
    close_timeout: Duration,
    closed: bool,
}

impl IrohStream {
    pub(crate) fn new(
        send: SendStream,
        recv: RecvStream,
        remote: IrohIdentity,
        protocol: impl Into<String>,
        close_timeout: Duration,
    ) -> Self {
        Self {
            send,
            recv,
            remote,
            protocol: protocol.into(),
            close_timeout,
            closed: false,
        }
    }
}

impl AsyncWrite for IrohStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        AsyncWrite::poll_write(Pin::new(&mut self.send), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.send).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.send).poll_shutdown(cx)
    }
}

impl AsyncRead for IrohStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.recv).poll_read(cx, buf)
    }
}

#[async_trait]
impl ProtocolStream<IrohIdentity> for IrohStream {
    fn remote_peer(&self) -> IrohIdentity {
        self.remote
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Errors if the peer already finished its half
        let _ = self.recv.stop(0u32.into());

        self.send
            .finish()
            .map_err(|e| TransportError::StreamFailed(e.to_string()))?;

        // Resolves once the peer holds everything we wrote, or stopped reading
        match tokio::time::timeout(self.close_timeout, self.send.stopped()).await {
            Ok(Ok(_)) => {
                trace!(remote = %self.remote.short_id(), protocol = %self.protocol, "stream closed");
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::StreamFailed(e.to_string())),
            Err(_) => Err(TransportError::Timeout(self.close_timeout.as_millis() as u64)),
        }
    }
}
