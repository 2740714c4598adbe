//! Mock host implementation for testing
//!
//! Provides a scripted in-memory [`Host`] so that forwarding logic can be
//! exercised without real network connections. Each remote peer is given a
//! [`RemoteBehavior`]; the host records every connection attempt and every
//! stream it hands out, so tests can assert on exactly what was contacted
//! and whether each stream was closed.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use delegate_core::{MockHost, RemoteBehavior, SimulationIdentity};
//!
//! let a = SimulationIdentity::new('A').unwrap();
//! let b = SimulationIdentity::new('B').unwrap();
//!
//! let host = MockHost::new(SimulationIdentity::new('L').unwrap())
//!     .with_remote(a, RemoteBehavior::Unreachable)
//!     .with_remote(b, RemoteBehavior::Echo);
//!
//! // ... drive a proxy over `host` ...
//! assert!(host.streams().iter().all(|s| s.close_count == 1));
//! ```

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::TransportError;
use crate::identity::PeerIdentity;
use crate::transport::{Host, ProtocolStream};

/// How a scripted remote responds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteBehavior {
    /// Connection attempts fail
    Unreachable,
    /// Connects, but refuses to open protocol streams
    RefuseStream,
    /// Stream writes fail with a broken pipe
    FailWrite,
    /// Takes the message and closes without replying
    Silent,
    /// Replies with the exact bytes it received
    Echo,
    /// Replies with the given raw bytes (framing included)
    Reply(Vec<u8>),
    /// Resets the stream when the reply is read
    ResetOnRead,
    /// Takes the message and never answers
    Hang,
}

/// Counters for one stream handed out by the mock host
#[derive(Debug)]
struct StreamRecord<I> {
    remote: I,
    protocol: String,
    bytes_written: AtomicUsize,
    bytes_read: AtomicUsize,
    close_count: AtomicUsize,
}

/// Snapshot of a stream's lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStats<I> {
    /// Peer the stream was opened to (or from, for inbound streams)
    pub remote: I,
    /// Protocol identifier the stream was opened for
    pub protocol: String,
    /// Bytes the local side wrote
    pub bytes_written: usize,
    /// Bytes the local side read
    pub bytes_read: usize,
    /// Number of times `close` was called
    pub close_count: usize,
}

impl<I: Clone> StreamRecord<I> {
    fn snapshot(&self) -> StreamStats<I> {
        StreamStats {
            remote: self.remote.clone(),
            protocol: self.protocol.clone(),
            bytes_written: self.bytes_written.load(Ordering::SeqCst),
            bytes_read: self.bytes_read.load(Ordering::SeqCst),
            close_count: self.close_count.load(Ordering::SeqCst),
        }
    }
}

/// A scripted in-memory host
#[derive(Debug)]
pub struct MockHost<I: PeerIdentity> {
    /// Our identity
    local_id: I,
    /// Scripted behavior per remote; unknown peers cannot be found
    behaviors: DashMap<I, RemoteBehavior>,
    /// Every connect call, in order
    connects: Mutex<Vec<I>>,
    /// Every stream handed out, in order
    streams: Mutex<Vec<Arc<StreamRecord<I>>>>,
}

impl<I: PeerIdentity> MockHost<I> {
    /// Create a mock host with no known remotes
    pub fn new(local_id: I) -> Self {
        Self {
            local_id,
            behaviors: DashMap::new(),
            connects: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
        }
    }

    /// Script a remote (builder form)
    pub fn with_remote(self, peer: I, behavior: RemoteBehavior) -> Self {
        self.behaviors.insert(peer, behavior);
        self
    }

    /// Script or re-script a remote
    pub fn set_behavior(&self, peer: I, behavior: RemoteBehavior) {
        self.behaviors.insert(peer, behavior);
    }

    /// Peers passed to `connect`, in call order
    pub fn connect_attempts(&self) -> Vec<I> {
        self.connects.lock().clone()
    }

    /// Number of `connect` calls
    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    /// Forget recorded connects and streams
    pub fn reset_history(&self) {
        self.connects.lock().clear();
        self.streams.lock().clear();
    }

    /// Lifecycle snapshot of every stream handed out, in order
    pub fn streams(&self) -> Vec<StreamStats<I>> {
        self.streams.lock().iter().map(|r| r.snapshot()).collect()
    }

    /// Create a stream as if `remote` had opened it to us
    ///
    /// `pending` is data the remote already wrote into the stream.
    pub fn inbound_stream(&self, remote: I, protocol: &str, pending: Vec<u8>) -> MockStream<I> {
        self.register_stream(remote, protocol, RemoteBehavior::Reply(pending))
    }

    fn register_stream(&self, remote: I, protocol: &str, behavior: RemoteBehavior) -> MockStream<I> {
        let record = Arc::new(StreamRecord {
            remote,
            protocol: protocol.to_string(),
            bytes_written: AtomicUsize::new(0),
            bytes_read: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
        });
        self.streams.lock().push(record.clone());
        MockStream {
            record,
            behavior,
            written: Vec::new(),
            reply: None,
            closed: false,
        }
    }

    fn behavior_of(&self, peer: &I) -> Result<RemoteBehavior, TransportError> {
        self.behaviors
            .get(peer)
            .map(|b| b.value().clone())
            .ok_or_else(|| TransportError::PeerNotFound(peer.short_id()))
    }
}

#[async_trait]
impl<I: PeerIdentity> Host<I> for MockHost<I> {
    type Stream = MockStream<I>;

    fn local_id(&self) -> I {
        self.local_id.clone()
    }

    async fn connect(&self, peer: &I) -> Result<(), TransportError> {
        self.connects.lock().push(peer.clone());
        match self.behavior_of(peer)? {
            RemoteBehavior::Unreachable => Err(TransportError::ConnectionFailed(format!(
                "{} is unreachable",
                peer.short_id()
            ))),
            _ => Ok(()),
        }
    }

    async fn new_stream(&self, protocol: &str, peer: &I) -> Result<Self::Stream, TransportError> {
        match self.behavior_of(peer)? {
            RemoteBehavior::Unreachable => Err(TransportError::ConnectionClosed),
            RemoteBehavior::RefuseStream => Err(TransportError::StreamFailed(format!(
                "{} does not speak {}",
                peer.short_id(),
                protocol
            ))),
            behavior => Ok(self.register_stream(peer.clone(), protocol, behavior)),
        }
    }
}

/// Stream handed out by [`MockHost`]
#[derive(Debug)]
pub struct MockStream<I> {
    record: Arc<StreamRecord<I>>,
    behavior: RemoteBehavior,
    /// Everything written by the local side
    written: Vec<u8>,
    /// Reply bytes and read position, prepared on first read
    reply: Option<(Vec<u8>, usize)>,
    closed: bool,
}

impl<I> MockStream<I> {
    fn closed_error() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "stream closed")
    }
}

impl<I> AsyncWrite for MockStream<I> {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Err(Self::closed_error()));
        }
        if this.behavior == RemoteBehavior::FailWrite {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "remote stopped reading",
            )));
        }
        this.written.extend_from_slice(buf);
        this.record
            .bytes_written
            .fetch_add(buf.len(), Ordering::SeqCst);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl<I> AsyncRead for MockStream<I> {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Err(Self::closed_error()));
        }

        match &this.behavior {
            // Never woken; only a cancelled caller gets past this
            RemoteBehavior::Hang => return Poll::Pending,
            RemoteBehavior::ResetOnRead => {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
            _ => {}
        }

        if this.reply.is_none() {
            let data = match &this.behavior {
                RemoteBehavior::Echo => this.written.clone(),
                RemoteBehavior::Reply(bytes) => bytes.clone(),
                _ => Vec::new(),
            };
            this.reply = Some((data, 0));
        }

        if let Some((data, pos)) = this.reply.as_mut() {
            let n = (data.len() - *pos).min(buf.remaining());
            buf.put_slice(&data[*pos..*pos + n]);
            *pos += n;
            this.record.bytes_read.fetch_add(n, Ordering::SeqCst);
        }
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl<I: PeerIdentity> ProtocolStream<I> for MockStream<I> {
    fn remote_peer(&self) -> I {
        self.record.remote.clone()
    }

    fn protocol(&self) -> &str {
        &self.record.protocol
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.record.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
