//! Host and stream capabilities consumed by the proxy
//!
//! The [`Host`] trait is the only thing the forwarding engine knows about
//! the network: it can make sure a connection to a peer exists and open a
//! protocol-scoped stream on it. Address resolution, dialing, encryption and
//! multiplexing all live behind it.
//!
//! ## Implementations
//!
//! - [`MockHost`](crate::MockHost): Scripted in-memory host for testing (in this crate)
//! - `IrohHost`: Real iroh transport (in delegate-transport crate)

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransportError;
use crate::identity::PeerIdentity;

/// A bidirectional byte stream scoped to one protocol exchange with one peer
///
/// Reads and writes go through [`AsyncRead`] / [`AsyncWrite`]. A stream is
/// owned by exactly one exchange and must be closed by it.
#[async_trait]
pub trait ProtocolStream<I: PeerIdentity>: AsyncRead + AsyncWrite + Unpin + Send {
    /// Identity of the peer at the other end of the connection
    fn remote_peer(&self) -> I;

    /// Protocol identifier the stream was opened for
    fn protocol(&self) -> &str;

    /// Close the stream
    ///
    /// Closing twice is not an error for implementations, but callers
    /// should close once.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Connection and stream provider
///
/// # Type Parameters
///
/// * `I` - The peer identity type (e.g., `SimulationIdentity` or `IrohIdentity`)
#[async_trait]
pub trait Host<I: PeerIdentity>: Send + Sync {
    /// Stream type produced by [`Host::new_stream`]
    type Stream: ProtocolStream<I>;

    /// Our own identity
    fn local_id(&self) -> I;

    /// Ensure a live connection to `peer` exists
    ///
    /// Only the identifier is supplied; finding an address is up to the host.
    async fn connect(&self, peer: &I) -> Result<(), TransportError>;

    /// Open a new stream to `peer` for the given protocol identifier
    async fn new_stream(&self, protocol: &str, peer: &I) -> Result<Self::Stream, TransportError>;
}

/// Receiver for streams that a remote opened to us
#[async_trait]
pub trait StreamHandler<S>: Send + Sync {
    /// Take ownership of an inbound stream
    async fn handle_stream(&self, stream: S);
}
