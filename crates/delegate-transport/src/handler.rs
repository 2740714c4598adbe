//! Inbound dispatch for the routing protocol
//!
//! The iroh [`Router`](iroh::protocol::Router) hands every connection
//! negotiated with our ALPN to [`RoutingProtocolHandler`], which accepts the
//! bi-directional streams the peer opens on it and passes each one to a
//! [`StreamHandler`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use iroh::endpoint::Connection;
use iroh::protocol::{AcceptError, ProtocolHandler};
use tracing::{debug, instrument};

use delegate_core::{PeerIdentity, StreamHandler};

use crate::config::HostConfig;
use crate::identity::IrohIdentity;
use crate::stream::IrohStream;

/// Handler for incoming connections on one routing protocol
pub struct RoutingProtocolHandler<H> {
    protocol: String,
    handler: Arc<H>,
    close_timeout: Duration,
}

impl<H> RoutingProtocolHandler<H>
where
    H: StreamHandler<IrohStream> + 'static,
{
    /// Dispatch streams on `protocol` connections to `handler`
    pub fn new(protocol: impl Into<String>, handler: Arc<H>) -> Self {
        Self {
            protocol: protocol.into(),
            handler,
            close_timeout: HostConfig::default().close_timeout(),
        }
    }

    /// How long closing an accepted stream waits for the peer's acknowledgement
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }
}

impl<H> Clone for RoutingProtocolHandler<H> {
    fn clone(&self) -> Self {
        Self {
            protocol: self.protocol.clone(),
            handler: self.handler.clone(),
            close_timeout: self.close_timeout,
        }
    }
}

impl<H> fmt::Debug for RoutingProtocolHandler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingProtocolHandler")
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

impl<H> ProtocolHandler for RoutingProtocolHandler<H>
where
    H: StreamHandler<IrohStream> + 'static,
{
    #[instrument(skip_all, fields(protocol = %self.protocol))]
    async fn accept(&self, connection: Connection) -> Result<(), AcceptError> {
        let remote = IrohIdentity::new(connection.remote_id());
        debug!(remote = %remote.short_id(), "inbound routing connection");

        loop {
            match connection.accept_bi().await {
                Ok((send, recv)) => {
                    let stream = IrohStream::new(
                        send,
                        recv,
                        remote,
                        self.protocol.clone(),
                        self.close_timeout,
                    );
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        handler.handle_stream(stream).await;
                    });
                }
                Err(e) => {
                    // Peer closed the connection or the endpoint is shutting down
                    debug!(remote = %remote.short_id(), reason = %e, "inbound connection ended");
                    return Ok(());
                }
            }
        }
    }
}
