//! iroh endpoint as a routing host
//!
//! [`IrohHost`] owns one iroh [`Endpoint`] and a pool of live connections,
//! keyed by peer and ALPN. A connection negotiated for one protocol is never
//! used for streams of another, so `new_stream` dials separately when the
//! protocol differs from the one `connect` used.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use iroh::endpoint::Connection;
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointAddr, SecretKey};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use delegate_core::{Host, PeerIdentity, StreamHandler, TransportError};

use crate::config::HostConfig;
use crate::error::HostError;
use crate::handler::RoutingProtocolHandler;
use crate::identity::IrohIdentity;
use crate::stream::IrohStream;

type PoolKey = (IrohIdentity, String);

/// A [`Host`] backed by an iroh endpoint
pub struct IrohHost {
    endpoint: Endpoint,
    identity: IrohIdentity,
    /// Live connections by (peer, ALPN)
    connections: DashMap<PoolKey, Connection>,
    /// Address hints; peers without one are dialed by key alone
    addresses: DashMap<IrohIdentity, EndpointAddr>,
    config: HostConfig,
    /// Inbound dispatch, once serving
    router: Mutex<Option<Router>>,
    shutdown: AtomicBool,
}

impl IrohHost {
    /// Bind an endpoint with the given secret key
    pub async fn bind(secret_key: SecretKey, config: HostConfig) -> Result<Self, HostError> {
        let endpoint = Endpoint::builder()
            .secret_key(secret_key.clone())
            .alpns(vec![config.dial_protocol.as_bytes().to_vec()])
            .bind()
            .await
            .map_err(|e| HostError::Bind(e.to_string()))?;

        let identity = IrohIdentity::new(secret_key.public());
        info!(
            identity = %identity.short_id(),
            protocol = %config.dial_protocol,
            "Routing host bound"
        );

        Ok(Self {
            endpoint,
            identity,
            connections: DashMap::new(),
            addresses: DashMap::new(),
            config,
            router: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn local_identity(&self) -> IrohIdentity {
        self.identity
    }

    /// Our address, for sharing with peers
    pub fn endpoint_addr(&self) -> EndpointAddr {
        self.endpoint.addr()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Remember how to reach a peer
    pub fn add_peer_address(&self, addr: EndpointAddr) {
        let peer = IrohIdentity::new(addr.id);
        debug!(peer = %peer.short_id(), "Added address hint");
        self.addresses.insert(peer, addr);
    }

    /// Accept `protocol` connections and hand their streams to `handler`
    ///
    /// Replaces any router started earlier.
    pub async fn spawn_router<H>(&self, protocol: &str, handler: Arc<H>)
    where
        H: StreamHandler<IrohStream> + 'static,
    {
        let router = Router::builder(self.endpoint.clone())
            .accept(
                protocol.as_bytes(),
                RoutingProtocolHandler::new(protocol, handler)
                    .with_close_timeout(self.config.close_timeout()),
            )
            .spawn();

        let previous = self.router.lock().await.replace(router);
        if let Some(previous) = previous {
            if let Err(e) = previous.shutdown().await {
                warn!(error = %e, "Router shutdown error");
            }
        }
        info!(protocol, "Accepting inbound routing streams");
    }

    /// A live connection to `peer` negotiated for `protocol`, dialing if needed
    #[instrument(skip(self), fields(peer = %peer.short_id()))]
    async fn connection_for(&self, peer: &IrohIdentity, protocol: &str) -> Result<Connection, HostError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(HostError::Shutdown);
        }

        let key = (*peer, protocol.to_string());
        if let Some(conn) = self.connections.get(&key) {
            if conn.close_reason().is_none() {
                debug!("Reusing existing connection");
                return Ok(conn.clone());
            }
            drop(conn);
            self.connections.remove(&key);
        }

        let current = self.connections.len();
        if current >= self.config.max_connections {
            warn!(current, max = self.config.max_connections, "Connection limit reached");
            return Err(HostError::TooManyConnections {
                current,
                max: self.config.max_connections,
            });
        }

        let addr = self
            .addresses
            .get(peer)
            .map(|a| a.value().clone())
            .unwrap_or_else(|| EndpointAddr::new(*peer.public_key()));

        debug!("Establishing new connection");
        let conn = tokio::time::timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            self.endpoint.connect(addr, protocol.as_bytes()),
        )
        .await
        .map_err(|_| {
            warn!(timeout_ms = self.config.connect_timeout_ms, "Connection timeout");
            HostError::Timeout(self.config.connect_timeout_ms)
        })?
        .map_err(|e| {
            warn!(error = %e, "Connection failed");
            HostError::Connect(e.to_string())
        })?;

        info!("Connection established");
        self.connections.insert(key, conn.clone());
        Ok(conn)
    }

    /// Peers with at least one live connection
    pub fn connected_peers(&self) -> Vec<IrohIdentity> {
        let peers: HashSet<_> = self
            .connections
            .iter()
            .filter(|c| c.value().close_reason().is_none())
            .map(|c| c.key().0)
            .collect();
        peers.into_iter().collect()
    }

    /// Close every pooled connection to `peer`
    pub fn close_connection(&self, peer: &IrohIdentity) {
        self.connections.retain(|(id, _), conn| {
            if id == peer {
                conn.close(0u32.into(), b"closing");
                false
            } else {
                true
            }
        });
        debug!(peer = %peer.short_id(), "Closed connections");
    }

    /// Drop pooled connections that have closed
    pub fn cleanup_stale(&self) {
        let before = self.connections.len();
        self.connections
            .retain(|_, conn| conn.close_reason().is_none());
        let removed = before.saturating_sub(self.connections.len());
        if removed > 0 {
            debug!(removed, "Removed stale connections");
        }
    }

    pub fn stats(&self) -> HostStats {
        let active = self
            .connections
            .iter()
            .filter(|c| c.value().close_reason().is_none())
            .count();

        HostStats {
            active_connections: active,
            total_connections: self.connections.len(),
            max_connections: self.config.max_connections,
        }
    }

    /// Stop serving, close all connections and the endpoint
    pub async fn close(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down routing host");

        let router = self.router.lock().await.take();
        if let Some(router) = router {
            if let Err(e) = router.shutdown().await {
                warn!(error = %e, "Router shutdown error");
            }
        }

        for entry in self.connections.iter() {
            entry.value().close(0u32.into(), b"shutdown");
        }
        self.connections.clear();

        self.endpoint.close().await;
    }
}

#[async_trait]
impl Host<IrohIdentity> for IrohHost {
    type Stream = IrohStream;

    fn local_id(&self) -> IrohIdentity {
        self.identity
    }

    async fn connect(&self, peer: &IrohIdentity) -> Result<(), TransportError> {
        self.connection_for(peer, &self.config.dial_protocol).await?;
        Ok(())
    }

    async fn new_stream(&self, protocol: &str, peer: &IrohIdentity) -> Result<IrohStream, TransportError> {
        let conn = self.connection_for(peer, protocol).await?;

        let (send, recv) = conn.open_bi().await.map_err(|e| {
            // A connection that cannot open streams is of no further use
            if conn.close_reason().is_some() {
                self.connections.remove(&(*peer, protocol.to_string()));
            }
            HostError::OpenStream(e.to_string())
        })?;

        debug!(peer = %peer.short_id(), protocol, "Opened stream");
        Ok(IrohStream::new(
            send,
            recv,
            *peer,
            protocol,
            self.config.close_timeout(),
        ))
    }
}

/// Connection pool statistics
#[derive(Debug, Clone)]
pub struct HostStats {
    /// Connections not yet closed
    pub active_connections: usize,
    /// Connections in the pool, closed ones included
    pub total_connections: usize,
    pub max_connections: usize,
}
