//! # Delegate Transport
//!
//! iroh-backed [`Host`](delegate_core::Host) for the delegated routing proxy.
//!
//! ## Features
//!
//! - iroh QUIC connections with hole punching and relay fallback
//! - Connection pooling keyed by peer and protocol
//! - One bi-directional QUIC stream per routing exchange
//! - Router-based dispatch of inbound streams to a `StreamHandler`
//!
//! ## Example
//!
//! ```rust,ignore
//! use delegate_transport::{HostConfig, IrohHost};
//! use delegate_proxy::{CallContext, RoutingProxy, StandardProxy};
//! use iroh::SecretKey;
//!
//! let secret = SecretKey::generate(&mut rand::rng());
//! let host = Arc::new(IrohHost::bind(secret, HostConfig::default()).await?);
//!
//! let proxy = StandardProxy::new(host.clone(), remotes);
//! host.spawn_router(PROTOCOL_ID, Arc::new(proxy.clone())).await;
//!
//! let reply = proxy.send_request(&CallContext::new(), &message).await?;
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod host;
pub mod identity;
pub mod stream;

// Re-export main types
pub use config::{DEFAULT_DIAL_PROTOCOL, HostConfig};
pub use error::HostError;
pub use handler::RoutingProtocolHandler;
pub use host::{HostStats, IrohHost};
pub use identity::IrohIdentity;
pub use stream::IrohStream;

// Re-export iroh types that users will need
pub use iroh::{EndpointAddr, PublicKey, SecretKey};
