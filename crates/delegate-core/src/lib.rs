//! # Delegate Core
//!
//! Core traits, types, and errors for the delegated routing proxy.
//!
//! A node that does not run the full routing protocol hands its routing
//! queries to a fixed set of trusted remote peers. This crate holds the
//! abstractions that the forwarding engine is written against, so that the
//! same engine runs over a real iroh endpoint or over an in-memory mock.
//!
//! ## Key Traits
//!
//! - [`PeerIdentity`]: Abstraction over peer identification (char for sim, PublicKey for real)
//! - [`Host`]: Connection and stream provider consumed by the proxy
//! - [`ProtocolStream`]: A single bidirectional protocol exchange with one remote
//! - [`StreamHandler`]: Receiver for streams opened *to* the local node
//!
//! ## Key Types
//!
//! - [`RoutingMessage`]: The routing record carried by the proxy
//! - [`MockHost`]: Scripted in-memory host for tests

pub mod error;
pub mod identity;
pub mod message;
pub mod mock_transport;
pub mod transport;

// Re-export main types
pub use error::*;
pub use identity::*;
pub use message::*;
pub use mock_transport::*;
pub use transport::*;
