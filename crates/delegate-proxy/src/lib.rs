//! # Delegate Proxy
//!
//! Forwarding engine for delegated routing.
//!
//! A node that does not take part in the routing protocol itself hands each
//! routing message to one of a fixed set of trusted delegates. For every
//! call the engine shuffles the pool, tries the remotes one at a time and
//! returns the first successful result. Nothing is cached and no remote is
//! ever remembered as good or bad between calls.
//!
//! ## Example
//!
//! ```ignore
//! use delegate_proxy::{CallContext, RoutingProxy, StandardProxy};
//!
//! let proxy = StandardProxy::new(host, remotes);
//! let reply = proxy
//!     .send_request(&CallContext::with_timeout(timeout), &RoutingMessage::find_node(key))
//!     .await?;
//! ```
//!
//! ## Wire Format
//!
//! Each message is a single frame: an unsigned LEB128 length followed by the
//! postcard-encoded message. See [`protocol`].

pub mod config;
pub mod context;
pub mod error;
pub mod protocol;
pub mod proxy;
pub mod trace;

pub use config::{ConfigError, ProxyConfig};
pub use context::CallContext;
pub use error::{AttemptError, ErrorKind, ExhaustedError, FailedAttempt, ProxyError, ProxyResult};
pub use protocol::{DEFAULT_MAX_MESSAGE_SIZE, FramingError, PROTOCOL_ID};
pub use proxy::{RoutingProxy, StandardProxy};
pub use trace::{AttemptEvent, LogTracer, NoopTracer, RecordedEvent, RecordingTracer, TraceSpan, Tracer};
