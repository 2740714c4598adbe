//! Command-line node for the delegated routing proxy
//!
//! Binds an iroh endpoint, builds a [`StandardProxy`](delegate_proxy::StandardProxy)
//! over the configured delegates and forwards one message per invocation, or
//! stays up to turn away inbound routing streams.

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Command, MessageArgs};
pub use config::{ConfigError, NodeConfig};
