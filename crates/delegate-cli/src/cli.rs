use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use delegate_core::{MessageType, PeerRecord, Record, RoutingMessage};

#[derive(Debug, Parser)]
#[command(name = "delegate", about = "Forward routing queries to trusted delegate peers")]
pub struct Cli {
    /// Node configuration file (TOML)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Human-readable log output instead of JSONL
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print this node's identity
    Id,
    /// Deliver a message to one delegate without waiting for a reply
    Send(MessageArgs),
    /// Send a query to one delegate and print its reply
    Request {
        #[command(flatten)]
        message: MessageArgs,
        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Stay online, turning away inbound routing streams, until Ctrl-C
    Serve,
}

#[derive(Debug, Clone, Args)]
pub struct MessageArgs {
    /// Message type (put-value, get-value, add-provider, get-providers, find-node, ping)
    #[arg(long, default_value = "ping")]
    pub kind: MessageType,
    /// Key the message is about
    #[arg(long, default_value = "")]
    pub key: String,
    /// Value to store (put-value only)
    #[arg(long)]
    pub value: Option<String>,
}

impl MessageArgs {
    /// Build the routing message; `local` is announced as provider for add-provider
    pub fn to_message(&self, local: &[u8]) -> RoutingMessage {
        let key = self.key.as_bytes().to_vec();
        match self.kind {
            MessageType::PutValue => RoutingMessage::put_value(Record::new(
                key,
                self.value.clone().unwrap_or_default().into_bytes(),
            )),
            MessageType::AddProvider => {
                RoutingMessage::add_provider(key, PeerRecord::new(local.to_vec()))
            }
            kind => RoutingMessage::new(kind, key),
        }
    }
}
