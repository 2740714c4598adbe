//! Routing message record
//!
//! The forwarding engine treats messages as opaque: anything that is
//! `Serialize + DeserializeOwned` can be forwarded. [`RoutingMessage`] is the
//! record exchanged with delegates in practice: a provider/value/peer query
//! in the shape the content routing protocol uses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of routing query or announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Store a value record under a key
    PutValue,
    /// Fetch the value record for a key
    GetValue,
    /// Announce that a peer provides some content
    AddProvider,
    /// Ask who provides some content
    GetProviders,
    /// Ask for the peers closest to a key
    FindNode,
    /// Liveness check
    Ping,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::PutValue => "put-value",
            MessageType::GetValue => "get-value",
            MessageType::AddProvider => "add-provider",
            MessageType::GetProviders => "get-providers",
            MessageType::FindNode => "find-node",
            MessageType::Ping => "ping",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "put-value" => Ok(MessageType::PutValue),
            "get-value" => Ok(MessageType::GetValue),
            "add-provider" => Ok(MessageType::AddProvider),
            "get-providers" => Ok(MessageType::GetProviders),
            "find-node" => Ok(MessageType::FindNode),
            "ping" => Ok(MessageType::Ping),
            other => Err(format!("unknown message type: {}", other)),
        }
    }
}

/// Connectivity of a peer as seen by the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// Sender has no connection to the peer
    #[default]
    NotConnected,
    /// Sender is connected to the peer
    Connected,
    /// Sender was recently connected
    CanConnect,
    /// Sender recently failed to connect
    CannotConnect,
}

/// A peer reference carried inside a routing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Raw peer identifier bytes
    pub id: Vec<u8>,
    /// Encoded addresses the peer can be reached at
    pub addrs: Vec<Vec<u8>>,
    /// Sender's connectivity to this peer
    pub connection: ConnectionKind,
}

impl PeerRecord {
    pub fn new(id: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            addrs: Vec::new(),
            connection: ConnectionKind::default(),
        }
    }

    /// Add a reachable address
    pub fn with_addr(mut self, addr: impl Into<Vec<u8>>) -> Self {
        self.addrs.push(addr.into());
        self
    }

    /// Set the sender's connectivity to this peer
    pub fn with_connection(mut self, connection: ConnectionKind) -> Self {
        self.connection = connection;
        self
    }
}

/// A value record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Identifier of the record author
    pub author: Option<Vec<u8>>,
    /// Author's signature over key and value
    pub signature: Option<Vec<u8>>,
    /// When the record was received (RFC 3339)
    pub time_received: Option<String>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            author: None,
            signature: None,
            time_received: None,
        }
    }
}

/// A routing query, announcement, or reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingMessage {
    pub message_type: MessageType,
    /// Key the message is about (content identifier, record key, peer id)
    pub key: Vec<u8>,
    /// Value record, for put/get value
    pub record: Option<Record>,
    /// Peers closer to the key than the responder
    pub closer_peers: Vec<PeerRecord>,
    /// Peers providing the content named by the key
    pub provider_peers: Vec<PeerRecord>,
    /// Routing cluster level hint
    pub cluster_level: i32,
}

impl RoutingMessage {
    pub fn new(message_type: MessageType, key: impl Into<Vec<u8>>) -> Self {
        Self {
            message_type,
            key: key.into(),
            record: None,
            closer_peers: Vec::new(),
            provider_peers: Vec::new(),
            cluster_level: 0,
        }
    }

    pub fn ping() -> Self {
        Self::new(MessageType::Ping, Vec::new())
    }

    pub fn find_node(key: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageType::FindNode, key)
    }

    pub fn get_providers(key: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageType::GetProviders, key)
    }

    pub fn add_provider(key: impl Into<Vec<u8>>, provider: PeerRecord) -> Self {
        Self::new(MessageType::AddProvider, key).with_provider_peers(vec![provider])
    }

    pub fn get_value(key: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageType::GetValue, key)
    }

    pub fn put_value(record: Record) -> Self {
        let key = record.key.clone();
        Self::new(MessageType::PutValue, key).with_record(record)
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_closer_peers(mut self, peers: Vec<PeerRecord>) -> Self {
        self.closer_peers = peers;
        self
    }

    pub fn with_provider_peers(mut self, peers: Vec<PeerRecord>) -> Self {
        self.provider_peers = peers;
        self
    }

    pub fn with_cluster_level(mut self, level: i32) -> Self {
        self.cluster_level = level;
        self
    }
}

impl fmt::Display for RoutingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, closer={}, providers={})",
            self.message_type,
            hex::encode(&self.key),
            self.closer_peers.len(),
            self.provider_peers.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_parse() {
        for ty in [
            MessageType::PutValue,
            MessageType::GetValue,
            MessageType::AddProvider,
            MessageType::GetProviders,
            MessageType::FindNode,
            MessageType::Ping,
        ] {
            assert_eq!(ty.to_string().parse::<MessageType>().unwrap(), ty);
        }
        assert!("lookup".parse::<MessageType>().is_err());
    }

    #[test]
    fn test_builders() {
        let provider = PeerRecord::new(vec![7u8; 4])
            .with_addr(b"/ip4/10.0.0.1/udp/4001".to_vec())
            .with_connection(ConnectionKind::Connected);
        let msg = RoutingMessage::add_provider(b"cid".to_vec(), provider.clone());

        assert_eq!(msg.message_type, MessageType::AddProvider);
        assert_eq!(msg.provider_peers, vec![provider]);
        assert!(msg.record.is_none());

        let put = RoutingMessage::put_value(Record::new(b"k".to_vec(), b"v".to_vec()));
        assert_eq!(put.key, b"k".to_vec());
        assert_eq!(put.record.unwrap().value, b"v".to_vec());
    }

    #[test]
    fn test_postcard_encoding() {
        let msg = RoutingMessage::get_providers(b"QmHash".to_vec()).with_cluster_level(3);
        let bytes = postcard::to_allocvec(&msg).unwrap();
        let decoded: RoutingMessage = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_display_is_compact() {
        let msg = RoutingMessage::find_node(vec![0xab, 0xcd]);
        assert_eq!(msg.to_string(), "find-node(abcd, closer=0, providers=0)");
    }
}
