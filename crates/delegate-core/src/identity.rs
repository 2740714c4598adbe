//! Peer identity abstractions
//!
//! The proxy never looks inside a peer identifier; it only compares,
//! hashes, logs and hands them to the [`Host`](crate::Host). Two
//! implementations exist:
//!
//! - `SimulationIdentity`: Single-letter identity for tests ('A'..'Z')
//! - `IrohIdentity`: Ed25519 public key identity (in delegate-transport)

use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::IdentityError;

/// Trait for peer identity abstraction
pub trait PeerIdentity:
    Clone + Eq + Hash + Send + Sync + Debug + Display + Serialize + DeserializeOwned + 'static
{
    /// Get the identity as bytes
    fn as_bytes(&self) -> Vec<u8>;

    /// Create an identity from bytes
    fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError>;

    /// Get a short display form (for logging)
    fn short_id(&self) -> String {
        format!("{}", self)
    }

    /// Unabbreviated textual form; distinct identities never share one
    fn full_id(&self) -> String {
        format!("{}", self)
    }

    /// Hex encoding of the raw identity bytes
    fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

/// Simple character-based identity for simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimulationIdentity(pub char);

impl SimulationIdentity {
    /// Create a new simulation identity from a capital letter
    pub fn new(c: char) -> Option<Self> {
        if c.is_ascii_uppercase() {
            Some(Self(c))
        } else {
            None
        }
    }

    /// Generate all identities from 'A' to the given letter (inclusive)
    pub fn range_to(end: char) -> Vec<Self> {
        ('A'..=end).filter_map(Self::new).collect()
    }

    /// Get the underlying character
    pub fn as_char(&self) -> char {
        self.0
    }
}

impl Display for SimulationIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PeerIdentity for SimulationIdentity {
    fn as_bytes(&self) -> Vec<u8> {
        vec![self.0 as u8]
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        if bytes.len() != 1 {
            return Err(IdentityError::InvalidKeyLength {
                expected: 1,
                actual: bytes.len(),
            });
        }
        let c = bytes[0] as char;
        Self::new(c).ok_or_else(|| {
            IdentityError::InvalidFormat(format!("Invalid simulation identity: {}", c))
        })
    }

    fn short_id(&self) -> String {
        self.0.to_string()
    }
}
