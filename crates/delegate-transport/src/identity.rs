//! Iroh-based peer identity implementation
//!
//! Wraps iroh's `PublicKey` to implement the `PeerIdentity` trait.

use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use iroh::PublicKey;
use serde::{Deserialize, Serialize};

use delegate_core::error::IdentityError;
use delegate_core::identity::PeerIdentity;

/// Peer identity based on iroh's Ed25519 public key
///
/// `Display` gives the short form used in logs. Use
/// [`IrohIdentity::to_key_string`] for the full key that [`FromStr`] accepts.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IrohIdentity(pub(crate) PublicKey);

impl IrohIdentity {
    pub fn new(public_key: PublicKey) -> Self {
        Self(public_key)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }

    /// Create from a 32-byte array
    pub fn from_array(bytes: [u8; 32]) -> Result<Self, IdentityError> {
        PublicKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|e| IdentityError::InvalidFormat(e.to_string()))
    }

    /// Full textual form of the key
    pub fn to_key_string(&self) -> String {
        self.0.to_string()
    }
}

impl PeerIdentity for IrohIdentity {
    fn as_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Self::from_array(arr)
    }

    fn short_id(&self) -> String {
        self.0.fmt_short().to_string()
    }

    fn full_id(&self) -> String {
        self.to_key_string()
    }
}

impl FromStr for IrohIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<PublicKey>()
            .map(Self)
            .map_err(|e| IdentityError::InvalidFormat(format!("{s:?}: {e}")))
    }
}

impl Debug for IrohIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IrohIdentity({})", self.0.fmt_short())
    }
}

impl Display for IrohIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.fmt_short())
    }
}

impl Hash for IrohIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_bytes().hash(state);
    }
}

impl Serialize for IrohIdentity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(self.0.as_bytes())
    }
}

impl<'de> Deserialize<'de> for IrohIdentity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

impl From<PublicKey> for IrohIdentity {
    fn from(key: PublicKey) -> Self {
        Self(key)
    }
}

impl From<IrohIdentity> for PublicKey {
    fn from(id: IrohIdentity) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iroh::SecretKey;

    fn random_id() -> IrohIdentity {
        IrohIdentity::new(SecretKey::generate(&mut rand::rng()).public())
    }

    #[test]
    fn test_iroh_identity_bytes() {
        let id = random_id();
        let recovered = IrohIdentity::from_bytes(&id.as_bytes()).unwrap();
        assert_eq!(id, recovered);
        assert_eq!(id.to_hex().len(), 64);
    }

    #[test]
    fn test_iroh_identity_serde() {
        let id = random_id();
        let bytes = postcard::to_allocvec(&id).unwrap();
        let recovered: IrohIdentity = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_iroh_identity_parse() {
        let id = random_id();
        let parsed: IrohIdentity = id.to_key_string().parse().unwrap();
        assert_eq!(parsed, id);

        // Short form is for logs only
        assert!(id.to_string().len() < id.to_key_string().len());
        assert!(matches!(
            "not-a-key".parse::<IrohIdentity>(),
            Err(IdentityError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_full_id_round_trips() {
        let id = random_id();
        assert_eq!(id.full_id(), id.to_key_string());
        assert_ne!(id.full_id(), id.short_id());
        assert_eq!(id.full_id().parse::<IrohIdentity>().unwrap(), id);
    }

    #[test]
    fn test_invalid_key_length() {
        match IrohIdentity::from_bytes(&[0u8; 16]) {
            Err(IdentityError::InvalidKeyLength { expected, actual }) => {
                assert_eq!(expected, 32);
                assert_eq!(actual, 16);
            }
            other => panic!("Expected InvalidKeyLength error, got {other:?}"),
        }
        assert!(IrohIdentity::from_bytes(&[]).is_err());
        assert!(IrohIdentity::from_bytes(&[0u8; 64]).is_err());
    }

    #[test]
    fn test_identity_hash() {
        use std::collections::HashSet;

        let secret = SecretKey::generate(&mut rand::rng());
        let id1 = IrohIdentity::new(secret.public());
        let id1_clone = IrohIdentity::new(secret.public());
        let id2 = random_id();

        let mut set = HashSet::new();
        set.insert(id1);
        set.insert(id2);
        set.insert(id1_clone);

        assert_eq!(set.len(), 2);
        assert_eq!(*id1.public_key(), secret.public());
    }
}
