//! Ledger identities: accounts, mints and programs.

use bincode::{Decode, Encode};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::IdentityError;

/// A 32-byte ledger identity.
///
/// Rendered as base58. Parsing also accepts `0x`-prefixed hex.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct Identity([u8; 32]);

impl Identity {
    pub const LEN: usize = 32;

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministic identity from a human label (SHA-256 of the label).
    pub fn hashed(label: &str) -> Self {
        Self(Sha256::digest(label.as_bytes()).into())
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for Identity {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Identity {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Identity {
    type Error = IdentityError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl std::str::FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdentityError::EmptyIdentity);
        }
        let bytes = match s.strip_prefix("0x") {
            Some(h) => hex::decode(h)?,
            None => bs58::decode(s).into_vec()?,
        };
        Self::try_from(bytes.as_slice())
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Identity({})", self)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use core::str::FromStr as _;

    use super::*;

    #[test]
    fn base58_round_trip() {
        let id = Identity::hashed("initializer");
        let parsed = Identity::from_str(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parses_hex() {
        let hex_str = format!("0x{}", "ab".repeat(32));
        let id = Identity::from_str(&hex_str).unwrap();
        assert_eq!(id.to_bytes(), [0xab; 32]);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(Identity::from_str(""), Err(IdentityError::EmptyIdentity));
        assert_eq!(
            Identity::from_str("0xdeadbeef"),
            Err(IdentityError::InvalidLength(4))
        );
        assert!(matches!(
            Identity::from_str("0OIl"),
            Err(IdentityError::Base58(_))
        ));
    }

    #[test]
    fn json_is_a_string() {
        let id = Identity::hashed("mint");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
