// crates/bastion-core/src/address.rs
//
// Account/operator addresses, consensus addresses, and the string codec.
//
// Both address kinds are fixed 20-byte identifiers. Fixed width keeps every
// composite store key (delegator | validator | ...) unambiguous without
// length prefixes. Human-readable encoding is delegated to an
// `AddressCodec` so the engine never depends on a particular string format.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BastionError;

/// Width in bytes of every address handled by the engine.
pub const ADDRESS_LEN: usize = 20;

/// Account address. Used for delegators and validator operators alike, so a
/// delegation is a self-delegation exactly when the two addresses are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Build an address from a byte slice that must be exactly `ADDRESS_LEN` long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, BastionError> {
        let arr: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            BastionError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Consensus address: the 20-byte digest of a validator's consensus public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConsAddress(pub [u8; ADDRESS_LEN]);

impl ConsAddress {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, BastionError> {
        Address::from_slice(bytes).map(|a| Self(a.0))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ConsAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Bidirectional conversion between address bytes and their string form.
pub trait AddressCodec: Send + Sync {
    /// Render address bytes as a string.
    fn encode(&self, bytes: &[u8]) -> String;

    /// Parse a string back into address bytes.
    fn decode(&self, text: &str) -> Result<Vec<u8>, BastionError>;

    /// Decode a string straight into an `Address`.
    fn decode_address(&self, text: &str) -> Result<Address, BastionError> {
        let bytes = self.decode(text)?;
        Address::from_slice(&bytes)
    }
}

/// Prefixed lowercase-hex codec, e.g. `bstn1` + 40 hex characters.
#[derive(Debug, Clone)]
pub struct HexCodec {
    prefix: String,
}

impl HexCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for HexCodec {
    fn default() -> Self {
        Self::new("bstn1")
    }
}

impl AddressCodec for HexCodec {
    fn encode(&self, bytes: &[u8]) -> String {
        format!("{}{}", self.prefix, hex::encode(bytes))
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>, BastionError> {
        let body = text.strip_prefix(self.prefix.as_str()).ok_or_else(|| {
            BastionError::InvalidAddress(format!(
                "address {} does not start with prefix {}",
                text, self.prefix
            ))
        })?;
        if body.is_empty() {
            return Err(BastionError::InvalidAddress("empty address".to_string()));
        }
        Ok(hex::decode(body)?)
    }
}
