// crates/bastion-core/src/error.rs

use thiserror::Error;

/// Infrastructure-level error types shared by every Bastion crate.
#[derive(Debug, Error)]
pub enum BastionError {
    /// Storage layer error (in-memory store, RocksDB).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cryptographic error (malformed key, bad signature encoding).
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An address string or byte slice could not be decoded.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid state transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for BastionError {
    fn from(e: serde_json::Error) -> Self {
        BastionError::Serialization(e.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for BastionError {
    fn from(e: ed25519_dalek::SignatureError) -> Self {
        BastionError::Crypto(e.to_string())
    }
}

impl From<hex::FromHexError> for BastionError {
    fn from(e: hex::FromHexError) -> Self {
        BastionError::InvalidAddress(e.to_string())
    }
}
