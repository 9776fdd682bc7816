// crates/bastion-core/src/crypto.rs
//
// Consensus public keys and hashing helpers.
//
// A consensus key is a tagged variant over the supported algorithms. Each
// variant exposes the same capabilities: a type tag (checked against the
// chain's allow-list), consensus address derivation, and signature
// verification. Dispatch is by tag; there is no open-ended key trait.
//
// Address derivation:
//   - ed25519, secp256r1:  sha256(pubkey)[..20]
//   - secp256k1:           ripemd160(sha256(pubkey))
//   - multisig:            sha256(threshold || tagged member keys)[..20]

use std::fmt;

use ed25519_dalek::{SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::{ConsAddress, ADDRESS_LEN};
use crate::error::BastionError;

/// Length of an ed25519 public key.
pub const ED25519_PUBKEY_LEN: usize = 32;

/// Length of a SEC1-compressed secp256k1 / secp256r1 public key.
pub const COMPRESSED_EC_PUBKEY_LEN: usize = 33;

/// Algorithm tag of a consensus public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PubKeyType {
    Ed25519,
    Secp256k1,
    Secp256r1,
    Multisig,
}

impl PubKeyType {
    /// Parse the lowercase tag used in configuration files.
    pub fn parse(tag: &str) -> Result<Self, BastionError> {
        match tag {
            "ed25519" => Ok(Self::Ed25519),
            "secp256k1" => Ok(Self::Secp256k1),
            "secp256r1" => Ok(Self::Secp256r1),
            "multisig" => Ok(Self::Multisig),
            other => Err(BastionError::Crypto(format!("unknown key type {}", other))),
        }
    }

    fn tag_byte(&self) -> u8 {
        match self {
            Self::Ed25519 => 0x01,
            Self::Secp256k1 => 0x02,
            Self::Secp256r1 => 0x03,
            Self::Multisig => 0x04,
        }
    }
}

impl fmt::Display for PubKeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ed25519 => "ed25519",
            Self::Secp256k1 => "secp256k1",
            Self::Secp256r1 => "secp256r1",
            Self::Multisig => "multisig",
        };
        f.write_str(s)
    }
}

/// A validator's consensus public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsensusPubKey {
    Ed25519(Vec<u8>),
    Secp256k1(Vec<u8>),
    Secp256r1(Vec<u8>),
    Multisig {
        threshold: u32,
        keys: Vec<ConsensusPubKey>,
    },
}

impl ConsensusPubKey {
    /// Wrap a raw ed25519 public key.
    pub fn ed25519(bytes: [u8; ED25519_PUBKEY_LEN]) -> Self {
        Self::Ed25519(bytes.to_vec())
    }

    /// Build a single-algorithm key from its tag and raw bytes, validating the
    /// encoding. Multisig keys must be built with [`ConsensusPubKey::multisig`].
    pub fn from_type_and_bytes(key_type: PubKeyType, bytes: &[u8]) -> Result<Self, BastionError> {
        match key_type {
            PubKeyType::Ed25519 => {
                let arr: [u8; ED25519_PUBKEY_LEN] = bytes.try_into().map_err(|_| {
                    BastionError::Crypto(format!(
                        "ed25519 key must be {} bytes, got {}",
                        ED25519_PUBKEY_LEN,
                        bytes.len()
                    ))
                })?;
                VerifyingKey::from_bytes(&arr)?;
                Ok(Self::Ed25519(bytes.to_vec()))
            }
            PubKeyType::Secp256k1 => {
                check_compressed_len(key_type, bytes)?;
                k256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                    .map_err(|e| BastionError::Crypto(format!("invalid secp256k1 key: {}", e)))?;
                Ok(Self::Secp256k1(bytes.to_vec()))
            }
            PubKeyType::Secp256r1 => {
                check_compressed_len(key_type, bytes)?;
                p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                    .map_err(|e| BastionError::Crypto(format!("invalid secp256r1 key: {}", e)))?;
                Ok(Self::Secp256r1(bytes.to_vec()))
            }
            PubKeyType::Multisig => Err(BastionError::Crypto(
                "multisig keys are built from member keys, not raw bytes".to_string(),
            )),
        }
    }

    /// Build a threshold multisig key. Members may not themselves be multisig.
    pub fn multisig(threshold: u32, keys: Vec<ConsensusPubKey>) -> Result<Self, BastionError> {
        if threshold == 0 || threshold as usize > keys.len() {
            return Err(BastionError::Crypto(format!(
                "multisig threshold {} out of range for {} keys",
                threshold,
                keys.len()
            )));
        }
        if keys.iter().any(|k| k.key_type() == PubKeyType::Multisig) {
            return Err(BastionError::Crypto(
                "nested multisig keys are not supported".to_string(),
            ));
        }
        Ok(Self::Multisig { threshold, keys })
    }

    /// The algorithm tag used for allow-listing.
    pub fn key_type(&self) -> PubKeyType {
        match self {
            Self::Ed25519(_) => PubKeyType::Ed25519,
            Self::Secp256k1(_) => PubKeyType::Secp256k1,
            Self::Secp256r1(_) => PubKeyType::Secp256r1,
            Self::Multisig { .. } => PubKeyType::Multisig,
        }
    }

    /// Canonical byte encoding: raw key bytes, or for multisig the threshold
    /// followed by each member's tag and bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(b) | Self::Secp256k1(b) | Self::Secp256r1(b) => b.clone(),
            Self::Multisig { threshold, keys } => {
                let mut out = threshold.to_be_bytes().to_vec();
                for key in keys {
                    out.push(key.key_type().tag_byte());
                    out.extend_from_slice(&key.to_bytes());
                }
                out
            }
        }
    }

    /// Derive the consensus address of this key.
    pub fn address(&self) -> ConsAddress {
        let mut out = [0u8; ADDRESS_LEN];
        match self {
            Self::Secp256k1(bytes) => {
                let sha = Sha256::digest(bytes);
                let rip = Ripemd160::digest(sha);
                out.copy_from_slice(&rip[..ADDRESS_LEN]);
            }
            _ => {
                let hash = hash_bytes(&self.to_bytes());
                out.copy_from_slice(&hash[..ADDRESS_LEN]);
            }
        }
        ConsAddress(out)
    }

    /// Verify a single signature over `message`.
    ///
    /// ed25519 expects a 64-byte signature; secp256k1/secp256r1 expect a
    /// 64-byte `r || s` ECDSA signature over sha256(message). Multisig keys
    /// must use [`ConsensusPubKey::verify_multisig`].
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool, BastionError> {
        match self {
            Self::Ed25519(bytes) => {
                let arr: [u8; ED25519_PUBKEY_LEN] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| BastionError::Crypto("corrupt ed25519 key".to_string()))?;
                verify_signature(&arr, message, signature)
            }
            Self::Secp256k1(bytes) => {
                use k256::ecdsa::signature::Verifier as _;
                let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                    .map_err(|e| BastionError::Crypto(e.to_string()))?;
                let sig = k256::ecdsa::Signature::from_slice(signature)
                    .map_err(|e| BastionError::Crypto(e.to_string()))?;
                Ok(key.verify(message, &sig).is_ok())
            }
            Self::Secp256r1(bytes) => {
                use p256::ecdsa::signature::Verifier as _;
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                    .map_err(|e| BastionError::Crypto(e.to_string()))?;
                let sig = p256::ecdsa::Signature::from_slice(signature)
                    .map_err(|e| BastionError::Crypto(e.to_string()))?;
                Ok(key.verify(message, &sig).is_ok())
            }
            Self::Multisig { .. } => Err(BastionError::Crypto(
                "multisig keys require one optional signature per member".to_string(),
            )),
        }
    }

    /// Verify a multisig: `signatures[i]` is member `i`'s signature, if any.
    /// Succeeds when at least `threshold` members signed validly.
    pub fn verify_multisig(
        &self,
        message: &[u8],
        signatures: &[Option<Vec<u8>>],
    ) -> Result<bool, BastionError> {
        let (threshold, keys) = match self {
            Self::Multisig { threshold, keys } => (*threshold, keys),
            _ => return Err(BastionError::Crypto("not a multisig key".to_string())),
        };
        if signatures.len() != keys.len() {
            return Err(BastionError::Crypto(format!(
                "expected {} signature slots, got {}",
                keys.len(),
                signatures.len()
            )));
        }
        let mut valid = 0u32;
        for (key, sig) in keys.iter().zip(signatures) {
            if let Some(sig) = sig {
                if key.verify(message, sig)? {
                    valid += 1;
                }
            }
        }
        Ok(valid >= threshold)
    }
}

impl fmt::Display for ConsensusPubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key_type(), hex::encode(self.to_bytes()))
    }
}

fn check_compressed_len(key_type: PubKeyType, bytes: &[u8]) -> Result<(), BastionError> {
    if bytes.len() != COMPRESSED_EC_PUBKEY_LEN {
        return Err(BastionError::Crypto(format!(
            "{} key must be {} bytes, got {}",
            key_type,
            COMPRESSED_EC_PUBKEY_LEN,
            bytes.len()
        )));
    }
    Ok(())
}

/// An ed25519 keypair, used for development keys and tests.
pub struct Keypair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl Keypair {
    /// Generate a new random ed25519 keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Keypair {
            signing_key,
            verifying_key,
        }
    }

    /// Get the public key bytes (32 bytes).
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// The consensus key wrapping this keypair's public half.
    pub fn consensus_pubkey(&self) -> ConsensusPubKey {
        ConsensusPubKey::ed25519(self.public_key_bytes())
    }

    /// Sign a message and return the signature bytes.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        use ed25519_dalek::Signer;
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

/// Verify an ed25519 signature.
///
/// Returns `true` if the signature is valid for the given message and public key.
pub fn verify_signature(
    public_key_bytes: &[u8; 32],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<bool, BastionError> {
    let verifying_key = VerifyingKey::from_bytes(public_key_bytes)
        .map_err(|e| BastionError::Crypto(format!("Invalid public key: {}", e)))?;

    let signature_array: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| BastionError::Crypto("Signature must be exactly 64 bytes".to_string()))?;

    let signature = ed25519_dalek::Signature::from_bytes(&signature_array);

    Ok(verifying_key.verify(message, &signature).is_ok())
}

/// Compute SHA-256 hash of the given bytes.
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ed25519_sign_verify() {
        let keypair = Keypair::generate();
        let key = keypair.consensus_pubkey();
        let message = b"block 42";

        let signature = keypair.sign(message);
        assert!(key.verify(message, &signature).unwrap());
        assert!(!key.verify(b"block 43", &signature).unwrap());
    }

    #[test]
    fn test_ed25519_address_is_sha256_prefix() {
        let keypair = Keypair::generate();
        let key = keypair.consensus_pubkey();
        let hash = hash_bytes(&keypair.public_key_bytes());
        assert_eq!(key.address().0[..], hash[..ADDRESS_LEN]);
    }

    #[test]
    fn test_secp256k1_sign_verify() {
        use k256::ecdsa::{signature::Signer, Signature, SigningKey};
        let signing = SigningKey::random(&mut OsRng);
        let encoded = signing.verifying_key().to_encoded_point(true);
        let key =
            ConsensusPubKey::from_type_and_bytes(PubKeyType::Secp256k1, encoded.as_bytes()).unwrap();
        let sig: Signature = signing.sign(b"vote");
        assert!(key.verify(b"vote", &sig.to_bytes()).unwrap());
        assert!(!key.verify(b"other", &sig.to_bytes()).unwrap());
    }

    #[test]
    fn test_secp256r1_sign_verify() {
        use p256::ecdsa::{signature::Signer, Signature, SigningKey};
        let signing = SigningKey::random(&mut OsRng);
        let encoded = signing.verifying_key().to_encoded_point(true);
        let key =
            ConsensusPubKey::from_type_and_bytes(PubKeyType::Secp256r1, encoded.as_bytes()).unwrap();
        let sig: Signature = signing.sign(b"vote");
        assert!(key.verify(b"vote", &sig.to_bytes()).unwrap());
    }

    #[test]
    fn test_rejects_malformed_keys() {
        assert!(ConsensusPubKey::from_type_and_bytes(PubKeyType::Ed25519, &[1u8; 31]).is_err());
        assert!(ConsensusPubKey::from_type_and_bytes(PubKeyType::Secp256k1, &[0u8; 33]).is_err());
        assert!(ConsensusPubKey::from_type_and_bytes(PubKeyType::Multisig, &[]).is_err());
    }

    #[test]
    fn test_multisig_threshold() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let c = Keypair::generate();
        let key = ConsensusPubKey::multisig(
            2,
            vec![a.consensus_pubkey(), b.consensus_pubkey(), c.consensus_pubkey()],
        )
        .unwrap();
        let msg = b"commit";

        let one = vec![Some(a.sign(msg)), None, None];
        assert!(!key.verify_multisig(msg, &one).unwrap());

        let two = vec![Some(a.sign(msg)), None, Some(c.sign(msg))];
        assert!(key.verify_multisig(msg, &two).unwrap());
        assert!(key.verify(msg, &a.sign(msg)).is_err());
    }

    #[test]
    fn test_multisig_threshold_bounds() {
        let a = Keypair::generate();
        assert!(ConsensusPubKey::multisig(0, vec![a.consensus_pubkey()]).is_err());
        assert!(ConsensusPubKey::multisig(2, vec![a.consensus_pubkey()]).is_err());
    }

    #[test]
    fn test_distinct_keys_distinct_addresses() {
        let a = Keypair::generate().consensus_pubkey();
        let b = Keypair::generate().consensus_pubkey();
        assert_ne!(a.address(), b.address());
        assert_eq!(a.address(), a.clone().address());
    }

    #[test]
    fn test_hash_bytes() {
        let hash = hash_bytes(b"bastion");
        assert_eq!(hash, hash_bytes(b"bastion"));
        assert_ne!(hash, hash_bytes(b"different"));
    }
}
