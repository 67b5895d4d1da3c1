//! Crypto primitives (spec §4.1): keypair derivation, sign, recover, sha256.
//!
//! Signature scheme is ECDSA over secp256k1 with public-key recovery
//! (`k256`), because the chain-visible contract is `recover(signature,
//! message) -> address` with no separate public-key parameter — a
//! recoverable signature carries exactly the bit this interface needs.
//! `sign`/`recover` use the "defunct"/personal-message envelope from
//! spec §4.1 so the digest that gets signed is domain-separated from a raw
//! transaction hash.

use crate::address::Address;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub type PrivateKey = [u8; 32];

/// A 65-byte `r || s || recovery_id` signature, hex-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sig(pub Vec<u8>);

impl Serialize for Sig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for Sig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let hex_part = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(hex_part).map_err(serde::de::Error::custom)?;
        Ok(Sig(bytes))
    }
}

/// (De)serializes `Option<PrivateKey>` as `""` for contracts/remote
/// accounts and `"0x" + 64 hex chars` for locally held keys, matching the
/// snapshot file's `private_key` field (spec §6).
pub mod private_key_hex {
    use super::PrivateKey;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(key: &Option<PrivateKey>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match key {
            Some(k) => serializer.serialize_str(&format!("0x{}", hex::encode(k))),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<PrivateKey>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(None);
        }
        let hex_part = s.strip_prefix("0x").ok_or_else(|| serde::de::Error::custom("private key must start with 0x"))?;
        let bytes = hex::decode(hex_part).map_err(serde::de::Error::custom)?;
        if bytes.len() != 32 {
            return Err(serde::de::Error::custom("private key must be 32 bytes"));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Some(out))
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CryptoError {
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature recovery failed")]
    RecoveryFailed,
}

/// SHA-256 digest of `bytes`.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// The domain-separated digest that is actually signed: the "personal
/// message" envelope `"\x19Ethereum Signed Message:\n" || len(message) ||
/// message`, then SHA-256'd. Signing and recovery must use the same
/// envelope.
fn defunct_digest(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut buf = Vec::with_capacity(prefix.len() + message.len());
    buf.extend_from_slice(prefix.as_bytes());
    buf.extend_from_slice(message);
    sha256(&buf)
}

/// Last 20 bytes of `sha256(uncompressed public key bytes)`, the
/// deterministic public-key-to-address function spec §4.1 leaves
/// unspecified beyond "deterministic".
fn address_from_verifying_key(vk: &VerifyingKey) -> Address {
    let encoded = vk.to_encoded_point(false);
    let digest = sha256(encoded.as_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..32]);
    Address::from_bytes(bytes)
}

/// Deterministically derives the address controlled by `private_key`.
pub fn derive_address(private_key: &PrivateKey) -> Result<Address, CryptoError> {
    let signing_key = SigningKey::from_bytes(private_key.into())
        .map_err(|_| CryptoError::InvalidPrivateKey)?;
    let verifying_key = VerifyingKey::from(&signing_key);
    Ok(address_from_verifying_key(&verifying_key))
}

/// Signs `message` with `private_key` under the defunct envelope, returning
/// a recoverable signature.
pub fn sign(private_key: &PrivateKey, message: &[u8]) -> Result<Sig, CryptoError> {
    let signing_key = SigningKey::from_bytes(private_key.into())
        .map_err(|_| CryptoError::InvalidPrivateKey)?;
    let digest = defunct_digest(message);
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(&digest)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(recovery_id.to_byte());
    Ok(Sig(bytes))
}

/// Recovers the address that would sign `message` to produce `signature`.
/// Returns `Err` on any malformed input or recovery failure — callers at
/// the transaction boundary (`Transaction::verify_signature`) turn this
/// into a plain `false`, never propagating past it (spec §4.2).
pub fn recover(signature: &Sig, message: &[u8]) -> Result<Address, CryptoError> {
    if signature.0.len() != 65 {
        return Err(CryptoError::MalformedSignature);
    }
    let sig = Signature::from_slice(&signature.0[..64])
        .map_err(|_| CryptoError::MalformedSignature)?;
    let recovery_id = RecoveryId::from_byte(signature.0[64])
        .ok_or(CryptoError::MalformedSignature)?;
    let digest = defunct_digest(message);
    let verifying_key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(address_from_verifying_key(&verifying_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PrivateKey {
        let mut k = [0u8; 32];
        k[31] = byte;
        k
    }

    #[test]
    fn sign_then_recover_matches_derived_address() {
        let pk = key(1);
        let addr = derive_address(&pk).unwrap();
        let msg = b"hello chain";
        let sig = sign(&pk, msg).unwrap();
        let recovered = recover(&sig, msg).unwrap();
        assert_eq!(recovered, addr);
    }

    #[test]
    fn flipping_a_signature_byte_breaks_recovery_or_changes_address() {
        let pk = key(7);
        let addr = derive_address(&pk).unwrap();
        let msg = b"some payload";
        let mut sig = sign(&pk, msg).unwrap();
        sig.0[0] ^= 0xFF;
        let outcome = recover(&sig, msg);
        assert!(outcome.is_err() || outcome.unwrap() != addr);
    }

    #[test]
    fn flipping_the_message_breaks_recovery() {
        let pk = key(9);
        let addr = derive_address(&pk).unwrap();
        let sig = sign(&pk, b"original").unwrap();
        let outcome = recover(&sig, b"tampered");
        assert!(outcome.is_err() || outcome.unwrap() != addr);
    }

    #[test]
    fn sha256_is_stable() {
        assert_eq!(sha256(b"abc"), sha256(b"abc"));
        assert_ne!(sha256(b"abc"), sha256(b"abd"));
    }
}
