//! Conversion of Ed25519 signing keys into X25519 exchange keys, and the
//! Diffie-Hellman agreement between two converted keys.
//!
//! The conversion is the birational Edwards-to-Montgomery map (libsodium's
//! `crypto_sign_ed25519_{sk,pk}_to_curve25519`), so both sides of a
//! conversation can derive exchange keys from the signing identities they
//! already publish.

use ed25519_dalek::{SigningKey, VerifyingKey};
use hex::FromHexError;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;
use x25519_dalek::{PublicKey as MontgomeryPublic, StaticSecret};
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Could not deserialize from hex: {0}")]
    HexDeserializationError(#[from] FromHexError),
    #[error("Invalid string length")]
    InvalidStringLength,
    #[error("Not a valid key: {0}")]
    InvalidKey(String),
}

/// X25519 secret half of a converted signing key.
#[derive(Clone)]
pub struct ExchangeSecret(StaticSecret);

impl ExchangeSecret {
    /// Deterministic conversion from an Ed25519 signing key: the clamped
    /// SHA-512 scalar of the seed. The same signing key always yields the
    /// same exchange secret.
    pub fn from_signing_key(key: &SigningKey) -> Self {
        Self(StaticSecret::from(key.to_scalar_bytes()))
    }

    pub fn public(&self) -> ExchangePublic {
        ExchangePublic(MontgomeryPublic::from(&self.0))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        if hex_str.len() != 64 {
            return Err(KeyError::InvalidStringLength);
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str.as_bytes(), &mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }
}

impl Debug for ExchangeSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangeSecret")
    }
}

/// X25519 public half of a converted signing key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ExchangePublic(MontgomeryPublic);

impl ExchangePublic {
    /// Montgomery u-coordinate of the Edwards verifying key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(MontgomeryPublic::from(key.to_montgomery().to_bytes()))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(MontgomeryPublic::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        if hex_str.len() != 64 {
            return Err(KeyError::InvalidStringLength);
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str.as_bytes(), &mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }
}

impl Debug for ExchangePublic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl Serialize for ExchangePublic {
    /// Serializes the public key as a hex-encoded string.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.as_hex())
    }
}

impl<'de> Deserialize<'de> for ExchangePublic {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        ExchangePublic::from_hex(&hex_str).map_err(serde::de::Error::custom)
    }
}

/// Convert a full signing keypair into its exchange keypair.
pub fn exchange_keypair(signing: &SigningKey) -> (ExchangeSecret, ExchangePublic) {
    let secret = ExchangeSecret::from_signing_key(signing);
    let public = secret.public();
    (secret, public)
}

/// 32-byte Diffie-Hellman output. Symmetric in its two inputs and zeroized
/// on drop; feed it to the thread-key KDF rather than using it directly.
pub struct SharedSecret(Zeroizing<[u8; 32]>);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedSecret")
    }
}

/// X25519 agreement: `agree(a, B) == agree(b, A)` for any valid keypairs.
pub fn agree(secret: &ExchangeSecret, peer: &ExchangePublic) -> SharedSecret {
    SharedSecret(Zeroizing::new(secret.0.diffie_hellman(&peer.0).to_bytes()))
}
