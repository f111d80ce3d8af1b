//! Chaumian RSA blind signatures.
//!
//! The authority signs a blinded value and never sees the underlying message;
//! the requester unblinds the result into a signature that verifies against
//! the plain message. This is the unlinkable authorization token used when
//! spending shielded notes.

use crate::crypto::hashes::{tagged_sha256, BLIND_SIG_TAG};
use log::info;
use num_bigint_dig::{BigUint, ModInverse};
use rand::{CryptoRng, RngCore};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::RsaPrivateKey;
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

/// Practical minimum modulus size. Anything below this is refused outright.
pub const MIN_MODULUS_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum BlindSigError {
    #[error("{0}-bit modulus is below the {MIN_MODULUS_BITS}-bit minimum")]
    InsecureModulus(usize),
    #[error("RSA key generation failed: {0}")]
    KeyGeneration(#[from] rsa::Error),
    #[error("Malformed key material: {0}")]
    KeyFormat(String),
    #[error("Could not deserialize from hex: {0}")]
    HexDeserializationError(#[from] hex::FromHexError),
    #[error("Value is not invertible modulo n")]
    NotInvertible,
}

/// The authority's RSA keypair. The private exponent never leaves this type;
/// callers only ever obtain the public half via [`BlindKeyPair::public`].
#[derive(Clone)]
pub struct BlindKeyPair {
    key: RsaPrivateKey,
}

impl BlindKeyPair {
    /// Generate a fresh signing keypair. Refuses undersized moduli.
    pub fn generate<R: CryptoRng + RngCore>(bits: usize, rng: &mut R) -> Result<Self, BlindSigError> {
        if bits < MIN_MODULUS_BITS {
            return Err(BlindSigError::InsecureModulus(bits));
        }
        let key = RsaPrivateKey::new(rng, bits)?;
        info!("Generated {bits}-bit blind-signature keypair");
        Ok(Self { key })
    }

    pub fn public(&self) -> BlindPublicKey {
        BlindPublicKey { n: self.key.n().clone(), e: self.key.e().clone() }
    }

    /// Sign a blinded value: `blinded^d mod n`.
    ///
    /// The input is all the authority ever observes of the request. It must
    /// never be logged or persisted alongside issued signatures, or the
    /// unlinkability of the scheme is lost.
    pub fn sign_blinded(&self, blinded: &BigUint) -> BlindSignature {
        BlindSignature(blinded.modpow(self.key.d(), self.key.n()))
    }

    /// Server-local issuance: blind, sign and unblind in one step, returning
    /// the hex-encoded signature over the commitment bytes.
    pub fn issue_for_commitment<R: CryptoRng + RngCore>(
        &self,
        commitment_hex: &str,
        rng: &mut R,
    ) -> Result<String, BlindSigError> {
        let message = hex::decode(commitment_hex)?;
        let pubkey = self.public();
        let request = blind(&message, &pubkey, rng);
        let blinded_sig = self.sign_blinded(request.blinded());
        let sig = request.unblind(&blinded_sig, &pubkey)?;
        Ok(sig.as_hex())
    }

    /// Serializes the private key as a PKCS#8 PEM document.
    pub fn to_pem(&self) -> Result<Zeroizing<String>, BlindSigError> {
        self.key.to_pkcs8_pem(LineEnding::LF).map_err(|e| BlindSigError::KeyFormat(e.to_string()))
    }

    pub fn from_pem(pem: &str) -> Result<Self, BlindSigError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| BlindSigError::KeyFormat(e.to_string()))?;
        Ok(Self { key })
    }
}

impl std::fmt::Debug for BlindKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlindKeyPair({} bits)", self.key.n().bits())
    }
}

/// Public half of the authority key, distributed to clients as a JSON object
/// `{"n": <integer>, "e": <integer>}` with full-precision integers.
#[derive(Clone, PartialEq, Eq)]
pub struct BlindPublicKey {
    n: BigUint,
    e: BigUint,
}

impl BlindPublicKey {
    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn e(&self) -> &BigUint {
        &self.e
    }

    pub fn to_json(&self) -> Result<String, BlindSigError> {
        serde_json::to_string_pretty(self).map_err(|e| BlindSigError::KeyFormat(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, BlindSigError> {
        serde_json::from_str(json).map_err(|e| BlindSigError::KeyFormat(e.to_string()))
    }
}

impl std::fmt::Debug for BlindPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlindPublicKey({} bits, e={})", self.n.bits(), self.e)
    }
}

impl Serialize for BlindPublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("BlindPublicKey", 2)?;
        s.serialize_field("n", &serde_json::Number::from_string_unchecked(self.n.to_string()))?;
        s.serialize_field("e", &serde_json::Number::from_string_unchecked(self.e.to_string()))?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for BlindPublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            n: serde_json::Number,
            e: serde_json::Number,
        }
        let raw = Raw::deserialize(deserializer)?;
        let n = BigUint::from_str(&raw.n.to_string()).map_err(|e| D::Error::custom(format!("invalid n: {e}")))?;
        let e = BigUint::from_str(&raw.e.to_string()).map_err(|e| D::Error::custom(format!("invalid e: {e}")))?;
        Ok(Self { n, e })
    }
}

/// A blinded message plus its caller-held blinding factor.
///
/// Only the blinded value may be sent to the authority; the factor stays with
/// the requester and is consumed by [`BlindedRequest::unblind`], so a factor
/// can never be reused across requests.
pub struct BlindedRequest {
    blinded: BigUint,
    blinding_factor: BigUint,
}

impl BlindedRequest {
    pub fn blinded(&self) -> &BigUint {
        &self.blinded
    }

    /// Strip the blinding factor off a signature over the blinded value:
    /// `sig * r^-1 mod n`.
    pub fn unblind(self, blinded_sig: &BlindSignature, pubkey: &BlindPublicKey) -> Result<BlindSignature, BlindSigError> {
        let r_inv = (&self.blinding_factor)
            .mod_inverse(&pubkey.n)
            .and_then(|inv| inv.to_biguint())
            .ok_or(BlindSigError::NotInvertible)?;
        Ok(BlindSignature((&blinded_sig.0 * r_inv) % &pubkey.n))
    }
}

/// An unblinded signature, an integer mod n. Valid only against the exact
/// `(message, public key)` pair it was issued for.
#[derive(Clone, PartialEq, Eq)]
pub struct BlindSignature(BigUint);

impl BlindSignature {
    pub fn as_hex(&self) -> String {
        format!("{:x}", self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, BlindSigError> {
        let value = BigUint::parse_bytes(hex_str.as_bytes(), 16)
            .ok_or_else(|| BlindSigError::KeyFormat(format!("'{hex_str}' is not a hex integer")))?;
        Ok(Self(value))
    }
}

impl std::fmt::Debug for BlindSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlindSignature({})", self.as_hex())
    }
}

/// Blind `message` for signing: `m * r^e mod n` with a fresh blinding factor.
pub fn blind<R: CryptoRng + RngCore>(message: &[u8], pubkey: &BlindPublicKey, rng: &mut R) -> BlindedRequest {
    let m = hash_to_uint(message, &pubkey.n);
    let r = sample_blinding_factor(&pubkey.n, rng);
    let blinded = (&m * r.modpow(&pubkey.e, &pubkey.n)) % &pubkey.n;
    BlindedRequest { blinded, blinding_factor: r }
}

/// Check `signature^e mod n == H(tag || message) mod n`.
pub fn verify(message: &[u8], signature: &BlindSignature, pubkey: &BlindPublicKey) -> bool {
    let m = hash_to_uint(message, &pubkey.n);
    signature.0.modpow(&pubkey.e, &pubkey.n) == m
}

fn hash_to_uint(message: &[u8], n: &BigUint) -> BigUint {
    let digest = tagged_sha256(BLIND_SIG_TAG, message);
    BigUint::from_bytes_be(&digest) % n
}

/// Sample `r` uniformly from `[2, n-1]`, rejecting values without an inverse
/// mod n. Invertibility is equivalent to `gcd(r, n) == 1`, so unblinding can
/// never hit a non-invertible factor.
fn sample_blinding_factor<R: CryptoRng + RngCore>(n: &BigUint, rng: &mut R) -> BigUint {
    let len = (n.bits() + 7) / 8;
    let two = BigUint::from(2u32);
    loop {
        let mut buf = vec![0u8; len];
        rng.fill_bytes(&mut buf);
        let r = BigUint::from_bytes_be(&buf);
        if r < two || &r >= n {
            continue;
        }
        if (&r).mod_inverse(n).is_some() {
            return r;
        }
    }
}
