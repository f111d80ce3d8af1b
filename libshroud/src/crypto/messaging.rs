//! Per-conversation symmetric keys and authenticated message encryption.
//!
//! A shared secret from [`crate::crypto::keys::agree`] is stretched into one
//! independent key per thread id, and messages are sealed with
//! XChaCha20-Poly1305 under a fresh 24-byte random nonce.

use crate::crypto::hashes::THREAD_KEY_TAG;
use crate::crypto::keys::SharedSecret;
use crate::helpers;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

pub const NONCE_LEN: usize = 24;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("message failed authentication")]
    Authentication,
    #[error("encryption failed")]
    Encryption,
    #[error("envelope is too short to contain a nonce")]
    Truncated,
    #[error("thread key derivation failed: {0}")]
    KeyDerivation(String),
}

/// 32-byte symmetric key bound to one conversation thread.
#[derive(Clone)]
pub struct ThreadKey(Zeroizing<[u8; 32]>);

impl ThreadKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for ThreadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ThreadKey")
    }
}

/// HKDF-SHA256 over the shared secret with `tag || thread_id` as context.
/// Distinct thread ids from the same pair yield independent keys.
pub fn derive_thread_key(shared: &SharedSecret, thread_id: &[u8]) -> Result<ThreadKey, MessagingError> {
    let mut info = THREAD_KEY_TAG.to_vec();
    info.extend_from_slice(thread_id);
    let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut okm = Zeroizing::new([0u8; 32]);
    hkdf.expand(&info, &mut okm[..]).map_err(|e| MessagingError::KeyDerivation(e.to_string()))?;
    Ok(ThreadKey(okm))
}

/// An authenticated ciphertext with the nonce it was sealed under. The wire
/// form is the 24-byte nonce followed by ciphertext-plus-tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(serialize_with = "helpers::to_hex", deserialize_with = "helpers::array_from_hex")]
    pub nonce: [u8; NONCE_LEN],
    #[serde(serialize_with = "helpers::to_hex", deserialize_with = "helpers::from_hex")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessagingError> {
        if bytes.len() < NONCE_LEN {
            return Err(MessagingError::Truncated);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);
        Ok(Self { nonce, ciphertext: bytes[NONCE_LEN..].to_vec() })
    }
}

/// Seal `plaintext` under `key` with a fresh random nonce. Nonce reuse under
/// the same key breaks confidentiality, hence the CSPRNG bound.
pub fn encrypt<R: CryptoRng + RngCore>(
    key: &ThreadKey,
    plaintext: &[u8],
    rng: &mut R,
) -> Result<EncryptedEnvelope, MessagingError> {
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let ciphertext =
        cipher.encrypt(XNonce::from_slice(&nonce), plaintext).map_err(|_| MessagingError::Encryption)?;
    Ok(EncryptedEnvelope { nonce, ciphertext })
}

/// Open an envelope. Any mismatch of key, nonce or ciphertext fails with
/// [`MessagingError::Authentication`] and yields no plaintext at all.
pub fn decrypt(key: &ThreadKey, envelope: &EncryptedEnvelope) -> Result<Vec<u8>, MessagingError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(XNonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
        .map_err(|_| MessagingError::Authentication)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::keys::{agree, exchange_keypair};
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn thread_key(thread_id: &[u8]) -> ThreadKey {
        let (alice_secret, _) = exchange_keypair(&SigningKey::generate(&mut OsRng));
        let (_, bob_public) = exchange_keypair(&SigningKey::generate(&mut OsRng));
        let shared = agree(&alice_secret, &bob_public);
        derive_thread_key(&shared, thread_id).unwrap()
    }

    #[test]
    fn distinct_thread_ids_yield_distinct_keys() {
        let (alice_secret, _) = exchange_keypair(&SigningKey::generate(&mut OsRng));
        let (_, bob_public) = exchange_keypair(&SigningKey::generate(&mut OsRng));
        let shared = agree(&alice_secret, &bob_public);
        let k1 = derive_thread_key(&shared, b"thread-1").unwrap();
        let k2 = derive_thread_key(&shared, b"thread-2").unwrap();
        let k1_again = derive_thread_key(&shared, b"thread-1").unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
        assert_eq!(k1.as_bytes(), k1_again.as_bytes());
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = thread_key(b"escrow-42");
        let plaintext = b"meet at the usual place";
        let envelope = encrypt(&key, plaintext, &mut OsRng).unwrap();
        assert_eq!(decrypt(&key, &envelope).unwrap(), plaintext);
    }

    #[test]
    fn tampering_is_detected() {
        let key = thread_key(b"escrow-42");
        let envelope = encrypt(&key, b"payload", &mut OsRng).unwrap();

        let mut bad_ct = envelope.clone();
        bad_ct.ciphertext[0] ^= 0x01;
        assert!(matches!(decrypt(&key, &bad_ct), Err(MessagingError::Authentication)));

        let mut bad_nonce = envelope.clone();
        bad_nonce.nonce[0] ^= 0x01;
        assert!(matches!(decrypt(&key, &bad_nonce), Err(MessagingError::Authentication)));

        let other_key = thread_key(b"escrow-43");
        assert!(matches!(decrypt(&other_key, &envelope), Err(MessagingError::Authentication)));
    }

    #[test]
    fn wire_format_round_trips() {
        let key = thread_key(b"wire");
        let envelope = encrypt(&key, b"bytes on the wire", &mut OsRng).unwrap();
        let bytes = envelope.to_bytes();
        assert_eq!(&bytes[..NONCE_LEN], &envelope.nonce);
        let back = EncryptedEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(back, envelope);
        assert_eq!(decrypt(&key, &back).unwrap(), b"bytes on the wire");

        assert!(matches!(
            EncryptedEnvelope::from_bytes(&bytes[..NONCE_LEN - 1]),
            Err(MessagingError::Truncated)
        ));
    }
}
