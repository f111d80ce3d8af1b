//! Canonical hashing of commitment blobs and multi-key ownership proof.
//!
//! Clients sign the canonical form of a blob; the reserved `sig` field holds
//! that signature and is therefore excluded from hashing and verification.

use crate::crypto::hashes::{sha256, tagged_sha256, NOTE_COMMITMENT_TAG, PROFILE_LEAF_TAG, RECIPIENT_TAG};
use crate::ledger::Leaf;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::Value;
use thiserror::Error;

/// Why a single owner key failed to validate a signature. Any of these counts
/// as "this key does not match"; they never abort the owner-set check.
#[derive(Debug, Error)]
pub enum OwnerKeyError {
    #[error("signature is not valid hex: {0}")]
    SignatureHex(#[from] hex::FromHexError),
    #[error("malformed signature: {0}")]
    Signature(String),
    #[error("owner key is not valid base58: {0}")]
    KeyBase58(String),
    #[error("owner key is not 32 bytes")]
    KeyLength,
    #[error("malformed owner key: {0}")]
    Key(String),
    #[error("signature does not match")]
    Mismatch,
}

/// Deterministic serialization of a commitment blob: the reserved `sig`
/// field is stripped, keys come out lexicographically sorted with compact
/// separators, and array order is preserved as given.
pub fn canonical_bytes(blob: &Value) -> Vec<u8> {
    let stripped;
    let value = match blob {
        Value::Object(map) if map.contains_key("sig") => {
            let mut map = map.clone();
            map.remove("sig");
            stripped = Value::Object(map);
            &stripped
        }
        other => other,
    };
    serde_json::to_vec(value).expect("serializing a serde_json::Value cannot fail")
}

/// Ledger leaf for a profile blob: `SHA-256(tag || canonical_bytes)`.
pub fn profile_leaf_hash(blob: &Value) -> Leaf {
    tagged_sha256(PROFILE_LEAF_TAG, &canonical_bytes(blob)).into()
}

/// Accept a signature over `blob_bytes` from ANY of the base58 Ed25519 owner
/// keys. Each key is checked independently; a malformed key or signature
/// just fails that key. False only when every key fails.
pub fn verify_owner_sig<I, S>(blob_bytes: &[u8], sig_hex: &str, owner_pubs: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    owner_pubs
        .into_iter()
        .map(|key| check_owner_key(blob_bytes, sig_hex, key.as_ref()))
        .any(|outcome| outcome.is_ok())
}

fn check_owner_key(blob_bytes: &[u8], sig_hex: &str, owner_pub_b58: &str) -> Result<(), OwnerKeyError> {
    let sig_bytes = hex::decode(sig_hex)?;
    let sig = Signature::from_slice(&sig_bytes).map_err(|e| OwnerKeyError::Signature(e.to_string()))?;
    let key_bytes =
        bs58::decode(owner_pub_b58).into_vec().map_err(|e| OwnerKeyError::KeyBase58(e.to_string()))?;
    let key_bytes: [u8; 32] = key_bytes.try_into().map_err(|_| OwnerKeyError::KeyLength)?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|e| OwnerKeyError::Key(e.to_string()))?;
    key.verify(blob_bytes, &sig).map_err(|_| OwnerKeyError::Mismatch)
}

/// Bind a commitment to its recipient without revealing the recipient:
/// `SHA-256(b"rp|" || pubkey)`.
pub fn recipient_tag(recipient_pubkey: &str) -> [u8; 32] {
    tagged_sha256(RECIPIENT_TAG, recipient_pubkey.as_bytes())
}

/// Deposit commitment over a note secret, amount and nonce, bound to the
/// recipient tag. The result is what gets appended to the ledger.
pub fn note_commitment(note: &[u8], amount: &str, nonce: &[u8], recipient_pubkey: &str) -> Leaf {
    let tag = recipient_tag(recipient_pubkey);
    let mut payload = NOTE_COMMITMENT_TAG.to_vec();
    payload.extend_from_slice(note);
    payload.push(b'|');
    payload.extend_from_slice(amount.as_bytes());
    payload.push(b'|');
    payload.extend_from_slice(nonce);
    payload.push(b'|');
    payload.extend_from_slice(&tag);
    sha256(&payload).into()
}

#[cfg(test)]
mod test {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;
    use serde_json::json;

    #[test]
    fn canonicalization_ignores_field_order_and_sig() {
        let with_sig = json!({"b": 2, "a": 1, "sig": "deadbeef"});
        let without_sig = json!({"a": 1, "b": 2});
        assert_eq!(canonical_bytes(&with_sig), canonical_bytes(&without_sig));
        assert_eq!(canonical_bytes(&without_sig), br#"{"a":1,"b":2}"#);
    }

    #[test]
    fn canonicalization_is_idempotent_and_keeps_array_order() {
        let blob = json!({"name": "vendor", "ratings": [3, 1, 2]});
        let first = canonical_bytes(&blob);
        let reparsed: Value = serde_json::from_slice(&first).unwrap();
        assert_eq!(canonical_bytes(&reparsed), first);
        assert_eq!(first, br#"{"name":"vendor","ratings":[3,1,2]}"#.to_vec());
    }

    #[test]
    fn leaf_hash_is_stable_under_reordering() {
        let a = json!({"handle": "alice", "keys": ["k1"], "sig": "aa"});
        let b = json!({"keys": ["k1"], "handle": "alice"});
        assert_eq!(profile_leaf_hash(&a), profile_leaf_hash(&b));
    }

    fn signed_blob() -> (Vec<u8>, String, String) {
        let signer = SigningKey::generate(&mut OsRng);
        let blob = canonical_bytes(&json!({"handle": "alice"}));
        let sig = hex::encode(signer.sign(&blob).to_bytes());
        let pubkey = bs58::encode(signer.verifying_key().to_bytes()).into_string();
        (blob, sig, pubkey)
    }

    #[test]
    fn any_single_owner_key_is_sufficient() {
        let (blob, sig, pubkey) = signed_blob();
        let rotated_out = bs58::encode([0u8; 32]).into_string();
        assert!(verify_owner_sig(&blob, &sig, [rotated_out.as_str(), pubkey.as_str()]));
        assert!(verify_owner_sig(&blob, &sig, [pubkey.as_str()]));
    }

    #[test]
    fn malformed_keys_fail_that_key_only() {
        let (blob, sig, pubkey) = signed_blob();
        let keys = ["not-base58-!!", "abc", pubkey.as_str()];
        assert!(verify_owner_sig(&blob, &sig, keys));
    }

    #[test]
    fn verification_fails_closed() {
        let (blob, sig, pubkey) = signed_blob();
        let (_, other_sig, _) = signed_blob();
        assert!(!verify_owner_sig(&blob, &other_sig, [pubkey.as_str()]));
        assert!(!verify_owner_sig(&blob, &sig, ["not-base58-!!"]));
        assert!(!verify_owner_sig(&blob, "zz", [pubkey.as_str()]));
        assert!(!verify_owner_sig(&blob, &sig, Vec::<String>::new()));
    }

    #[test]
    fn note_commitments_are_recipient_bound() {
        let a = note_commitment(b"note-secret", "1.500000000", b"nonce", "alice-pub");
        let b = note_commitment(b"note-secret", "1.500000000", b"nonce", "bob-pub");
        let a_again = note_commitment(b"note-secret", "1.500000000", b"nonce", "alice-pub");
        assert_ne!(a, b);
        assert_eq!(a, a_again);
    }
}
