use sha2::{Digest, Sha256};

/// Domain-separation tags mixed into every hash the protocol produces.
///
/// These are wire-compatibility constants: peers hashing with different tag
/// bytes produce signatures and leaves that will never validate against ours,
/// so the tags double as protocol version identifiers.
pub const BLIND_SIG_TAG: &[u8] = b"chaum-blind-v1|sol-edu";
pub const THREAD_KEY_TAG: &[u8] = b"incognito-msg-v1|";
pub const PROFILE_LEAF_TAG: &[u8] = b"profile|";
pub const NOTE_COMMITMENT_TAG: &[u8] = b"commit|";
pub const RECIPIENT_TAG: &[u8] = b"rp|";

pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Hash `input` under a domain tag.
pub fn tagged_sha256(tag: &[u8], input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    hasher.update(input);
    hasher.finalize().into()
}
