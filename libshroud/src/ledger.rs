//! Append-only commitment ledger.
//!
//! Leaves are commitment hashes appended in deposit order; the leaf index is
//! the position a spender later proves membership for. The ledger has a
//! fixed depth chosen at creation and a hard capacity of `2^depth` leaves.
//! Nothing is ever removed or rewritten.

use crate::crypto::hashes::sha256;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

pub const DEFAULT_DEPTH: u32 = 20;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger depth {0} is outside the supported range (1..=32)")]
    InvalidDepth(u32),
    #[error("ledger is full: capacity 2^{depth} reached")]
    CapacityExceeded { depth: u32 },
    #[error("leaf index {index} out of range for {len} leaves")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A 32-byte commitment hash stored at one ledger index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Leaf([u8; 32]);

impl Leaf {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl From<[u8; 32]> for Leaf {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Debug for Leaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl Serialize for Leaf {
    /// Serializes the leaf as a hex-encoded string.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.as_hex())
    }
}

impl<'de> Deserialize<'de> for Leaf {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        Leaf::from_hex(&hex_str).map_err(serde::de::Error::custom)
    }
}

/// Which side a proof sibling sits on, relative to the node being proven.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// One step of a membership proof: the sibling hash and its side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Leaf,
    pub side: Side,
}

/// Ordered, append-only leaf sequence with fixed capacity.
///
/// Appends must be linearized; the `&mut self` receiver gives callers
/// single-writer semantics, and a deployment sharing the ledger across
/// threads wraps it in a mutex at that boundary.
#[derive(Clone, Debug, Serialize)]
pub struct CommitmentLedger {
    leaves: Vec<Leaf>,
    depth: u32,
}

impl CommitmentLedger {
    pub fn new(depth: u32) -> Result<Self, LedgerError> {
        if depth == 0 || depth > 32 {
            return Err(LedgerError::InvalidDepth(depth));
        }
        Ok(Self { leaves: Vec::new(), depth })
    }

    /// Rebuild a ledger from persisted leaves, in append order.
    pub fn from_leaves(leaves: Vec<Leaf>, depth: u32) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(depth)?;
        if leaves.len() as u64 > ledger.capacity() {
            return Err(LedgerError::CapacityExceeded { depth });
        }
        ledger.leaves = leaves;
        Ok(ledger)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn get(&self, index: usize) -> Option<&Leaf> {
        self.leaves.get(index)
    }

    /// Append a leaf and return its assigned index. Fails without touching
    /// the ledger once `2^depth` leaves are stored.
    pub fn append(&mut self, leaf: Leaf) -> Result<u64, LedgerError> {
        if self.leaves.len() as u64 == self.capacity() {
            return Err(LedgerError::CapacityExceeded { depth: self.depth });
        }
        let index = self.leaves.len() as u64;
        self.leaves.push(leaf);
        debug!("Appended leaf {} at index {index}", self.leaves[index as usize].as_hex());
        Ok(index)
    }

    /// Merkle root over the current leaves. An odd node at any layer is
    /// paired with itself; the empty ledger hashes to `SHA-256("")`.
    pub fn root(&self) -> [u8; 32] {
        if self.leaves.is_empty() {
            return sha256(b"");
        }
        let layers = self.layers();
        layers[layers.len() - 1][0]
    }

    /// Membership proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Result<Vec<ProofStep>, LedgerError> {
        if index >= self.leaves.len() {
            return Err(LedgerError::IndexOutOfRange { index, len: self.leaves.len() });
        }
        let layers = self.layers();
        let mut proof = Vec::with_capacity(layers.len().saturating_sub(1));
        let mut idx = index;
        for layer in &layers[..layers.len() - 1] {
            let is_right = idx % 2 == 1;
            let sibling_idx = if is_right { idx - 1 } else { idx + 1 };
            // A node without a sibling was paired with itself.
            let sibling = if sibling_idx < layer.len() { layer[sibling_idx] } else { layer[idx] };
            let side = if is_right { Side::Left } else { Side::Right };
            proof.push(ProofStep { sibling: Leaf(sibling), side });
            idx /= 2;
        }
        Ok(proof)
    }

    fn layers(&self) -> Vec<Vec<[u8; 32]>> {
        let mut layers = vec![self.leaves.iter().map(|l| l.0).collect::<Vec<_>>()];
        while layers[layers.len() - 1].len() > 1 {
            let current = &layers[layers.len() - 1];
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                let left = pair[0];
                let right = if pair.len() == 2 { pair[1] } else { left };
                let mut joined = [0u8; 64];
                joined[..32].copy_from_slice(&left);
                joined[32..].copy_from_slice(&right);
                next.push(sha256(&joined));
            }
            layers.push(next);
        }
        layers
    }
}

impl Default for CommitmentLedger {
    fn default() -> Self {
        Self { leaves: Vec::new(), depth: DEFAULT_DEPTH }
    }
}

impl<'de> Deserialize<'de> for CommitmentLedger {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            leaves: Vec<Leaf>,
            depth: u32,
        }
        let raw = Raw::deserialize(deserializer)?;
        CommitmentLedger::from_leaves(raw.leaves, raw.depth).map_err(serde::de::Error::custom)
    }
}

/// Recompute the root from a leaf and its proof and compare.
pub fn verify_proof(leaf: &Leaf, proof: &[ProofStep], root: &[u8; 32]) -> bool {
    let mut hash = leaf.0;
    for step in proof {
        let mut joined = [0u8; 64];
        match step.side {
            Side::Left => {
                joined[..32].copy_from_slice(step.sibling.as_bytes());
                joined[32..].copy_from_slice(&hash);
            }
            Side::Right => {
                joined[..32].copy_from_slice(&hash);
                joined[32..].copy_from_slice(step.sibling.as_bytes());
            }
        }
        hash = sha256(&joined);
    }
    hash == *root
}
