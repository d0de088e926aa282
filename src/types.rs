//! Core identifier and primitive types shared across every component.
//!
//! `ActorId` is the "arena + index" handle described in the design notes:
//! components refer to each other by this opaque, `Copy`, totally ordered
//! value rather than by owning reference, so the kernel can own the actor
//! table without lifetime entanglement.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle for a simulation actor (node or block producer).
///
/// Stable for the lifetime of a run. Backed by a small integer so it stays
/// `Copy` and cheap to hash, but carries a human-readable `Display` for logs
/// and the run-summary JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub u32);

/// Reserved id for the single process-wide block producer (never a node index).
pub const BLOCK_PRODUCER_ID: ActorId = ActorId(u32::MAX);

impl ActorId {
    pub fn node(index: u32) -> Self {
        ActorId(index)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == BLOCK_PRODUCER_ID {
            write!(f, "block-producer")
        } else {
            write!(f, "node-{:04}", self.0)
        }
    }
}

/// 32-byte content-addressed identifier of a blob transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        TxHash(bytes)
    }

    /// Hex-encoded form, used for the derived-sender trick in §4.4.4/§4.4.6.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}

/// Sender account identifier (20 bytes semantically; here a hex string
/// derived from the tx hash when no real sender metadata is modeled).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Derives a sender address from a tx hash per spec.md §4.4.4: the first
    /// 40 hex chars of the hash, "0x"-prefixed.
    pub fn derive_from_tx_hash(hash: &TxHash) -> Self {
        Address(format!("0x{}", &hash.to_hex()[..40]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic per-node request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Country label keyed against the latency lookup table (§6).
pub type Country = String;

/// 128-bit bitmap of erasure-coded cell (column) availability.
///
/// Bit *i* set means column *i* is available/requested. `CellMask::ALL_ONES`
/// denotes full availability of all 128 columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CellMask(pub u128);

impl CellMask {
    pub const ALL_ONES: CellMask = CellMask(u128::MAX);
    pub const EMPTY: CellMask = CellMask(0);

    pub fn is_full(&self) -> bool {
        *self == Self::ALL_ONES
    }

    pub fn popcount(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn set(&mut self, col: u32) {
        self.0 |= 1u128 << col;
    }

    pub fn contains(&self, col: u32) -> bool {
        self.0 & (1u128 << col) != 0
    }

    pub fn union(self, other: CellMask) -> CellMask {
        CellMask(self.0 | other.0)
    }

    pub fn intersection(self, other: CellMask) -> CellMask {
        CellMask(self.0 & other.0)
    }

    /// True iff every bit set in `required` is also set in `self`.
    pub fn covers(&self, required: CellMask) -> bool {
        self.intersection(required) == required
    }
}

impl std::ops::BitOr for CellMask {
    type Output = CellMask;
    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for CellMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAnd for CellMask {
    type Output = CellMask;
    fn bitand(self, rhs: Self) -> Self::Output {
        self.intersection(rhs)
    }
}

/// Total number of erasure-coded columns per blob.
pub const CELLS_PER_BLOB: u32 = 128;

/// Opaque fixed-size cell payload (no real KZG proofs are modeled).
pub const CELL_SIZE: u64 = 2048;

/// Estimated size of a full blob transaction, used for the bandwidth
/// reduction metric (128 cells * 2048 bytes + overhead).
pub const FULL_BLOB_SIZE: u64 = CELLS_PER_BLOB as u64 * CELL_SIZE + 1024;

/// Fixed overhead applied to every protocol message for size accounting.
pub const MESSAGE_OVERHEAD: u64 = 24;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_mask_covers_is_subset_check() {
        let mut have = CellMask::EMPTY;
        have.set(3);
        have.set(5);
        let mut need = CellMask::EMPTY;
        need.set(3);
        assert!(have.covers(need), "superset must cover subset");
        need.set(9);
        assert!(!have.covers(need), "missing bit must fail coverage");
    }

    #[test]
    fn address_derivation_matches_first_40_hex_chars() {
        let hash = TxHash([0xab; 32]);
        let addr = Address::derive_from_tx_hash(&hash);
        assert_eq!(addr.0, format!("0x{}", "ab".repeat(20)));
    }
}
