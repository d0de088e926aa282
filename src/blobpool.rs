//! Per-node blob transaction store with RBF and capacity eviction (spec.md
//! §4.3), grounded on
//! `original_source/sparse_blobpool/pool/blobpool.py`.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::PoolError;
use crate::types::{ActorId, Address, CellMask, TxHash};

/// Required fee-bump percentage for a same-sender/same-nonce replacement
/// (spec.md §4.3).
const RBF_BUMP_PERCENT: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobTxEntry {
    pub tx_hash: TxHash,
    pub sender: Address,
    pub nonce: u64,
    pub gas_fee_cap: u64,
    pub gas_tip_cap: u64,
    pub blob_gas_price: u64,
    pub tx_size: u64,
    pub blob_count: u8,
    pub cell_mask: CellMask,
    pub received_at: f64,
    pub announced_to: BTreeSet<ActorId>,
}

impl BlobTxEntry {
    /// Priority used for `iter_by_priority` and eviction (spec.md §3).
    pub fn effective_tip(&self) -> u64 {
        self.gas_tip_cap
    }
}

#[derive(Debug, Clone, Default)]
pub struct AddResult {
    pub replaced: Option<TxHash>,
    pub evicted: Vec<TxHash>,
}

/// Per-node transaction store. Owns both the primary `tx_hash` index and
/// the `(sender, nonce)` index; every mutation keeps them consistent
/// (spec.md §3 invariant).
#[derive(Debug, Default)]
pub struct Blobpool {
    max_bytes: u64,
    max_txs_per_sender: usize,
    entries: HashMap<TxHash, BlobTxEntry>,
    by_sender: HashMap<Address, HashMap<u64, TxHash>>,
    total_size: u64,
}

impl Blobpool {
    pub fn new(max_bytes: u64, max_txs_per_sender: usize) -> Self {
        Blobpool {
            max_bytes,
            max_txs_per_sender,
            entries: HashMap::new(),
            by_sender: HashMap::new(),
            total_size: 0,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.total_size
    }

    pub fn tx_count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, tx_hash: &TxHash) -> Option<&BlobTxEntry> {
        self.entries.get(tx_hash)
    }

    pub fn entry_mut(&mut self, tx_hash: &TxHash) -> Option<&mut BlobTxEntry> {
        self.entries.get_mut(tx_hash)
    }

    pub fn contains(&self, tx_hash: &TxHash) -> bool {
        self.entries.contains_key(tx_hash)
    }

    pub fn get_by_sender(&self, sender: &Address) -> Vec<&BlobTxEntry> {
        self.by_sender
            .get(sender)
            .into_iter()
            .flat_map(|nonces| nonces.values())
            .filter_map(|h| self.entries.get(h))
            .collect()
    }

    pub fn sender_tx_count(&self, sender: &Address) -> usize {
        self.by_sender.get(sender).map_or(0, |m| m.len())
    }

    /// Admission algorithm (spec.md §4.3): RBF check, then sender limit,
    /// then capacity eviction, then insert. The RBF removal and any
    /// eviction are staged against a snapshot of the nonce-to-be-replaced
    /// so a rejection never leaves the indexes partially mutated (spec.md
    /// §9 "Scoped acquisition of entries").
    pub fn add(&mut self, entry: BlobTxEntry) -> Result<AddResult, PoolError> {
        let mut result = AddResult::default();

        let existing_hash = self
            .by_sender
            .get(&entry.sender)
            .and_then(|nonces| nonces.get(&entry.nonce))
            .copied();

        if let Some(old_hash) = existing_hash {
            let old = &self.entries[&old_hash];
            if !can_replace(old, &entry) {
                return Err(PoolError::RbfRejected(old_hash));
            }
        }

        // Past this point every check has passed against the pre-mutation
        // state; only now do we start mutating.
        if let Some(old_hash) = existing_hash {
            self.remove_internal(&old_hash);
            result.replaced = Some(old_hash);
        }

        let current_count = self.sender_tx_count(&entry.sender);
        if current_count >= self.max_txs_per_sender {
            return Err(PoolError::SenderLimitExceeded);
        }

        while self.total_size + entry.tx_size > self.max_bytes {
            match self.evict_lowest_priority(&entry.tx_hash, entry.effective_tip()) {
                Some(evicted_hash) => result.evicted.push(evicted_hash),
                None => return Err(PoolError::PoolFull),
            }
        }

        self.by_sender
            .entry(entry.sender.clone())
            .or_default()
            .insert(entry.nonce, entry.tx_hash);
        self.total_size += entry.tx_size;
        self.entries.insert(entry.tx_hash, entry);

        Ok(result)
    }

    pub fn remove(&mut self, tx_hash: &TxHash) -> Option<BlobTxEntry> {
        self.entries.contains_key(tx_hash).then(|| self.remove_internal(tx_hash))
    }

    pub fn remove_batch(&mut self, tx_hashes: &[TxHash]) -> Vec<BlobTxEntry> {
        tx_hashes.iter().filter_map(|h| self.remove(h)).collect()
    }

    pub fn update_cell_mask(&mut self, tx_hash: &TxHash, new_mask: CellMask) -> bool {
        match self.entries.get_mut(tx_hash) {
            Some(entry) => {
                entry.cell_mask = new_mask;
                true
            }
            None => false,
        }
    }

    /// Bitwise-ORs `received_mask` into the entry's mask (spec.md §4.3);
    /// commutative and idempotent in `received_mask`.
    pub fn merge_cells(&mut self, tx_hash: &TxHash, received_mask: CellMask) -> Option<CellMask> {
        let entry = self.entries.get_mut(tx_hash)?;
        entry.cell_mask |= received_mask;
        Some(entry.cell_mask)
    }

    /// All entries ordered by descending `effective_tip` (spec.md §4.3).
    pub fn iter_by_priority(&self) -> Vec<&BlobTxEntry> {
        let mut entries: Vec<&BlobTxEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| b.effective_tip().cmp(&a.effective_tip()).then(a.tx_hash.cmp(&b.tx_hash)));
        entries
    }

    pub fn iter_expired(&self, current_time: f64, ttl: f64) -> Vec<&BlobTxEntry> {
        let cutoff = current_time - ttl;
        self.entries.values().filter(|e| e.received_at < cutoff).collect()
    }

    fn remove_internal(&mut self, tx_hash: &TxHash) -> BlobTxEntry {
        let entry = self.entries.remove(tx_hash).expect("caller checked existence");
        self.total_size -= entry.tx_size;
        if let Some(nonces) = self.by_sender.get_mut(&entry.sender) {
            nonces.remove(&entry.nonce);
            if nonces.is_empty() {
                self.by_sender.remove(&entry.sender);
            }
        }
        entry
    }

    /// Evicts the minimum-`effective_tip` entry other than `exclude`, tied
    /// broken by lowest `tx_hash` (spec.md §4.3). Returns `None` (without
    /// mutating) if the pool is empty or the lowest-priority entry is not
    /// strictly cheaper than `min_priority`.
    fn evict_lowest_priority(&mut self, exclude: &TxHash, min_priority: u64) -> Option<TxHash> {
        let lowest = self
            .entries
            .values()
            .filter(|e| &e.tx_hash != exclude)
            .min_by(|a, b| {
                a.effective_tip()
                    .cmp(&b.effective_tip())
                    .then(a.tx_hash.cmp(&b.tx_hash))
            })?
            .tx_hash;

        if self.entries[&lowest].effective_tip() >= min_priority {
            return None;
        }

        self.remove_internal(&lowest);
        Some(lowest)
    }
}

fn can_replace(existing: &BlobTxEntry, replacement: &BlobTxEntry) -> bool {
    let min_fee_cap = existing.gas_fee_cap * (100 + RBF_BUMP_PERCENT) / 100;
    let min_tip_cap = existing.gas_tip_cap * (100 + RBF_BUMP_PERCENT) / 100;
    replacement.gas_fee_cap >= min_fee_cap && replacement.gas_tip_cap >= min_tip_cap
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: u8, sender: &str, nonce: u64, fee: u64, tip: u64, size: u64) -> BlobTxEntry {
        BlobTxEntry {
            tx_hash: TxHash([hash; 32]),
            sender: Address(sender.to_string()),
            nonce,
            gas_fee_cap: fee,
            gas_tip_cap: tip,
            blob_gas_price: 1,
            tx_size: size,
            blob_count: 1,
            cell_mask: CellMask::ALL_ONES,
            received_at: 0.0,
            announced_to: BTreeSet::new(),
        }
    }

    #[test]
    fn rbf_rejects_insufficient_bump_and_accepts_ten_percent() {
        let mut pool = Blobpool::new(10_000, 3);
        pool.add(entry(1, "A", 0, 1000, 100, 100)).unwrap();

        let err = pool
            .add(entry(2, "A", 0, 1099, 110, 100))
            .unwrap_err();
        assert_eq!(err, PoolError::RbfRejected(TxHash([1; 32])));

        let result = pool.add(entry(3, "A", 0, 1100, 110, 100)).unwrap();
        assert_eq!(result.replaced, Some(TxHash([1; 32])));
        assert!(pool.contains(&TxHash([3; 32])));
        assert!(!pool.contains(&TxHash([1; 32])));
    }

    #[test]
    fn capacity_eviction_removes_lowest_tip_and_then_pool_full() {
        let mut pool = Blobpool::new(10_000, 32);
        for i in 0..10u8 {
            pool.add(entry(i, &format!("S{i}"), 0, 1000, 100 + i as u64, 900))
                .unwrap();
        }
        let result = pool.add(entry(200, "BIG", 0, 5000, 500, 2000)).unwrap();
        assert_eq!(result.evicted, vec![TxHash([0; 32])], "lowest tip (100) must be evicted first");

        let err = pool.add(entry(201, "TINY", 0, 10, 1, 50)).unwrap_err();
        assert_eq!(err, PoolError::PoolFull);
    }

    #[test]
    fn sender_limit_exceeded_when_no_rbf_applies() {
        let mut pool = Blobpool::new(1_000_000, 1);
        pool.add(entry(1, "A", 0, 1000, 100, 10)).unwrap();
        let err = pool.add(entry(2, "A", 1, 1000, 100, 10)).unwrap_err();
        assert_eq!(err, PoolError::SenderLimitExceeded);
    }

    #[test]
    fn merge_cells_is_commutative_and_idempotent() {
        let mut pool = Blobpool::new(1_000_000, 4);
        pool.add(entry(1, "A", 0, 1000, 100, 10)).unwrap();
        let hash = TxHash([1; 32]);

        let mut m1 = CellMask::EMPTY;
        m1.set(3);
        let mut m2 = CellMask::EMPTY;
        m2.set(9);

        pool.merge_cells(&hash, m1);
        pool.merge_cells(&hash, m2);
        pool.merge_cells(&hash, m2);
        let mask = pool.get(&hash).unwrap().cell_mask;
        assert!(mask.contains(3) && mask.contains(9));
    }

    #[test]
    fn total_size_matches_sum_of_entries() {
        let mut pool = Blobpool::new(1_000_000, 4);
        pool.add(entry(1, "A", 0, 1000, 100, 500)).unwrap();
        pool.add(entry(2, "B", 0, 1000, 100, 700)).unwrap();
        assert_eq!(pool.size_bytes(), 1200);
        pool.remove(&TxHash([1; 32]));
        assert_eq!(pool.size_bytes(), 700);
    }

    proptest::proptest! {
        /// `merge_cells` is commutative in the order two masks are merged in
        /// (spec.md §4.3): `merge(m1, merge(m2)) == merge(m2, merge(m1))`.
        #[test]
        fn merge_cells_is_commutative(m1: u128, m2: u128) {
            let hash = TxHash([9; 32]);

            let mut pool_a = Blobpool::new(1_000_000, 4);
            pool_a.add(entry(9, "A", 0, 1000, 100, 10)).unwrap();
            pool_a.merge_cells(&hash, CellMask(m1));
            pool_a.merge_cells(&hash, CellMask(m2));

            let mut pool_b = Blobpool::new(1_000_000, 4);
            pool_b.add(entry(9, "A", 0, 1000, 100, 10)).unwrap();
            pool_b.merge_cells(&hash, CellMask(m2));
            pool_b.merge_cells(&hash, CellMask(m1));

            proptest::prop_assert_eq!(
                pool_a.get(&hash).unwrap().cell_mask.0,
                pool_b.get(&hash).unwrap().cell_mask.0
            );
        }

        /// Merging the same mask twice is the same as merging it once.
        #[test]
        fn merge_cells_is_idempotent(mask: u128) {
            let hash = TxHash([9; 32]);
            let mut pool = Blobpool::new(1_000_000, 4);
            pool.add(entry(9, "A", 0, 1000, 100, 10)).unwrap();

            pool.merge_cells(&hash, CellMask(mask));
            let once = pool.get(&hash).unwrap().cell_mask.0;
            pool.merge_cells(&hash, CellMask(mask));
            let twice = pool.get(&hash).unwrap().cell_mask.0;

            proptest::prop_assert_eq!(once, twice);
        }

        /// `total_size` never exceeds `max_bytes`, no matter what sequence of
        /// admits is applied (spec.md §3 invariant).
        #[test]
        fn total_size_never_exceeds_capacity(
            sizes in proptest::collection::vec(1u64..500, 0..30),
            tips in proptest::collection::vec(1u64..1000, 0..30),
        ) {
            let mut pool = Blobpool::new(5_000, 64);
            for (i, (&size, &tip)) in sizes.iter().zip(tips.iter()).enumerate() {
                let _ = pool.add(entry(i as u8, &format!("S{i}"), 0, tip * 2, tip, size));
                proptest::prop_assert!(pool.size_bytes() <= 5_000);
            }
        }

        /// No sender ever holds more than `max_txs_per_sender` entries.
        #[test]
        fn sender_tx_count_never_exceeds_limit(nonces in proptest::collection::vec(0u64..20, 0..30)) {
            let mut pool = Blobpool::new(1_000_000, 5);
            for (i, &nonce) in nonces.iter().enumerate() {
                let _ = pool.add(entry(i as u8, "same-sender", nonce, 1000, 100, 10));
                proptest::prop_assert!(pool.sender_tx_count(&Address("same-sender".to_string())) <= 5);
            }
        }
    }
}
