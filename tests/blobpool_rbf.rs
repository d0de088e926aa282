//! Blobpool admission scenarios (spec.md §8 scenarios 2-3): replace-by-fee
//! sequencing and capacity eviction, exercised directly against `Blobpool`
//! rather than through the network since admission is a pure function of
//! the pool's own state.

use std::collections::BTreeSet;

use sparse_blobsim::blobpool::{BlobTxEntry, Blobpool};
use sparse_blobsim::error::PoolError;
use sparse_blobsim::types::{Address, CellMask, TxHash};

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

/// e1 lands, e2 at the same nonce with an insufficient bump is rejected,
/// e2' with a >=10% bump on both fee cap and tip cap replaces it.
#[test]
fn rbf_sequence_reject_then_accept() {
    let mut pool = Blobpool::new(10_000, 3);

    let e1 = entry(1, "sender-a", 0, 1_000_000, 100_000, 900);
    pool.add(e1).expect("first transaction admits cleanly");

    let e2 = entry(2, "sender-a", 0, 1_050_000, 105_000, 900);
    let err = pool.add(e2).unwrap_err();
    assert_eq!(err, PoolError::RbfRejected(TxHash([1; 32])), "5% bump is not enough to replace");
    assert!(pool.contains(&TxHash([1; 32])), "rejected replacement must leave the original in place");

    let e2_bumped = entry(2, "sender-a", 0, 1_100_000, 110_000, 900);
    let result = pool.add(e2_bumped).expect("10% bump is sufficient");
    assert_eq!(result.replaced, Some(TxHash([1; 32])));
    assert!(!pool.contains(&TxHash([1; 32])));
    assert!(pool.contains(&TxHash([2; 32])));
    assert_eq!(pool.tx_count(), 1, "replacement must not leave both entries present");
}

/// Ten entries fill the pool; an eleventh higher-tip entry evicts the
/// lowest-tip entry; a twelfth entry with a tip below everything remaining
/// fails with PoolFull rather than silently evicting nothing.
#[test]
fn capacity_eviction_then_pool_full() {
    let mut pool = Blobpool::new(10_000, 32);

    for i in 0..10u8 {
        pool.add(entry(i, &format!("sender-{i}"), 0, 1_000, 100 + i as u64, 900))
            .expect("initial fill must fit exactly within capacity");
    }
    assert_eq!(pool.size_bytes(), 9_000);

    let result = pool.add(entry(200, "sender-big", 0, 5_000, 500, 2_000)).unwrap();
    assert_eq!(result.evicted, vec![TxHash([0; 32])], "lowest tip (100) evicts first");
    assert!(pool.contains(&TxHash([200; 32])));

    let err = pool.add(entry(201, "sender-tiny", 0, 10, 1, 50)).unwrap_err();
    assert_eq!(err, PoolError::PoolFull, "a tip below every remaining entry cannot buy space");
}
