//! Block inclusion and cleanup scenario (spec.md §8 scenario 6): once a
//! node's own transaction is packed into a block it proposes, the pool
//! entry is removed shortly after and the inclusion slot is recorded in
//! the finalized metrics.

use sparse_blobsim::config::{CountryTable, SimulationConfig};
use sparse_blobsim::driver::Driver;
use sparse_blobsim::types::ActorId;

fn config() -> SimulationConfig {
    SimulationConfig::default()
        .with_node_count(1)
        .with_mesh_degree(0)
        .with_seed(3)
        .with_duration(20.0)
}

#[test]
fn included_transaction_is_cleaned_up_after_its_block_slot() {
    let cfg = config();
    let slot_duration = cfg.slot_duration;
    let mut driver = Driver::build(cfg, CountryTable::default());
    let tx_hash = driver.broadcast_transaction(Some(ActorId::node(0)), None);

    assert!(driver.node(ActorId::node(0)).unwrap().pool().contains(&tx_hash));

    driver.run(slot_duration + 2.5);

    assert!(
        !driver.node(ActorId::node(0)).unwrap().pool().contains(&tx_hash),
        "transaction must be gone from the pool after its block's cleanup delay elapses"
    );

    let results = driver.finalize_metrics().expect("metrics finalize exactly once");
    assert_eq!(
        results.inclusions.get(&tx_hash.to_hex()),
        Some(&0),
        "the single node is its own proposer on the first slot tick (slot 0)"
    );
}
