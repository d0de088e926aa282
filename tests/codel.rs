//! CoDel congestion scenario (spec.md §8 scenario 4): a bandwidth-starved
//! link under back-to-back load must add a growing virtual-queue delay on
//! top of the base propagation delay.

use std::sync::Arc;

use sparse_blobsim::config::CountryTable;
use sparse_blobsim::kernel::Kernel;
use sparse_blobsim::network::Network;
use sparse_blobsim::protocol::{Announce, Message};
use sparse_blobsim::types::{ActorId, TxHash};

fn announce(sender: ActorId, size: u64) -> Message {
    Message::Announce(Announce {
        sender,
        types: vec![3],
        sizes: vec![size],
        hashes: vec![TxHash([1; 32])],
        cell_mask: None,
    })
}

/// Two same-country nodes on a 1 MB/s link: a small message followed
/// immediately by a large one must arrive noticeably later than the small
/// one alone would, because the large message's transmission time and the
/// CoDel queue it builds both stack onto the base+jitter delay.
#[test]
fn back_to_back_messages_on_a_slow_link_accumulate_delay() {
    let countries = Arc::new(CountryTable::default());
    let mut kernel = Kernel::new(7, 2);
    let mut network = Network::new(countries, 1_000_000.0);
    let mut metrics = sparse_blobsim::metrics::MetricsCollector::new(10.0, 0.15);

    let a = ActorId::node(0);
    let b = ActorId::node(1);
    network.register_node(a, "US".to_string(), Some(1_000_000.0));
    network.register_node(b, "US".to_string(), Some(1_000_000.0));
    metrics.register_node(a, "US".to_string(), Default::default());
    metrics.register_node(b, "US".to_string(), Default::default());

    network.deliver(&mut kernel, &mut metrics, announce(a, 1_000), a, b).unwrap();
    let first = kernel.pop_next().unwrap();
    let first_arrival = first.timestamp.as_secs_f64();

    network.deliver(&mut kernel, &mut metrics, announce(a, 100_000), a, b).unwrap();
    let second = kernel.pop_next().unwrap();
    let second_arrival = second.timestamp.as_secs_f64();

    assert!(
        second_arrival - first_arrival > 0.050,
        "expected the large back-to-back message to land more than 50ms after the small one, \
         got a gap of {}s",
        second_arrival - first_arrival
    );
}
