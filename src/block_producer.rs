//! Slot-tick loop and round-robin proposer selection (spec.md §4.5).
//!
//! Grounded on `original_source/sparse_blobpool/actors/block_producer.py`:
//! this actor only ticks slots and tells the selected proposer to produce a
//! block. Block assembly itself (selecting transactions by inclusion
//! policy, packing by `effective_tip`, building the `BlockAnnouncement`)
//! lives on `Node::handle_produce_block` per
//! `original_source/sparse_blobpool/protocol/commands.py`'s `ProduceBlock`
//! docstring ("The node will select transactions from its pool, create the
//! block, and broadcast") — the proposer already owns the pool it assembles
//! from, so there is no reason to reach across actors for it.

use crate::event::EventPayload;
use crate::kernel::Kernel;
use crate::protocol::Command;
use crate::types::{ActorId, BLOCK_PRODUCER_ID};

/// Ticks at `slot_duration` intervals and hands each slot to the next
/// proposer in round-robin order over `node_count` nodes.
pub struct BlockProducer {
    node_count: u32,
    slot_duration: f64,
    current_slot: u64,
}

impl BlockProducer {
    pub fn new(node_count: u32, slot_duration: f64) -> Self {
        BlockProducer {
            node_count,
            slot_duration,
            current_slot: 0,
        }
    }

    /// Schedules the first `SlotTick` command against the reserved
    /// block-producer id. Call once before the kernel's dispatch loop runs.
    pub fn start(&self, kernel: &mut Kernel) {
        let _ = kernel.schedule_after(
            self.slot_duration,
            BLOCK_PRODUCER_ID,
            EventPayload::Command(Command::SlotTick),
        );
    }

    /// Handles one `SlotTick`: if there are any nodes, sends `ProduceBlock`
    /// to the round-robin proposer for the current slot, then advances and
    /// reschedules itself.
    pub fn on_event(&mut self, payload: EventPayload, kernel: &mut Kernel) {
        if !matches!(payload, EventPayload::Command(Command::SlotTick)) {
            return;
        }

        if self.node_count > 0 {
            let proposer = self.select_proposer();
            let _ = kernel.schedule(
                kernel.current_time(),
                proposer,
                EventPayload::Command(Command::ProduceBlock { slot: self.current_slot }),
            );
        }

        self.current_slot += 1;
        let _ = kernel.schedule_after(
            self.slot_duration,
            BLOCK_PRODUCER_ID,
            EventPayload::Command(Command::SlotTick),
        );
    }

    fn select_proposer(&self) -> ActorId {
        ActorId::node(self.current_slot as u32 % self.node_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_cycles_through_all_nodes() {
        let mut producer = BlockProducer::new(3, 12.0);
        let mut kernel = Kernel::new(1, 3);
        producer.start(&mut kernel);

        let mut proposers = Vec::new();
        for _ in 0..6 {
            let tick = kernel.pop_next().unwrap();
            producer.on_event(tick.payload, &mut kernel);

            let produced = kernel.pop_next().unwrap();
            match produced.payload {
                EventPayload::Command(Command::ProduceBlock { .. }) => proposers.push(produced.target),
                other => panic!("expected ProduceBlock, got {other:?}"),
            }
        }

        assert_eq!(
            &proposers[..3],
            &[ActorId::node(0), ActorId::node(1), ActorId::node(2)]
        );
        assert_eq!(&proposers[3..6], &proposers[..3], "round-robin repeats after a full cycle");
    }

    #[test]
    fn zero_nodes_just_reschedules() {
        let mut producer = BlockProducer::new(0, 12.0);
        let mut kernel = Kernel::new(1, 0);
        producer.start(&mut kernel);
        let event = kernel.pop_next().unwrap();
        producer.on_event(event.payload, &mut kernel);
        assert_eq!(kernel.len(), 1, "must still reschedule the next tick");
    }
}
