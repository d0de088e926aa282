//! Event-driven simulation kernel (spec.md §4.1).
//!
//! Owns exactly one seeded PRNG and the event priority queue; every other
//! component receives the RNG through this kernel rather than seeding its
//! own, so that two runs with the same seed produce byte-identical
//! schedules (spec.md §4.1 "Determinism").
//!
//! Mirrors the teacher's `PhysicsLayer` (`BinaryHeap` of deadline-ordered
//! packets) but without the causal/light-cone framing: the heap here is
//! ordered on `(timestamp, priority, sequence)` rather than an `Instant`.

use std::collections::{BinaryHeap, HashSet};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use crate::error::KernelError;
use crate::event::{Event, EventPayload, SimTime};
use crate::types::{ActorId, BLOCK_PRODUCER_ID};

/// Min-heap scheduler and RNG source for a single simulation run.
pub struct Kernel {
    queue: BinaryHeap<Event>,
    now: SimTime,
    next_sequence: u64,
    node_count: u32,
    rng: ChaCha8Rng,
    registered_actors: HashSet<ActorId>,
}

impl Kernel {
    pub fn new(seed: u64, node_count: u32) -> Self {
        Kernel {
            queue: BinaryHeap::new(),
            now: SimTime::ZERO,
            next_sequence: 0,
            node_count,
            rng: ChaCha8Rng::seed_from_u64(seed),
            registered_actors: HashSet::new(),
        }
    }

    pub fn current_time(&self) -> SimTime {
        self.now
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub fn events_processed(&self) -> u64 {
        self.next_sequence
    }

    /// Registers `actor` under a unique id (spec.md §4.1). Fails with
    /// [`KernelError::DuplicateActor`] if `actor` was already registered;
    /// this is a construction-time error, always surfaced before the run
    /// starts.
    pub fn register_actor(&mut self, actor: ActorId) -> Result<(), KernelError> {
        if !self.registered_actors.insert(actor) {
            return Err(KernelError::DuplicateActor);
        }
        trace!(?actor, "actor registered");
        Ok(())
    }

    fn validate_target(&self, target: ActorId) -> Result<(), KernelError> {
        if target == BLOCK_PRODUCER_ID || target.0 < self.node_count {
            Ok(())
        } else {
            Err(KernelError::UnknownActor)
        }
    }

    /// Schedules `payload` for delivery to `target` at `timestamp`.
    ///
    /// Fails with [`KernelError::ScheduleInPast`] if `timestamp < current_time()`;
    /// this is a programmer error per spec.md §7, never a protocol-level
    /// condition.
    pub fn schedule(
        &mut self,
        timestamp: SimTime,
        target: ActorId,
        payload: EventPayload,
    ) -> Result<(), KernelError> {
        self.validate_target(target)?;
        if timestamp < self.now {
            return Err(KernelError::ScheduleInPast {
                current: self.now.0,
                requested: timestamp.0,
            });
        }
        let priority = payload.priority();
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        trace!(?target, ?timestamp, ?priority, sequence, "scheduling event");
        self.queue.push(Event {
            timestamp,
            priority,
            sequence,
            target,
            payload,
        });
        Ok(())
    }

    /// Schedules `payload` for delivery `delay_secs` after the current time.
    pub fn schedule_after(
        &mut self,
        delay_secs: f64,
        target: ActorId,
        payload: EventPayload,
    ) -> Result<(), KernelError> {
        let timestamp = self.now.checked_add_secs(delay_secs);
        self.schedule(timestamp, target, payload)
    }

    /// Shorthand for an immediate self-addressed command (spec.md §4.1
    /// `deliver_command`).
    pub fn deliver_command(
        &mut self,
        target: ActorId,
        command: crate::protocol::Command,
    ) -> Result<(), KernelError> {
        self.schedule(self.now, target, EventPayload::Command(command))
    }

    /// Pops and returns the next event in `(timestamp, priority, sequence)`
    /// order, advancing `current_time` to its timestamp. `None` when the
    /// queue is empty.
    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.queue.pop()?;
        self.now = event.timestamp;
        Some(event)
    }

    /// Pops the next event only if its timestamp does not exceed `until`;
    /// otherwise leaves the queue untouched and returns `None`.
    pub fn pop_until(&mut self, until: SimTime) -> Option<Event> {
        if self.queue.peek()?.timestamp > until {
            return None;
        }
        self.pop_next()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use crate::types::RequestId;

    fn timeout(request_id: u64) -> EventPayload {
        EventPayload::Command(Command::RequestTimeout {
            request_id: RequestId(request_id),
        })
    }

    #[test]
    fn schedule_in_past_rejected() {
        let mut kernel = Kernel::new(1, 4);
        kernel
            .schedule(SimTime::from_secs_f64(5.0), ActorId::node(0), timeout(0))
            .unwrap();
        kernel.pop_next();
        let err = kernel
            .schedule(SimTime::from_secs_f64(1.0), ActorId::node(0), timeout(1))
            .unwrap_err();
        assert_eq!(
            err,
            KernelError::ScheduleInPast {
                current: SimTime::from_secs_f64(5.0).0,
                requested: SimTime::from_secs_f64(1.0).0,
            }
        );
    }

    #[test]
    fn unknown_actor_rejected() {
        let mut kernel = Kernel::new(1, 4);
        let err = kernel
            .schedule(SimTime::ZERO, ActorId::node(99), timeout(0))
            .unwrap_err();
        assert_eq!(err, KernelError::UnknownActor);
    }

    #[test]
    fn block_producer_id_always_valid() {
        let mut kernel = Kernel::new(1, 0);
        kernel
            .schedule(SimTime::ZERO, BLOCK_PRODUCER_ID, timeout(0))
            .unwrap();
    }

    #[test]
    fn duplicate_actor_registration_rejected() {
        let mut kernel = Kernel::new(1, 4);
        kernel.register_actor(ActorId::node(0)).unwrap();
        let err = kernel.register_actor(ActorId::node(0)).unwrap_err();
        assert_eq!(err, KernelError::DuplicateActor);
    }

    #[test]
    fn distinct_actors_register_independently() {
        let mut kernel = Kernel::new(1, 4);
        kernel.register_actor(ActorId::node(0)).unwrap();
        kernel.register_actor(ActorId::node(1)).unwrap();
        kernel.register_actor(BLOCK_PRODUCER_ID).unwrap();
    }

    #[test]
    fn deterministic_rng_stream_reproducible_from_seed() {
        use rand::RngCore;
        let mut a = Kernel::new(42, 1);
        let mut b = Kernel::new(42, 1);
        let draws_a: Vec<u64> = (0..8).map(|_| a.rng().next_u64()).collect();
        let draws_b: Vec<u64> = (0..8).map(|_| b.rng().next_u64()).collect();
        assert_eq!(draws_a, draws_b, "same seed must produce the same RNG stream");
    }

    #[test]
    fn pop_until_respects_horizon() {
        let mut kernel = Kernel::new(1, 2);
        kernel
            .schedule(SimTime::from_secs_f64(10.0), ActorId::node(0), timeout(0))
            .unwrap();
        assert!(kernel.pop_until(SimTime::from_secs_f64(5.0)).is_none());
        assert!(kernel.pop_until(SimTime::from_secs_f64(10.0)).is_some());
    }
}
