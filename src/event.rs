//! Scheduled events and the tagged union of payloads they carry.
//!
//! Mirrors the teacher's `Event` (content hash, causal ordering) but the
//! thing being ordered here is simulated time, not a Minkowski interval:
//! `Event`s are ordered by `(timestamp, priority, sequence)` as required by
//! spec.md §3/§4.1, with `sequence` breaking ties in scheduling order.

use std::cmp::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{Command, Message};
use crate::types::ActorId;

/// Simulated time as whole nanoseconds since the run began.
///
/// A fixed-point representation is used instead of raw `f64` seconds so that
/// `SimTime` can derive a total order (`f64` cannot, because of `NaN`) and
/// so that two runs with identical inputs produce bit-identical schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub fn from_secs_f64(secs: f64) -> Self {
        debug_assert!(secs.is_finite() && secs >= 0.0, "non-finite or negative sim time");
        SimTime((secs * 1_000_000_000.0).round() as u64)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_nanos(self.0)
    }

    pub fn checked_add_secs(self, secs: f64) -> Self {
        SimTime(self.0 + (secs.max(0.0) * 1_000_000_000.0).round() as u64)
    }
}

/// Priority band for events scheduled at the same timestamp.
///
/// Messages (network deliveries) are dispatched before commands (local
/// timers) at a tied timestamp, per spec.md §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Message = 0,
    Command = 1,
}

/// The tagged union of everything an actor's single entry point can receive.
#[derive(Debug, Clone)]
pub enum EventPayload {
    Message(Message),
    Command(Command),
}

impl EventPayload {
    pub fn priority(&self) -> Priority {
        match self {
            EventPayload::Message(_) => Priority::Message,
            EventPayload::Command(_) => Priority::Command,
        }
    }

    /// Size in bytes for bandwidth accounting; commands never traverse the
    /// network and are always zero (spec.md §3).
    pub fn size_bytes(&self) -> u64 {
        match self {
            EventPayload::Message(m) => m.size_bytes(),
            EventPayload::Command(_) => 0,
        }
    }
}

/// A scheduled event in the kernel's priority queue.
///
/// Total order is `(timestamp, priority, sequence)`; `sequence` is a
/// monotonic counter assigned at scheduling time so that FIFO order is
/// preserved among otherwise-tied events.
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: SimTime,
    pub priority: Priority,
    pub sequence: u64,
    pub target: ActorId,
    pub payload: EventPayload,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.priority == other.priority
            && self.sequence == other.sequence
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // `BinaryHeap` is a max-heap; reverse the natural order so the
        // earliest (timestamp, priority, sequence) pops first.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use std::collections::BinaryHeap;

    fn cmd_event(t: f64, priority: Priority, seq: u64) -> Event {
        Event {
            timestamp: SimTime::from_secs_f64(t),
            priority,
            sequence: seq,
            target: ActorId::node(0),
            payload: EventPayload::Command(Command::RequestTimeout {
                request_id: crate::types::RequestId(0),
            }),
        }
    }

    #[test]
    fn pops_earliest_timestamp_first() {
        let mut heap = BinaryHeap::new();
        heap.push(cmd_event(5.0, Priority::Command, 0));
        heap.push(cmd_event(1.0, Priority::Command, 1));
        heap.push(cmd_event(3.0, Priority::Command, 2));

        let first = heap.pop().unwrap();
        assert_eq!(first.timestamp, SimTime::from_secs_f64(1.0));
    }

    #[test]
    fn messages_before_commands_at_tied_timestamp() {
        let mut heap = BinaryHeap::new();
        heap.push(cmd_event(1.0, Priority::Command, 0));
        heap.push(cmd_event(1.0, Priority::Message, 1));

        let first = heap.pop().unwrap();
        assert_eq!(first.priority, Priority::Message, "messages must win ties");
    }

    #[test]
    fn sequence_breaks_ties_fifo() {
        let mut heap = BinaryHeap::new();
        heap.push(cmd_event(1.0, Priority::Command, 3));
        heap.push(cmd_event(1.0, Priority::Command, 1));
        heap.push(cmd_event(1.0, Priority::Command, 2));

        assert_eq!(heap.pop().unwrap().sequence, 1);
        assert_eq!(heap.pop().unwrap().sequence, 2);
        assert_eq!(heap.pop().unwrap().sequence, 3);
    }
}
