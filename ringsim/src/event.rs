//! Event types and priority queue ordering for the discrete event simulation.

use std::cmp::Ordering;

use ringrange::{NodeId, Timestamp};

use crate::topology::Position;

/// Unique sequence number for deterministic event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioAction {
    /// Isolate groups of nodes from each other.
    Partition { groups: Vec<Vec<NodeId>> },
    /// Re-enable every link.
    HealPartition,
    /// Disable the link between two nodes.
    DisableLink { a: NodeId, b: NodeId },
    /// Enable the link between two nodes.
    EnableLink { a: NodeId, b: NodeId },
    /// Set the frame loss rate of a link.
    SetLossRate { a: NodeId, b: NodeId, rate: f64 },
    /// Set the rate at which a link delivers corrupted frames.
    SetCorruptionRate { a: NodeId, b: NodeId, rate: f64 },
    /// Move a node; later exchanges see the new geometry.
    MoveNode { node: NodeId, position: Position },
    /// Record every node's matrix.
    TakeSnapshot,
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// Power-on: configure the radio and assign the boot role.
    Start { node: NodeId },
    /// A frame reaches a node's antenna.
    Delivery {
        to: NodeId,
        from: NodeId,
        data: Vec<u8>,
        /// Exact arrival instant in picoseconds.
        arrival_ps: f64,
        /// The receiver will report a frame error instead of the data.
        corrupted: bool,
    },
    /// A node's pending timeout or pause ends.
    ///
    /// Ignored if the node has replaced its wait since (`epoch` is stale).
    Wake { node: NodeId, epoch: u32 },
    /// Execute a scenario action.
    ScenarioAction(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// When the event should occur.
    pub time: Timestamp,
    /// Tie-breaker for same-time events: first scheduled, first processed.
    pub seq: SequenceNumber,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

// BinaryHeap is a max-heap, so the ordering is reversed.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}
