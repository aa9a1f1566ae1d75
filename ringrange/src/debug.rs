//! Debug events for protocol tracing.
//!
//! Every node owns a bounded channel of these events. Simulators and tests
//! drain it to follow the ranging rounds; on hardware nothing reads it and
//! new events are dropped once it is full.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::time::Timestamp;
use crate::types::NodeId;

/// Queue size for the debug event channel.
pub const DEBUG_QUEUE_SIZE: usize = 32;

/// Debug event channel type.
pub type DebugChannel = Channel<CriticalSectionRawMutex, DebugEvent, DEBUG_QUEUE_SIZE>;

/// Which side of the exchange a node is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Initiator,
    Responder,
}

/// Debug events emitted by the node for protocol tracing.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    /// Node took on a role.
    RoleAssigned { timestamp: Timestamp, role: RoleKind },
    /// Poll transmitted to a target.
    PollSent {
        timestamp: Timestamp,
        target: NodeId,
        seq: u8,
    },
    /// Response scheduled for a poll.
    ResponseSent {
        timestamp: Timestamp,
        to: NodeId,
        seq: u8,
    },
    /// Exchange completed and a distance was recorded.
    RangeMeasured {
        timestamp: Timestamp,
        target: NodeId,
        distance: f64,
    },
    /// No frame arrived before the response timeout.
    ExchangeTimedOut { timestamp: Timestamp, target: NodeId },
    /// Exchange dropped because of an unusable frame.
    ExchangeAbandoned {
        timestamp: Timestamp,
        target: NodeId,
        reason: &'static str,
    },
    /// Frame ignored without effect.
    FrameDiscarded {
        timestamp: Timestamp,
        reason: &'static str,
    },
    /// Delayed response could not be scheduled in time.
    DelayedTxMissed { timestamp: Timestamp, to: NodeId },
    /// The radio driver failed to transmit a frame for `to`.
    TxFailed { timestamp: Timestamp, to: NodeId },
    /// Own row copied into the matrix.
    RowCommitted { timestamp: Timestamp },
    /// Matrix replaced by a received snapshot.
    MatrixAdopted { timestamp: Timestamp, from: NodeId },
    /// Token passed on.
    HandoffSent { timestamp: Timestamp, to: NodeId },
    /// Token received.
    HandoffReceived { timestamp: Timestamp, from: NodeId },
}
