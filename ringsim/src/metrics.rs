//! Metrics collection for simulation analysis.

use ringrange::debug::{DebugEvent, RoleKind};
use ringrange::{ConnectivityMatrix, NodeId, Timestamp};

use crate::error::SimError;

/// Every node's matrix at a point in time.
#[derive(Debug, Clone)]
pub struct MatrixSnapshot {
    /// When this snapshot was taken.
    pub time: Timestamp,
    /// Indexed by node id.
    pub matrices: Vec<ConnectivityMatrix>,
    /// Nodes in the initiator role.
    pub initiators: Vec<NodeId>,
}

impl MatrixSnapshot {
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            matrices: Vec::new(),
            initiators: Vec::new(),
        }
    }

    /// Record a node's state. Nodes must be recorded in id order.
    pub fn record_node(&mut self, matrix: ConnectivityMatrix, is_initiator: bool) {
        if is_initiator {
            self.initiators.push(self.matrices.len() as NodeId);
        }
        self.matrices.push(matrix);
    }

    pub fn matrix(&self, node: NodeId) -> Option<&ConnectivityMatrix> {
        self.matrices.get(node as usize)
    }

    /// Check if all nodes hold the same matrix.
    pub fn all_agree(&self) -> bool {
        self.matrices.windows(2).all(|w| w[0] == w[1])
    }

    /// Largest off-diagonal deviation from `truth` over all nodes.
    ///
    /// Unmeasured cells count with their default value, so a matrix that is
    /// still filling up shows a large error.
    pub fn max_error(&self, truth: &ConnectivityMatrix) -> f64 {
        let n = truth.dimension();
        let mut worst = 0.0f64;
        for matrix in &self.matrices {
            for i in 0..n {
                for j in (0..n).filter(|&j| j != i) {
                    let (Some(measured), Some(actual)) = (matrix.get(i, j), truth.get(i, j))
                    else {
                        return f64::INFINITY;
                    };
                    worst = worst.max((measured - actual).abs());
                }
            }
        }
        worst
    }
}

/// The token moving from one node to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handoff {
    pub time: Timestamp,
    pub from: NodeId,
    pub to: NodeId,
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Frames put on the air.
    pub frames_sent: u64,
    /// Frame copies handed to a listening receiver intact.
    pub frames_delivered: u64,
    /// Frame copies lost on the link.
    pub frames_dropped: u64,
    /// Frame copies that reached a receiver with a bad checksum.
    pub frames_corrupted: u64,
    /// Frame copies that arrived while the receiver was off.
    pub frames_missed: u64,
    /// Every hand-off, in transmission order.
    pub handoffs: Vec<Handoff>,
    /// Every time a node took the initiator role.
    pub initiator_history: Vec<(Timestamp, NodeId)>,
    /// Most nodes ever in the initiator role at once.
    pub max_concurrent_initiators: usize,
    /// Distances recorded by initiators.
    pub ranges_measured: u64,
    /// Nodes that failed to power on.
    pub node_errors: Vec<(Timestamp, SimError)>,
    /// Matrix snapshots taken at intervals.
    pub snapshots: Vec<MatrixSnapshot>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_snapshot(&mut self, snapshot: MatrixSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn latest_snapshot(&self) -> Option<&MatrixSnapshot> {
        self.snapshots.last()
    }

    /// Fold a node's trace events into the counters.
    pub fn record_events(&mut self, node: NodeId, events: &[DebugEvent]) {
        for event in events {
            match *event {
                DebugEvent::HandoffSent { timestamp, to } => self.handoffs.push(Handoff {
                    time: timestamp,
                    from: node,
                    to,
                }),
                DebugEvent::RoleAssigned {
                    timestamp,
                    role: RoleKind::Initiator,
                } => self.initiator_history.push((timestamp, node)),
                DebugEvent::RangeMeasured { .. } => self.ranges_measured += 1,
                _ => {}
            }
        }
    }

    pub fn observe_initiators(&mut self, count: usize) {
        self.max_concurrent_initiators = self.max_concurrent_initiators.max(count);
    }

    /// Check that every hand-off went to `(from + 1) mod n` and picked up
    /// where the previous one left off.
    pub fn handoffs_follow_ring(&self, n: usize) -> bool {
        let successor = |id: NodeId| ((id as usize + 1) % n) as NodeId;
        self.handoffs.iter().all(|h| h.to == successor(h.from))
            && self.handoffs.windows(2).all(|w| w[1].from == w[0].to)
    }

    /// First snapshot time at which every matrix is within `tolerance`
    /// metres of `truth`.
    pub fn convergence_time(&self, truth: &ConnectivityMatrix, tolerance: f64) -> Option<Timestamp> {
        self.snapshots
            .iter()
            .find(|s| s.max_error(truth) <= tolerance)
            .map(|s| s.time)
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Final simulation time.
    pub end_time: Timestamp,
    /// Collected metrics.
    pub metrics: SimMetrics,
    /// True pairwise distances at the end of the run.
    pub truth: ConnectivityMatrix,
    /// Whether simulation ended due to event queue exhaustion (vs time limit).
    pub queue_exhausted: bool,
}

impl SimulationResult {
    /// Largest deviation of any node's final matrix from the geometry.
    pub fn final_max_error(&self) -> f64 {
        self.metrics
            .latest_snapshot()
            .map(|s| s.max_error(&self.truth))
            .unwrap_or(f64::INFINITY)
    }

    /// Check if every node ended with the true matrix, within `tolerance`.
    pub fn converged(&self, tolerance: f64) -> bool {
        self.final_max_error() <= tolerance
    }

    pub fn handoff_count(&self) -> usize {
        self.metrics.handoffs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(cells: [f64; 4]) -> ConnectivityMatrix {
        ConnectivityMatrix::from_cells(2, cells.to_vec()).unwrap()
    }

    #[test]
    fn test_snapshot_agreement_and_error() {
        let truth = matrix([0.0, 2.0, 2.0, 0.0]);
        let mut snapshot = MatrixSnapshot::new(Timestamp::ZERO);
        snapshot.record_node(matrix([0.0, 2.05, 1.98, 0.0]), true);
        snapshot.record_node(matrix([0.0, 2.05, 1.98, 0.0]), false);

        assert!(snapshot.all_agree());
        assert_eq!(snapshot.initiators, vec![0]);
        let err = snapshot.max_error(&truth);
        assert!((err - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_unmeasured_cells_count_as_error() {
        let truth = matrix([0.0, 2.0, 2.0, 0.0]);
        let mut snapshot = MatrixSnapshot::new(Timestamp::ZERO);
        snapshot.record_node(ConnectivityMatrix::new(2), false);
        assert_eq!(snapshot.max_error(&truth), 2.0);

        // Dimension mismatch never converges.
        let mut wrong = MatrixSnapshot::new(Timestamp::ZERO);
        wrong.record_node(ConnectivityMatrix::new(1), false);
        assert_eq!(wrong.max_error(&truth), f64::INFINITY);
    }

    #[test]
    fn test_record_events() {
        let mut metrics = SimMetrics::new();
        let t = Timestamp::from_millis(3);
        metrics.record_events(
            1,
            &[
                DebugEvent::RoleAssigned {
                    timestamp: t,
                    role: RoleKind::Initiator,
                },
                DebugEvent::RangeMeasured {
                    timestamp: t,
                    target: 0,
                    distance: 1.0,
                },
                DebugEvent::HandoffSent { timestamp: t, to: 2 },
                DebugEvent::RoleAssigned {
                    timestamp: t,
                    role: RoleKind::Responder,
                },
            ],
        );

        assert_eq!(metrics.initiator_history, vec![(t, 1)]);
        assert_eq!(metrics.ranges_measured, 1);
        assert_eq!(
            metrics.handoffs,
            vec![Handoff {
                time: t,
                from: 1,
                to: 2
            }]
        );
    }

    #[test]
    fn test_handoffs_follow_ring() {
        let mut metrics = SimMetrics::new();
        for (from, to) in [(0, 1), (1, 2), (2, 0), (0, 1)] {
            metrics.handoffs.push(Handoff {
                time: Timestamp::ZERO,
                from,
                to,
            });
        }
        assert!(metrics.handoffs_follow_ring(3));

        metrics.handoffs.push(Handoff {
            time: Timestamp::ZERO,
            from: 2,
            to: 0,
        });
        assert!(!metrics.handoffs_follow_ring(3));
    }

    #[test]
    fn test_convergence_time() {
        let truth = matrix([0.0, 2.0, 2.0, 0.0]);
        let mut metrics = SimMetrics::new();

        let mut s1 = MatrixSnapshot::new(Timestamp::from_secs(1));
        s1.record_node(ConnectivityMatrix::new(2), false);
        metrics.add_snapshot(s1);

        let mut s2 = MatrixSnapshot::new(Timestamp::from_secs(2));
        s2.record_node(matrix([0.0, 2.01, 2.0, 0.0]), false);
        metrics.add_snapshot(s2);

        assert_eq!(
            metrics.convergence_time(&truth, 0.1),
            Some(Timestamp::from_secs(2))
        );
    }
}
