//! ringsim - Discrete event simulator for the ringrange protocol.
//!
//! Runs a whole ring of ranging nodes in one process, against a model of
//! the radio medium, without real-time delays. Every node is the unmodified
//! `ringrange::Node` state machine driven through its event handlers.
//!
//! # Features
//!
//! - **Discrete events**: deterministic ordering, nanosecond scheduling
//! - **Radio physics**: picosecond time of flight between node positions
//! - **Device clocks**: per-node 40-bit counters with offset and crystal drift
//! - **Link faults**: loss, corruption, outages, partitions, moving nodes
//! - **Metrics**: hand-off history, initiator count, matrix snapshots
//!
//! # Example
//!
//! ```
//! use ringsim::{square_scenario, Duration};
//!
//! // Four nodes on a 5 m square, crystals off by up to 20 ppm.
//! let result = square_scenario()
//!     .with_seed(7)
//!     .with_random_drift(20.0)
//!     .run_for(Duration::from_secs(15))?;
//!
//! // After two laps every node holds the full matrix.
//! assert!(result.converged(0.1));
//! # Ok::<(), ringsim::SimError>(())
//! ```
//!
//! # Architecture
//!
//! Events sit in a priority queue ordered by (time, sequence number). The
//! main loop pops the next event, advances simulated time, calls the node
//! handler (`boot`, `handle_frame`, `handle_wake`), then collects the
//! node's transmissions and schedules one delivery per reachable neighbour.
//!
//! The receive timeout and the inter-exchange pause become `Wake` events
//! tagged with the node's wait epoch, so a wake-up for a wait that already
//! ended is dropped.

pub mod error;
pub mod event;
pub mod metrics;
pub mod node;
pub mod scenario;
pub mod sim;
pub mod topology;

// Re-export main types
pub use error::SimError;
pub use event::{Event, ScenarioAction, ScheduledEvent};
pub use metrics::{Handoff, MatrixSnapshot, SimMetrics, SimulationResult};
pub use node::{DeviceClock, RadioError, SimNode, SimRadio, Transmission};
pub use ringrange::{CompactConfig, DefaultConfig, Duration, NodeId, Timestamp};
pub use scenario::{square_scenario, ScenarioBuilder};
pub use sim::Simulator;
pub use topology::{Link, Position, Topology};

#[cfg(test)]
mod tests {
    use super::*;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn assert_close(actual: Option<f64>, expected: f64, tolerance: f64) {
        let actual = actual.unwrap();
        assert!(
            (actual - expected).abs() < tolerance,
            "expected {expected} got {actual}"
        );
    }

    #[test]
    fn test_handoff_carries_committed_rows() {
        init_logging();
        let mut sim = ScenarioBuilder::<CompactConfig>::new().build().unwrap();
        sim.run_until_handoffs(2, Timestamp::from_secs(1));
        // Let the token reach node 2.
        sim.run_for(Duration::from_micros(1));

        let truth = sim.true_matrix();
        let matrix = sim.node(2).unwrap().matrix();
        for (i, j) in [(0, 1), (0, 2), (1, 0), (1, 2)] {
            assert_close(matrix.get(i, j), truth.get(i, j).unwrap(), 0.05);
        }
        assert!(matrix.is_row_default(2));
        assert_eq!(sim.initiators(), vec![2]);
    }

    #[test]
    fn test_square_converges_with_drift() {
        init_logging();
        let result = square_scenario()
            .with_random_drift(20.0)
            .run_for(Duration::from_secs(15))
            .unwrap();

        assert!(result.converged(0.1), "error {}", result.final_max_error());
        assert!(result.metrics.node_errors.is_empty());
    }

    #[test]
    fn test_token_follows_ring() {
        init_logging();
        let result = square_scenario()
            .run_until_handoffs(8, Timestamp::from_secs(30))
            .unwrap();

        assert_eq!(result.handoff_count(), 8);
        assert!(result.metrics.handoffs_follow_ring(4));
        assert_eq!(result.metrics.max_concurrent_initiators, 1);
        assert_eq!(result.metrics.handoffs[0].from, 0);
        // 3 ranges per lap per node, two laps.
        assert_eq!(result.metrics.ranges_measured, 24);
    }

    #[test]
    fn test_lost_handoff_stalls_ring() {
        init_logging();
        let mut sim = ScenarioBuilder::<CompactConfig>::new()
            .with_link_loss(1, 2, 1.0)
            .build()
            .unwrap();
        let result = sim.run_for(Duration::from_secs(1));

        assert_eq!(result.handoff_count(), 2);
        assert!(sim.initiators().is_empty());
        assert!(result.queue_exhausted);
        assert_eq!(sim.node(1).unwrap().metrics().timeouts, 1);
    }

    #[test]
    fn test_stale_entry_survives_outage() {
        init_logging();
        let outage = Timestamp::from_secs(3);
        let mut sim = square_scenario()
            .disable_link_at(outage, 0, 2)
            .move_node_at(outage, 2, Position::new(0.0, 8.0, 0.0))
            .build()
            .unwrap();
        let result = sim.run_for(Duration::from_secs(20));

        assert!(result.handoff_count() >= 8);
        assert!(result.metrics.handoffs_follow_ring(4));
        assert!(sim.node(0).unwrap().metrics().timeouts >= 1);

        let matrix = sim.node(0).unwrap().matrix();
        // Measured before the outage, kept since.
        assert_close(matrix.get(0, 2), 5.0, 0.05);
        // Node 2 never reached node 0 after moving.
        assert_eq!(matrix.get(2, 0), Some(0.0));
        assert_close(matrix.get(3, 2), 34.0f64.sqrt(), 0.05);
    }

    #[test]
    fn test_failed_radio_halts_node() {
        init_logging();
        let mut sim = ScenarioBuilder::<CompactConfig>::new()
            .with_failed_radio(2)
            .build()
            .unwrap();
        let result = sim.run_for(Duration::from_secs(1));

        assert!(matches!(
            result.metrics.node_errors.as_slice(),
            [(_, SimError::Node { node: 2, .. })]
        ));
        assert!(sim.node(2).unwrap().is_halted());
        // Node 1 hands the token to the dead node.
        assert_eq!(result.handoff_count(), 2);
        assert!(sim.initiators().is_empty());
    }

    #[test]
    fn test_slow_responder_misses_reply_slot() {
        init_logging();
        let mut sim = ScenarioBuilder::<CompactConfig>::new()
            .with_processing_delay(1, Duration::from_millis(1))
            .build()
            .unwrap();
        let result = sim.run_for(Duration::from_millis(100));

        assert!(sim.node(1).unwrap().metrics().late_tx >= 1);
        assert_eq!(sim.node(1).unwrap().metrics().responses_sent, 0);
        assert_eq!(sim.node(0).unwrap().inner().row()[1], 0.0);
        // The ring keeps turning without node 1's replies.
        assert!(result.handoff_count() >= 3);
        assert!(result.metrics.handoffs_follow_ring(3));
    }

    #[test]
    fn test_same_seed_same_run() {
        init_logging();
        let run = || {
            ScenarioBuilder::<CompactConfig>::new()
                .with_seed(99)
                .with_loss_rate(0.2)
                .run_for(Duration::from_millis(200))
                .unwrap()
        };
        let (a, b) = (run(), run());

        assert_eq!(a.metrics.handoffs, b.metrics.handoffs);
        assert_eq!(a.metrics.frames_sent, b.metrics.frames_sent);
        assert_eq!(a.metrics.frames_dropped, b.metrics.frames_dropped);
    }
}
