//! Scenario builder for setting up and running simulations.

use core::marker::PhantomData;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use ringrange::config::{DefaultConfig, NetworkConfig};
use ringrange::{DeviceTime, Duration, NodeId, Timestamp};

use crate::error::SimError;
use crate::event::ScenarioAction;
use crate::metrics::SimulationResult;
use crate::node::DeviceClock;
use crate::sim::Simulator;
use crate::topology::{Position, Topology};

/// How nodes are placed.
#[derive(Debug, Clone)]
enum Layout {
    /// On the x axis, evenly spaced.
    Line { spacing: f64 },
    /// Row by row on a grid.
    Grid { columns: usize, spacing: f64 },
    /// Explicit positions, indexed by node id.
    Positions(Vec<Position>),
    /// Custom topology provided by user.
    Custom(Topology),
}

/// Builder for simulation scenarios.
///
/// The ring size comes from the configuration `C`.
pub struct ScenarioBuilder<C: NetworkConfig = DefaultConfig> {
    /// RNG seed for the medium and for random clock drift.
    seed: u64,
    layout: Layout,
    loss_rate: f64,
    corruption_rate: f64,
    /// Draw every node's drift uniformly from `-max..=max` ppm.
    max_drift_ppm: Option<f64>,
    clocks: Vec<(NodeId, DeviceClock)>,
    processing_delays: Vec<(NodeId, Duration)>,
    failed_radios: Vec<NodeId>,
    link_losses: Vec<(NodeId, NodeId, f64)>,
    actions: Vec<(Timestamp, ScenarioAction)>,
    snapshot_interval: Option<Duration>,
    _config: PhantomData<C>,
}

impl<C: NetworkConfig> Default for ScenarioBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: NetworkConfig> ScenarioBuilder<C> {
    /// Nodes two metres apart on a line, ideal clocks, lossless links.
    pub fn new() -> Self {
        Self {
            seed: 42,
            layout: Layout::Line { spacing: 2.0 },
            loss_rate: 0.0,
            corruption_rate: 0.0,
            max_drift_ppm: None,
            clocks: Vec::new(),
            processing_delays: Vec::new(),
            failed_radios: Vec::new(),
            link_losses: Vec::new(),
            actions: Vec::new(),
            snapshot_interval: None,
            _config: PhantomData,
        }
    }

    /// Set the RNG seed for deterministic simulation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn line(mut self, spacing: f64) -> Self {
        self.layout = Layout::Line { spacing };
        self
    }

    pub fn grid(mut self, columns: usize, spacing: f64) -> Self {
        self.layout = Layout::Grid { columns, spacing };
        self
    }

    pub fn positions(mut self, positions: Vec<Position>) -> Self {
        self.layout = Layout::Positions(positions);
        self
    }

    /// Set a custom network topology.
    pub fn topology(mut self, topo: Topology) -> Self {
        self.layout = Layout::Custom(topo);
        self
    }

    /// Set global frame loss rate.
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set global frame corruption rate.
    pub fn with_corruption_rate(mut self, rate: f64) -> Self {
        self.corruption_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Loss rate of a single link, applied after the global rate.
    pub fn with_link_loss(mut self, a: NodeId, b: NodeId, rate: f64) -> Self {
        self.link_losses.push((a, b, rate));
        self
    }

    /// Random crystal drift and counter offset for every node.
    pub fn with_random_drift(mut self, max_ppm: f64) -> Self {
        self.max_drift_ppm = Some(max_ppm.abs());
        self
    }

    /// Fixed device clock for one node; overrides random drift.
    pub fn with_device_clock(mut self, node: NodeId, clock: DeviceClock) -> Self {
        self.clocks.push((node, clock));
        self
    }

    /// Host latency between a frame's arrival and the node reacting to it.
    pub fn with_processing_delay(mut self, node: NodeId, delay: Duration) -> Self {
        self.processing_delays.push((node, delay));
        self
    }

    /// The node's radio refuses its configuration at power-on.
    pub fn with_failed_radio(mut self, node: NodeId) -> Self {
        self.failed_radios.push(node);
        self
    }

    /// Set snapshot interval for metrics collection.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    /// Schedule a scenario action.
    pub fn action_at(mut self, time: Timestamp, action: ScenarioAction) -> Self {
        self.actions.push((time, action));
        self
    }

    pub fn disable_link_at(self, time: Timestamp, a: NodeId, b: NodeId) -> Self {
        self.action_at(time, ScenarioAction::DisableLink { a, b })
    }

    pub fn enable_link_at(self, time: Timestamp, a: NodeId, b: NodeId) -> Self {
        self.action_at(time, ScenarioAction::EnableLink { a, b })
    }

    pub fn move_node_at(self, time: Timestamp, node: NodeId, position: Position) -> Self {
        self.action_at(time, ScenarioAction::MoveNode { node, position })
    }

    /// Build the simulator with all nodes and topology.
    pub fn build(self) -> Result<Simulator<C>, SimError> {
        let n = C::NUM_NODES;
        let mut topo = match self.layout {
            Layout::Line { spacing } => Topology::line(n, spacing),
            Layout::Grid { columns, spacing } => Topology::grid(n, columns, spacing),
            Layout::Positions(positions) => Topology::new(positions),
            Layout::Custom(t) => t,
        };

        if self.loss_rate > 0.0 {
            topo.set_global_loss_rate(self.loss_rate);
        }
        if self.corruption_rate > 0.0 {
            topo.set_global_corruption_rate(self.corruption_rate);
        }
        for (a, b, rate) in self.link_losses {
            let link = topo.get_link_mut(a, b).ok_or(SimError::UnknownNode(a.max(b)))?;
            link.set_loss_rate(rate);
        }

        let mut sim = Simulator::<C>::new(topo, self.seed)?;
        if let Some(interval) = self.snapshot_interval {
            sim = sim.with_snapshot_interval(interval);
        }

        if let Some(max_ppm) = self.max_drift_ppm {
            // Separate stream from the medium's, so drift does not shift
            // loss patterns.
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ 0x5eed_c10c);
            for id in 0..n {
                let drift = if max_ppm > 0.0 {
                    rng.random_range(-max_ppm..=max_ppm)
                } else {
                    0.0
                };
                let offset = rng.random_range(0..=DeviceTime::MASK);
                sim.set_device_clock(id as NodeId, DeviceClock::new(offset, drift))?;
            }
        }
        for (id, clock) in self.clocks {
            sim.set_device_clock(id, clock)?;
        }
        for (id, delay) in self.processing_delays {
            sim.set_processing_delay(id, delay)?;
        }
        for id in self.failed_radios {
            sim.fail_configuration(id)?;
        }
        for (time, action) in self.actions {
            sim.schedule_action(time, action);
        }

        Ok(sim)
    }

    /// Build and run the simulation for the specified duration.
    pub fn run_for(self, duration: Duration) -> Result<SimulationResult, SimError> {
        let mut sim = self.build()?;
        Ok(sim.run_for(duration))
    }

    /// Build and run until `count` hand-offs or `limit`, whichever is first.
    pub fn run_until_handoffs(
        self,
        count: usize,
        limit: Timestamp,
    ) -> Result<SimulationResult, SimError> {
        let mut sim = self.build()?;
        Ok(sim.run_until_handoffs(count, limit))
    }
}

/// The deployed setup: four nodes on a 5 m square.
pub fn square_scenario() -> ScenarioBuilder<DefaultConfig> {
    ScenarioBuilder::new().grid(2, 5.0)
}

#[cfg(test)]
mod tests {
    use ringrange::CompactConfig;

    use super::*;

    #[test]
    fn test_scenario_builder_basic() {
        let sim = ScenarioBuilder::<CompactConfig>::new()
            .with_seed(123)
            .line(3.0)
            .build()
            .unwrap();
        assert_eq!(sim.topology().num_nodes(), 3);
        assert_eq!(sim.true_matrix().get(0, 2), Some(6.0));
    }

    #[test]
    fn test_wrong_position_count() {
        let err = ScenarioBuilder::<CompactConfig>::new()
            .positions(vec![Position::default(); 2])
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            SimError::NodeCount {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_loss_settings() {
        let sim = ScenarioBuilder::<CompactConfig>::new()
            .with_loss_rate(0.5)
            .with_link_loss(2, 0, 0.9)
            .build()
            .unwrap();
        assert_eq!(sim.topology().get_link(0, 1).unwrap().loss_rate(), 0.5);
        assert_eq!(sim.topology().get_link(0, 2).unwrap().loss_rate(), 0.9);
    }

    #[test]
    fn test_random_drift_is_deterministic() {
        let clocks = |seed| {
            let sim = ScenarioBuilder::<CompactConfig>::new()
                .with_seed(seed)
                .with_random_drift(20.0)
                .build()
                .unwrap();
            (0..3)
                .map(|id| *sim.node(id).unwrap().radio().device_clock())
                .collect::<Vec<_>>()
        };

        let a = clocks(1);
        assert_eq!(a, clocks(1));
        assert_ne!(a, clocks(2));
        assert!(a.iter().all(|c| c.drift_ppm().abs() <= 20.0));
    }

    #[test]
    fn test_fixed_clock_overrides_random() {
        let sim = ScenarioBuilder::<CompactConfig>::new()
            .with_random_drift(20.0)
            .with_device_clock(1, DeviceClock::new(5, -3.0))
            .build()
            .unwrap();
        assert_eq!(
            *sim.node(1).unwrap().radio().device_clock(),
            DeviceClock::new(5, -3.0)
        );
    }

    #[test]
    fn test_scheduled_link_outage() {
        let mut sim = ScenarioBuilder::<CompactConfig>::new()
            .disable_link_at(Timestamp::from_millis(1), 0, 2)
            .build()
            .unwrap();

        assert!(sim.topology().is_connected(0, 2));
        sim.run_for(Duration::from_millis(2));
        assert!(!sim.topology().is_connected(0, 2));
    }

    #[test]
    fn test_square_scenario() {
        let sim = square_scenario().build().unwrap();
        let d = sim.true_matrix().get(0, 3).unwrap();
        assert!((d - 50.0f64.sqrt()).abs() < 1e-12);
    }
}
