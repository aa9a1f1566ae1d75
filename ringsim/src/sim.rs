//! Discrete event simulator for the ringrange protocol.

use std::collections::BinaryHeap;

use log::{debug, trace, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use ringrange::config::{DefaultConfig, NetworkConfig, RadioConfig};
use ringrange::{ConnectivityMatrix, Duration, NodeId, Timestamp};

use crate::error::SimError;
use crate::event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::metrics::{MatrixSnapshot, SimMetrics, SimulationResult};
use crate::node::{DeviceClock, SimNode, SimRadio, Transmission};
use crate::topology::Topology;

/// Discrete event simulator for a ring of `C::NUM_NODES` nodes.
pub struct Simulator<C: NetworkConfig = DefaultConfig> {
    /// Indexed by node id.
    nodes: Vec<SimNode<C>>,
    topology: Topology,
    current_time: Timestamp,
    event_queue: BinaryHeap<ScheduledEvent>,
    metrics: SimMetrics,
    next_seq: u64,
    /// Drives frame loss and corruption.
    rng: ChaCha8Rng,
    snapshot_interval: Option<Duration>,
    next_snapshot: Option<Timestamp>,
}

impl<C: NetworkConfig> Simulator<C> {
    /// Create one node per topology position, all powering on at time zero.
    pub fn new(topology: Topology, seed: u64) -> Result<Self, SimError> {
        if topology.num_nodes() != C::NUM_NODES {
            return Err(SimError::NodeCount {
                expected: C::NUM_NODES,
                actual: topology.num_nodes(),
            });
        }

        let radio_config = RadioConfig::for_network::<C>();
        let nodes = (0..C::NUM_NODES)
            .map(|id| {
                SimNode::new(
                    id as NodeId,
                    SimRadio::new(DeviceClock::ideal()),
                    radio_config.clone(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut sim = Self {
            nodes,
            topology,
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            snapshot_interval: None,
            next_snapshot: None,
        };
        for id in 0..C::NUM_NODES {
            sim.schedule(Timestamp::ZERO, Event::Start { node: id as NodeId });
        }
        Ok(sim)
    }

    /// Set the snapshot interval for automatic matrix recording.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.current_time + interval);
        self
    }

    pub fn node(&self, id: NodeId) -> Option<&SimNode<C>> {
        self.nodes.get(id as usize)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SimNode<C>> {
        self.nodes.get_mut(id as usize)
    }

    fn node_or_err(&mut self, id: NodeId) -> Result<&mut SimNode<C>, SimError> {
        self.nodes.get_mut(id as usize).ok_or(SimError::UnknownNode(id))
    }

    /// Give a node's transceiver its own counter offset and drift.
    pub fn set_device_clock(&mut self, id: NodeId, clock: DeviceClock) -> Result<(), SimError> {
        self.node_or_err(id)?.radio_mut().set_device_clock(clock);
        Ok(())
    }

    /// Delay between a frame's arrival and the node's handler running.
    pub fn set_processing_delay(&mut self, id: NodeId, delay: Duration) -> Result<(), SimError> {
        self.node_or_err(id)?.radio_mut().set_processing_delay(delay);
        Ok(())
    }

    /// Make a node's radio refuse its configuration at power-on.
    pub fn fail_configuration(&mut self, id: NodeId) -> Result<(), SimError> {
        self.node_or_err(id)?.radio_mut().reject_configuration();
        Ok(())
    }

    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    /// Nodes currently holding the token.
    pub fn initiators(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_initiator())
            .map(|n| n.node_id())
            .collect()
    }

    /// True pairwise distances for the current positions.
    pub fn true_matrix(&self) -> ConnectivityMatrix {
        let n = self.nodes.len();
        let cells = (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .map(|(i, j)| {
                self.topology
                    .distance(i as NodeId, j as NodeId)
                    .unwrap_or(f64::INFINITY)
            })
            .collect();
        ConnectivityMatrix::from_cells(n, cells).unwrap_or_else(|| ConnectivityMatrix::new(n))
    }

    /// Schedule an event.
    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    /// Schedule a scenario action.
    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    /// Run simulation until specified time.
    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while self.event_queue.peek().is_some_and(|e| e.time <= end_time) {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.step_event(event);
        }
        self.advance_time(end_time);
        self.finish()
    }

    /// Run simulation for specified duration.
    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    /// Run until `count` hand-offs have happened in total, or `limit` is
    /// reached.
    pub fn run_until_handoffs(&mut self, count: usize, limit: Timestamp) -> SimulationResult {
        while self.metrics.handoffs.len() < count
            && self.event_queue.peek().is_some_and(|e| e.time <= limit)
        {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.step_event(event);
        }
        self.finish()
    }

    fn step_event(&mut self, event: ScheduledEvent) {
        self.advance_time(event.time);
        self.process_event(event.event);
        self.maybe_take_snapshot();
    }

    fn finish(&mut self) -> SimulationResult {
        self.take_snapshot();
        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            truth: self.true_matrix(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::Start { node } => self.start_node(node),
            Event::Delivery {
                to,
                from,
                data,
                arrival_ps,
                corrupted,
            } => self.deliver(to, from, data, arrival_ps, corrupted),
            Event::Wake { node, epoch } => self.wake(node, epoch),
            Event::ScenarioAction(action) => self.execute_action(action),
        }
    }

    fn start_node(&mut self, id: NodeId) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(id as usize) else {
            return;
        };
        if let Err(e) = node.boot(now) {
            warn!("node {}: failed to power on: {}", id, e);
            node.halt();
            self.metrics.node_errors.push((
                now,
                SimError::Node {
                    node: id,
                    message: e.to_string(),
                },
            ));
        }
        self.after_handler(id);
    }

    fn deliver(&mut self, to: NodeId, from: NodeId, data: Vec<u8>, arrival_ps: f64, corrupted: bool) {
        let now = self.current_time;
        let sender_clock = match self.nodes.get(from as usize) {
            Some(n) => *n.radio().device_clock(),
            None => return,
        };
        let Some(node) = self.nodes.get_mut(to as usize) else {
            return;
        };
        if !node.is_listening(arrival_ps) {
            self.metrics.frames_missed += 1;
            trace!("node {}: receiver off, frame from {} missed", to, from);
            return;
        }

        if corrupted {
            self.metrics.frames_corrupted += 1;
            node.handle_frame_error(now, arrival_ps);
        } else {
            self.metrics.frames_delivered += 1;
            let ratio = DeviceClock::offset_ratio(node.radio().device_clock(), &sender_clock);
            node.handle_frame(now, arrival_ps, data, ratio);
        }
        self.after_handler(to);
    }

    fn wake(&mut self, id: NodeId, epoch: u32) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(id as usize) else {
            return;
        };
        if node.is_halted() {
            return;
        }
        node.handle_wake(now, epoch);
        self.after_handler(id);
    }

    /// Bookkeeping after any node handler: trace events, transmissions and
    /// the next wake-up.
    fn after_handler(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id as usize) else {
            return;
        };

        let events = node.take_debug_events();
        let outgoing = node.take_outgoing();
        let wake = node.next_wake();

        self.metrics.record_events(id, &events);
        for tx in outgoing {
            self.broadcast(id, tx);
        }
        if let Some((at, epoch)) = wake {
            self.schedule(at, Event::Wake { node: id, epoch });
        }

        let initiators = self.nodes.iter().filter(|n| n.is_initiator()).count();
        self.metrics.observe_initiators(initiators);
    }

    /// Put a frame on the air towards every node with an active link.
    fn broadcast(&mut self, sender: NodeId, tx: Transmission) {
        self.metrics.frames_sent += 1;

        for neighbor in self.topology.neighbors(sender) {
            let Some(link) = self.topology.get_link(sender, neighbor) else {
                continue;
            };
            let (loss_rate, corruption_rate) = (link.loss_rate(), link.corruption_rate());
            let Some(flight_ps) = self.topology.propagation_ps(sender, neighbor) else {
                continue;
            };

            if loss_rate > 0.0 && self.rng.random_bool(loss_rate) {
                self.metrics.frames_dropped += 1;
                continue;
            }
            let corrupted = corruption_rate > 0.0 && self.rng.random_bool(corruption_rate);

            let arrival_ps = tx.departure_ps + flight_ps;
            let at = Timestamp::from_nanos((arrival_ps / 1000.0).ceil() as u64);
            self.schedule(
                at,
                Event::Delivery {
                    to: neighbor,
                    from: sender,
                    data: tx.data.clone(),
                    arrival_ps,
                    corrupted,
                },
            );
        }
    }

    /// Execute a scenario action.
    fn execute_action(&mut self, action: ScenarioAction) {
        debug!("t={} ns: {:?}", self.current_time.as_nanos(), action);
        match action {
            ScenarioAction::Partition { groups } => self.topology.partition(&groups),
            ScenarioAction::HealPartition => self.topology.heal(),
            ScenarioAction::DisableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = false;
                }
            }
            ScenarioAction::EnableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { a, b, rate } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.set_loss_rate(rate);
                }
            }
            ScenarioAction::SetCorruptionRate { a, b, rate } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.set_corruption_rate(rate);
                }
            }
            ScenarioAction::MoveNode { node, position } => {
                if !self.topology.set_position(node, position) {
                    warn!("move of unknown node {} ignored", node);
                }
            }
            ScenarioAction::TakeSnapshot => self.take_snapshot(),
        }
    }

    fn maybe_take_snapshot(&mut self) {
        if let Some(next) = self.next_snapshot {
            if self.current_time >= next {
                self.take_snapshot();
                if let Some(interval) = self.snapshot_interval {
                    self.next_snapshot = Some(next + interval);
                }
            }
        }
    }

    /// Record every node's matrix.
    pub fn take_snapshot(&mut self) {
        let mut snapshot = MatrixSnapshot::new(self.current_time);
        for node in &self.nodes {
            snapshot.record_node(node.matrix().clone(), node.is_initiator());
        }
        self.metrics.add_snapshot(snapshot);
    }
}
