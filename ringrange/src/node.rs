//! Node implementation - the main protocol state machine.
//!
//! The Node struct holds all protocol state for one ring member. It is
//! event-driven: the owner tells it what happened (a receive completed, a
//! pause elapsed) and asks it what to wait for next. Two drivers exist:
//!
//! - [`Node::run`] blocks on the radio and clock, for firmware.
//! - A simulator calls [`Node::handle_rx`] / [`Node::handle_pause_elapsed`]
//!   directly and schedules wake-ups from [`Node::pending`].
//!
//! Role handlers live in sibling modules as further `impl Node` blocks:
//! `initiator` (ranging session and hand-off) and `responder`.
//!
//! # Usage
//!
//! ```ignore
//! let mut node = Node::<_, _, DefaultConfig>::new(radio, clock, 2, RadioConfig::default())?;
//!
//! // Only returns if the radio cannot be configured.
//! let err = node.run().unwrap_err();
//! ```

use core::convert::Infallible;
use core::marker::PhantomData;

use log::{debug, info, trace, warn};

use crate::config::{DefaultConfig, FrameCheck, NetworkConfig, RadioConfig};
use crate::debug::{DebugChannel, DebugEvent, RoleKind};
use crate::matrix::{ConnectivityMatrix, MatrixStore};
use crate::time::{DeviceTime, Duration, Timestamp};
use crate::traits::{Clock, Radio, RxOutcome};
use crate::types::{Error, NodeId, RangingMetrics, APP_NAME};

/// Step of an initiator's ranging session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Idle between exchanges.
    Pause,
    /// Poll sent, listening for the matching response.
    Awaiting {
        target: NodeId,
        seq: u8,
        poll_tx_ts: DeviceTime,
        deadline: Timestamp,
    },
}

/// Progress through one initiator round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Session {
    /// Lowest id not yet ranged this round.
    pub cursor: usize,
    pub phase: Phase,
}

/// Current role of the node.
///
/// Exactly one node in a healthy ring is `Initiator` at any time; it holds
/// the token until its round is finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Responder,
    Initiator(Session),
}

/// What the node is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pending {
    /// Receive a frame; `None` waits indefinitely.
    Listen { timeout: Option<Duration> },
    /// Sleep, then call `handle_pause_elapsed`.
    Pause { duration: Duration },
}

/// The main protocol node.
///
/// Generic over:
/// - `R`: Radio implementation
/// - `Clk`: Clock implementation
/// - `C`: Ring configuration
pub struct Node<R, Clk, C = DefaultConfig> {
    // Dependencies (injected)
    pub(crate) radio: R,
    pub(crate) clock: Clk,
    pub(crate) radio_config: RadioConfig,

    pub(crate) node_id: NodeId,
    pub(crate) store: MatrixStore,
    pub(crate) role: Role,
    /// Sequence number for the next poll or hand-off.
    pub(crate) seq: u8,
    wait_epoch: u32,

    pub(crate) metrics: RangingMetrics,
    debug: DebugChannel,

    _config: PhantomData<C>,
}

impl<R, Clk, C> Node<R, Clk, C>
where
    R: Radio,
    Clk: Clock,
    C: NetworkConfig,
{
    /// Create a node. Fails if `node_id` is not in `0..C::NUM_NODES`.
    pub fn new(
        radio: R,
        clock: Clk,
        node_id: NodeId,
        radio_config: RadioConfig,
    ) -> Result<Self, Error<R::Error>> {
        #[allow(clippy::let_unit_value)]
        let () = FrameCheck::<C>::OK;

        if node_id as usize >= C::NUM_NODES {
            return Err(Error::InvalidNodeId {
                id: node_id,
                num_nodes: C::NUM_NODES,
            });
        }

        Ok(Self {
            radio,
            clock,
            radio_config,
            node_id,
            store: MatrixStore::new(node_id, C::NUM_NODES),
            role: Role::Responder,
            seq: 0,
            wait_epoch: 0,
            metrics: RangingMetrics::new(),
            debug: DebugChannel::new(),
            _config: PhantomData,
        })
    }

    /// Get this node's ring index.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn is_initiator(&self) -> bool {
        matches!(self.role, Role::Initiator(_))
    }

    /// This node's copy of the shared matrix.
    pub fn matrix(&self) -> &ConnectivityMatrix {
        self.store.matrix()
    }

    /// Distances measured in the current or last round, not yet committed.
    pub fn row(&self) -> &[f64] {
        self.store.row()
    }

    /// Sequence number the next poll or hand-off will carry.
    pub fn seq(&self) -> u8 {
        self.seq
    }

    pub fn metrics(&self) -> &RangingMetrics {
        &self.metrics
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutable radio access, for simulators that feed timestamps in.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn clock(&self) -> &Clk {
        &self.clock
    }

    /// Protocol trace events.
    pub fn debug_channel(&self) -> &DebugChannel {
        &self.debug
    }

    /// Changes every time the pending wait is replaced.
    ///
    /// A scheduler that armed a timer for an earlier epoch can drop it.
    pub fn wait_epoch(&self) -> u32 {
        self.wait_epoch
    }

    /// What the node is waiting for right now.
    pub fn pending(&self) -> Pending {
        match self.role {
            Role::Responder => Pending::Listen { timeout: None },
            Role::Initiator(Session {
                phase: Phase::Pause,
                ..
            }) => Pending::Pause {
                duration: C::RANGING_DELAY,
            },
            Role::Initiator(Session {
                phase: Phase::Awaiting { deadline, .. },
                ..
            }) => Pending::Listen {
                timeout: Some(deadline.saturating_sub(self.clock.now())),
            },
        }
    }

    /// Configure the radio. A failure here is fatal for the node.
    pub fn initialize(&mut self) -> Result<(), Error<R::Error>> {
        info!("{}", APP_NAME);
        self.radio
            .configure(&self.radio_config)
            .map_err(Error::Configure)?;
        debug!(
            "node {}: radio configured, channel {}, {} nodes in ring",
            self.node_id,
            self.radio_config.channel,
            C::NUM_NODES
        );
        Ok(())
    }

    /// Assign the boot role: node 0 holds the token first.
    pub fn start(&mut self) {
        if self.node_id == 0 {
            self.begin_session();
        } else {
            self.become_responder();
        }
    }

    /// Handle a completed receive.
    pub fn handle_rx(&mut self, outcome: RxOutcome) {
        match self.role {
            Role::Responder => self.responder_rx(outcome),
            Role::Initiator(Session {
                phase: Phase::Awaiting { .. },
                ..
            }) => self.initiator_rx(outcome),
            Role::Initiator(_) => {
                trace!("node {}: frame while pausing, ignored", self.node_id);
            }
        }
    }

    /// Handle the end of the inter-exchange pause.
    pub fn handle_pause_elapsed(&mut self) {
        if let Role::Initiator(Session {
            phase: Phase::Pause,
            ..
        }) = self.role
        {
            self.next_exchange();
        }
    }

    /// Wait for the pending event using the radio and clock, then handle it.
    ///
    /// A failed receive is handled like a corrupted frame.
    pub fn step(&mut self) {
        match self.pending() {
            Pending::Listen { timeout } => {
                let outcome = self.radio.receive(timeout).unwrap_or_else(|e| {
                    warn!("node {}: receive failed: {:?}", self.node_id, e);
                    RxOutcome::FrameError
                });
                self.handle_rx(outcome)
            }
            Pending::Pause { duration } => {
                let deadline = self.clock.now() + duration;
                self.clock.sleep_until(deadline);
                self.handle_pause_elapsed()
            }
        }
    }

    /// Initialize, start, and step forever. Only returns if the radio
    /// cannot be configured.
    pub fn run(&mut self) -> Result<Infallible, Error<R::Error>> {
        self.initialize()?;
        self.start();
        loop {
            self.step();
        }
    }

    // --- Internal helpers for the role modules ---

    /// Replace the role and invalidate outstanding timers.
    pub(crate) fn set_role(&mut self, role: Role) {
        self.role = role;
        self.wait_epoch = self.wait_epoch.wrapping_add(1);
    }

    pub(crate) fn become_responder(&mut self) {
        self.set_role(Role::Responder);
        info!("node {}: responder", self.node_id);
        self.emit(DebugEvent::RoleAssigned {
            timestamp: self.clock.now(),
            role: RoleKind::Responder,
        });
    }

    /// Record a transmission the driver refused. Nothing went on air.
    pub(crate) fn tx_failed(&mut self, to: NodeId, err: R::Error) {
        self.metrics.tx_failures += 1;
        warn!("node {}: transmit to {} failed: {:?}", self.node_id, to, err);
        self.emit(DebugEvent::TxFailed {
            timestamp: self.clock.now(),
            to,
        });
    }

    /// Push a trace event; dropped if nobody drains the channel.
    pub(crate) fn emit(&self, event: DebugEvent) {
        let _ = self.debug.try_send(event);
    }
}
