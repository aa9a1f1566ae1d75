//! SimNode wrapper and the simulated radio hardware.

use std::cell::Cell;

use ringrange::config::{DefaultConfig, NetworkConfig, RadioConfig};
use ringrange::debug::DebugEvent;
use ringrange::traits::{Clock, DelayedTx, Radio, RxOutcome};
use ringrange::{
    ConnectivityMatrix, DeviceTime, Duration, Node, NodeId, Pending, RangingMetrics, Timestamp,
    DWT_TIME_UNITS,
};

use crate::error::SimError;

/// Length of one device tick in picoseconds (~15.65 ps).
pub const TICK_PS: f64 = DWT_TIME_UNITS * 1e12;

/// Convert host nanoseconds to picoseconds.
pub(crate) fn ns_to_ps(ns: u64) -> f64 {
    ns as f64 * 1000.0
}

/// A node's free-running transceiver counter.
///
/// The counter starts at `offset_ticks` at true time zero and runs
/// `drift_ppm` parts per million fast (or slow, if negative).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceClock {
    offset_ticks: u64,
    drift_ppm: f64,
}

impl Default for DeviceClock {
    fn default() -> Self {
        Self::ideal()
    }
}

impl DeviceClock {
    pub fn new(offset_ticks: u64, drift_ppm: f64) -> Self {
        Self {
            offset_ticks: offset_ticks & DeviceTime::MASK,
            drift_ppm,
        }
    }

    /// No offset, no drift.
    pub fn ideal() -> Self {
        Self::new(0, 0.0)
    }

    pub fn drift_ppm(&self) -> f64 {
        self.drift_ppm
    }

    pub fn offset_ticks(&self) -> u64 {
        self.offset_ticks
    }

    fn rate(&self) -> f64 {
        1.0 + self.drift_ppm * 1e-6
    }

    /// Ticks elapsed since true time zero, unwrapped and unquantized.
    fn elapsed_ticks(&self, t_ps: f64) -> f64 {
        t_ps * self.rate() / TICK_PS
    }

    /// Counter value at true time `t_ps`.
    pub fn ticks_at(&self, t_ps: f64) -> DeviceTime {
        let elapsed = self.elapsed_ticks(t_ps).floor() as u64;
        DeviceTime::from_ticks(self.offset_ticks.wrapping_add(elapsed))
    }

    /// First true instant at or after `after_ps` where the counter reads
    /// `target`.
    ///
    /// `None` if `target` lies in the past half of the counter range, which
    /// is how the transceiver decides a delayed transmission is late.
    pub fn time_of(&self, target: DeviceTime, after_ps: f64) -> Option<f64> {
        let base = self.elapsed_ticks(after_ps).floor();
        let now = DeviceTime::from_ticks(self.offset_ticks.wrapping_add(base as u64));
        let ahead = target.wrapping_ticks_since(now);
        if ahead >= 1 << (DeviceTime::BITS - 1) {
            return None;
        }
        let t_ps = (base + ahead as f64) * TICK_PS / self.rate();
        // The tick containing `after_ps` started before it.
        Some(t_ps.max(after_ps))
    }

    /// Clock offset ratio the receiver's carrier integrator reports for a
    /// frame from `sender`.
    ///
    /// Multiplying a sender-side interval by `1 - ratio` expresses it in
    /// receiver ticks.
    pub fn offset_ratio(receiver: &DeviceClock, sender: &DeviceClock) -> f64 {
        1.0 - receiver.rate() / sender.rate()
    }
}

/// Simulated radio driver failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RadioError {
    #[error("radio used before configuration")]
    NotConfigured,
    #[error("transceiver rejected the configuration")]
    ConfigurationRejected,
    #[error("blocking receive is not available in simulation")]
    BlockingReceive,
    #[error("frame of {len} bytes exceeds the {max}-byte PHY limit")]
    FrameTooLong { len: usize, max: usize },
}

/// A frame leaving the antenna.
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub data: Vec<u8>,
    /// True departure instant in picoseconds.
    pub departure_ps: f64,
    /// Sent with `send_delayed`.
    pub delayed: bool,
}

/// Mock transceiver driven by the simulator.
///
/// The simulator tells it what time it is and what the last received frame
/// looked like; the radio turns that into device timestamps with its own
/// drifting counter. Receiving is done by the simulator calling the node's
/// handlers, so [`Radio::receive`] is never used.
pub struct SimRadio {
    device_clock: DeviceClock,
    config: Option<RadioConfig>,
    reject_configuration: bool,
    /// Host processing time between a frame's arrival and the handler.
    processing_delay: Duration,
    now_ps: f64,
    tx_timestamp: DeviceTime,
    rx_timestamp: DeviceTime,
    clock_offset: f64,
    /// Receiver is off before this instant.
    rx_from_ps: f64,
    outbox: Vec<Transmission>,
}

impl SimRadio {
    pub fn new(device_clock: DeviceClock) -> Self {
        Self {
            device_clock,
            config: None,
            reject_configuration: false,
            processing_delay: Duration::ZERO,
            now_ps: 0.0,
            tx_timestamp: DeviceTime::ZERO,
            rx_timestamp: DeviceTime::ZERO,
            clock_offset: 0.0,
            rx_from_ps: 0.0,
            outbox: Vec::new(),
        }
    }

    /// Make `configure` fail, as a transceiver that never comes up would.
    pub fn reject_configuration(&mut self) {
        self.reject_configuration = true;
    }

    pub fn set_device_clock(&mut self, clock: DeviceClock) {
        self.device_clock = clock;
    }

    pub fn set_processing_delay(&mut self, delay: Duration) {
        self.processing_delay = delay;
    }

    pub fn processing_delay(&self) -> Duration {
        self.processing_delay
    }

    pub fn device_clock(&self) -> &DeviceClock {
        &self.device_clock
    }

    pub fn configured(&self) -> Option<&RadioConfig> {
        self.config.as_ref()
    }

    pub fn now_ps(&self) -> f64 {
        self.now_ps
    }

    /// Set the true time for the handler about to run.
    pub fn set_now_ps(&mut self, t_ps: f64) {
        self.now_ps = t_ps;
    }

    /// Latch the receive timestamp and clock offset of an arriving frame.
    ///
    /// The handler then runs after the processing delay.
    pub fn latch_rx(&mut self, arrival_ps: f64, clock_offset: f64) {
        self.rx_timestamp = self.device_clock.ticks_at(arrival_ps);
        self.clock_offset = clock_offset;
        self.now_ps = arrival_ps + ns_to_ps(self.processing_delay.as_nanos());
    }

    /// Whether the receiver is on at `t_ps`.
    pub fn receiver_on(&self, t_ps: f64) -> bool {
        self.config.is_some() && t_ps >= self.rx_from_ps
    }

    pub fn take_outbox(&mut self) -> Vec<Transmission> {
        std::mem::take(&mut self.outbox)
    }

    /// Configuration, once the frame is known to fit the PHR mode.
    fn config_for(&self, frame: &[u8]) -> Result<&RadioConfig, RadioError> {
        let config = self.config.as_ref().ok_or(RadioError::NotConfigured)?;
        if frame.len() > config.max_frame_len() {
            return Err(RadioError::FrameTooLong {
                len: frame.len(),
                max: config.max_frame_len(),
            });
        }
        Ok(config)
    }
}

impl Radio for SimRadio {
    type Error = RadioError;

    fn configure(&mut self, config: &RadioConfig) -> Result<(), RadioError> {
        if self.reject_configuration {
            return Err(RadioError::ConfigurationRejected);
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn send(&mut self, frame: &[u8], expect_response: bool) -> Result<(), RadioError> {
        let rx_after_tx = self.config_for(frame)?.rx_after_tx_delay_uus;
        let departure_ps = self.now_ps;
        self.tx_timestamp = self.device_clock.ticks_at(departure_ps);
        self.outbox.push(Transmission {
            data: frame.to_vec(),
            departure_ps,
            delayed: false,
        });
        self.rx_from_ps = if expect_response {
            departure_ps + ns_to_ps(Duration::from_uus(rx_after_tx).as_nanos())
        } else {
            departure_ps
        };
        Ok(())
    }

    fn send_delayed(&mut self, frame: &[u8], at: DeviceTime) -> Result<DelayedTx, RadioError> {
        let antenna_delay = self.config_for(frame)?.tx_antenna_delay;
        // The frame leaves the antenna one antenna delay after `at`.
        let rmarker = at.wrapping_add_ticks(antenna_delay as u64);
        let Some(departure_ps) = self.device_clock.time_of(rmarker, self.now_ps) else {
            return Ok(DelayedTx::TooLate);
        };
        self.tx_timestamp = rmarker;
        self.outbox.push(Transmission {
            data: frame.to_vec(),
            departure_ps,
            delayed: true,
        });
        // Busy transmitting until the frame is out.
        self.rx_from_ps = departure_ps;
        Ok(DelayedTx::Scheduled)
    }

    fn receive(&mut self, _timeout: Option<Duration>) -> Result<RxOutcome, RadioError> {
        Err(RadioError::BlockingReceive)
    }

    fn read_tx_timestamp(&self) -> DeviceTime {
        self.tx_timestamp
    }

    fn read_rx_timestamp(&self) -> DeviceTime {
        self.rx_timestamp
    }

    fn read_clock_offset(&self) -> f64 {
        self.clock_offset
    }
}

/// Host clock for simulation.
///
/// Time is controlled externally by the simulator.
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::at(Timestamp::ZERO)
    }

    pub fn at(time: Timestamp) -> Self {
        Self {
            current: Cell::new(time),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        self.current.get()
    }

    fn sleep_until(&self, time: Timestamp) {
        if time > self.current.get() {
            self.current.set(time);
        }
    }
}

/// Type alias for simulated nodes.
pub type SimNodeInner<C> = Node<SimRadio, SimClock, C>;

/// Wrapper around a ringrange Node for simulation.
pub struct SimNode<C: NetworkConfig = DefaultConfig> {
    inner: SimNodeInner<C>,
    /// Wait epoch a wake-up is already scheduled for.
    armed_epoch: Option<u32>,
    started: bool,
    halted: bool,
}

impl<C: NetworkConfig> SimNode<C> {
    pub fn new(node_id: NodeId, radio: SimRadio, radio_config: RadioConfig) -> Result<Self, SimError> {
        let inner = Node::new(radio, SimClock::new(), node_id, radio_config).map_err(|e| {
            SimError::Node {
                node: node_id,
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            inner,
            armed_epoch: None,
            started: false,
            halted: false,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.node_id()
    }

    pub fn inner(&self) -> &SimNodeInner<C> {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut SimNodeInner<C> {
        &mut self.inner
    }

    pub fn radio(&self) -> &SimRadio {
        self.inner.radio()
    }

    pub fn radio_mut(&mut self) -> &mut SimRadio {
        self.inner.radio_mut()
    }

    pub fn is_initiator(&self) -> bool {
        self.inner.is_initiator()
    }

    pub fn matrix(&self) -> &ConnectivityMatrix {
        self.inner.matrix()
    }

    pub fn metrics(&self) -> &RangingMetrics {
        self.inner.metrics()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Failed to power on; never receives or wakes.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub(crate) fn halt(&mut self) {
        self.halted = true;
    }

    /// Whether a frame reaching the antenna at `arrival_ps` is received.
    pub fn is_listening(&self, arrival_ps: f64) -> bool {
        self.started
            && !self.halted
            && matches!(self.inner.pending(), Pending::Listen { .. })
            && self.inner.radio().receiver_on(arrival_ps)
    }

    fn set_time(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
    }

    /// Power on: configure the radio and take the boot role.
    pub fn boot(&mut self, now: Timestamp) -> Result<(), ringrange::Error<RadioError>> {
        self.set_time(now);
        self.inner.radio_mut().set_now_ps(ns_to_ps(now.as_nanos()));
        self.inner.initialize()?;
        self.started = true;
        self.inner.start();
        Ok(())
    }

    /// A frame arrived intact.
    pub fn handle_frame(
        &mut self,
        now: Timestamp,
        arrival_ps: f64,
        data: Vec<u8>,
        clock_offset: f64,
    ) {
        let delay = self.inner.radio().processing_delay();
        self.set_time(now + delay);
        self.inner.radio_mut().latch_rx(arrival_ps, clock_offset);
        self.inner.handle_rx(RxOutcome::Frame(data))
    }

    /// A frame arrived but failed its checksum.
    pub fn handle_frame_error(&mut self, now: Timestamp, arrival_ps: f64) {
        self.set_time(now);
        self.inner.radio_mut().set_now_ps(arrival_ps);
        self.inner.handle_rx(RxOutcome::FrameError)
    }

    /// A scheduled wake-up fired. Stale epochs are ignored.
    pub fn handle_wake(&mut self, now: Timestamp, epoch: u32) {
        if epoch != self.inner.wait_epoch() {
            return;
        }
        self.armed_epoch = None;
        self.set_time(now);
        self.inner.radio_mut().set_now_ps(ns_to_ps(now.as_nanos()));
        match self.inner.pending() {
            Pending::Listen { timeout: Some(_) } => self.inner.handle_rx(RxOutcome::Timeout),
            Pending::Pause { .. } => self.inner.handle_pause_elapsed(),
            Pending::Listen { timeout: None } => {}
        }
    }

    /// Wake-up needed for the current wait, if not already scheduled.
    pub fn next_wake(&mut self) -> Option<(Timestamp, u32)> {
        if self.halted || !self.started {
            return None;
        }
        let epoch = self.inner.wait_epoch();
        if self.armed_epoch == Some(epoch) {
            return None;
        }
        let now = self.inner.clock().now();
        let at = match self.inner.pending() {
            Pending::Listen { timeout: Some(t) } => now + t,
            Pending::Pause { duration } => now + duration,
            Pending::Listen { timeout: None } => return None,
        };
        self.armed_epoch = Some(epoch);
        Some((at, epoch))
    }

    /// Take all frames transmitted since the last call.
    pub fn take_outgoing(&mut self) -> Vec<Transmission> {
        self.inner.radio_mut().take_outbox()
    }

    /// Take all debug events from the node's debug channel.
    pub fn take_debug_events(&self) -> Vec<DebugEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inner.debug_channel().try_receive() {
            events.push(event);
        }
        events
    }
}
