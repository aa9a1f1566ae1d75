//! Core traits for radio and time abstraction.
//!
//! These traits allow the protocol to be used with different:
//! - Transceivers (DW3000 over SPI, simulated medium, scripted mocks)
//! - Time sources (real hardware time, simulated time)

use alloc::vec::Vec;
use core::fmt;

use crate::config::RadioConfig;
use crate::time::{DeviceTime, Duration, Timestamp};

/// Result of a receive attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxOutcome {
    /// A frame with a valid CRC.
    Frame(Vec<u8>),
    /// Nothing arrived before the timeout.
    Timeout,
    /// Something arrived but was corrupted (CRC, PHR or SFD error).
    FrameError,
}

/// Result of scheduling a delayed transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayedTx {
    /// The frame will leave at the requested time.
    Scheduled,
    /// The requested time had already passed; nothing was sent.
    TooLate,
}

/// UWB transceiver capability.
///
/// All calls block. Protocol outcomes (timeouts, corrupted frames, missed
/// deadlines) are reported in `Ok`; `Err` is reserved for driver failures.
///
/// # Example
///
/// ```
/// use ringrange::traits::test_impls::MockRadio;
/// use ringrange::traits::{Radio, RxOutcome};
///
/// let mut radio = MockRadio::new();
/// radio.push_rx(RxOutcome::Timeout);
///
/// radio.send(&[1, 0, 0, 1], true).unwrap();
/// assert_eq!(radio.sent().len(), 1);
/// assert_eq!(radio.receive(None).unwrap(), RxOutcome::Timeout);
/// ```
pub trait Radio {
    /// Driver error type.
    type Error: fmt::Debug;

    /// Apply the transceiver configuration.
    fn configure(&mut self, config: &RadioConfig) -> Result<(), Self::Error>;

    /// Transmit immediately.
    ///
    /// With `expect_response`, the receiver is armed automatically
    /// `RadioConfig::rx_after_tx_delay_uus` after the frame, so a following
    /// `receive` catches a fast reply.
    fn send(&mut self, frame: &[u8], expect_response: bool) -> Result<(), Self::Error>;

    /// Transmit at device time `at` (low 9 bits ignored).
    fn send_delayed(&mut self, frame: &[u8], at: DeviceTime) -> Result<DelayedTx, Self::Error>;

    /// Wait for a frame. `None` waits indefinitely.
    fn receive(&mut self, timeout: Option<Duration>) -> Result<RxOutcome, Self::Error>;

    /// Device time at which the last frame left the antenna.
    fn read_tx_timestamp(&self) -> DeviceTime;

    /// Device time at which the last frame reached the antenna.
    fn read_rx_timestamp(&self) -> DeviceTime;

    /// Clock offset of the last received frame's sender relative to the
    /// local clock, as a ratio.
    ///
    /// DW3000 adapters read the carrier integrator and convert it with
    /// [`clock_offset_ratio`](crate::ranging::clock_offset_ratio).
    fn read_clock_offset(&self) -> f64;
}

/// Time source trait for real or simulated time.
///
/// # Example (testing with MockClock)
///
/// ```
/// use ringrange::traits::test_impls::MockClock;
/// use ringrange::{Clock, Duration, Timestamp};
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now(), Timestamp::ZERO);
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), Timestamp::from_secs(10));
///
/// // Sleeping jumps the mock straight to the deadline.
/// clock.sleep_until(Timestamp::from_secs(12));
/// assert_eq!(clock.now().as_millis(), 12_000);
/// ```
pub trait Clock {
    /// Get the current timestamp.
    fn now(&self) -> Timestamp;

    /// Block until the given timestamp.
    fn sleep_until(&self, time: Timestamp);
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! Mock implementations of traits for unit testing and doc tests.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use alloc::collections::VecDeque;
    use core::cell::Cell;

    use super::*;

    /// Errors the mock radio can be told to produce.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockRadioError {
        ConfigureFailed,
        /// `receive` was called with nothing left in the script.
        ScriptExhausted,
        /// Transmission refused, see [`MockRadio::set_fail_tx`].
        TxFailed,
    }

    /// A frame handed to the mock radio.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentFrame {
        pub data: Vec<u8>,
        pub expect_response: bool,
        /// Requested departure for delayed transmissions.
        pub at: Option<DeviceTime>,
    }

    /// Scripted radio: receive outcomes are queued up front and every
    /// transmission is recorded.
    #[derive(Default)]
    pub struct MockRadio {
        script: VecDeque<(RxOutcome, Option<DeviceTime>)>,
        sent: Vec<SentFrame>,
        configured: Option<RadioConfig>,
        fail_configure: bool,
        fail_tx: bool,
        late_tx: bool,
        tx_timestamp: Cell<DeviceTime>,
        rx_timestamp: Cell<DeviceTime>,
        clock_offset: f64,
    }

    impl MockRadio {
        pub fn new() -> Self {
            Self::default()
        }

        /// Radio whose `configure` fails.
        pub fn failing_configure() -> Self {
            Self {
                fail_configure: true,
                ..Self::default()
            }
        }

        /// Queue a receive outcome.
        pub fn push_rx(&mut self, outcome: RxOutcome) {
            self.script.push_back((outcome, None));
        }

        /// Queue a frame that will be stamped with `rx_ts` on reception.
        pub fn push_frame_at(&mut self, data: Vec<u8>, rx_ts: DeviceTime) {
            self.script.push_back((RxOutcome::Frame(data), Some(rx_ts)));
        }

        /// Make every delayed transmission report `TooLate`.
        pub fn set_late_tx(&mut self, late: bool) {
            self.late_tx = late;
        }

        /// Make every transmission fail in the driver.
        pub fn set_fail_tx(&mut self, fail: bool) {
            self.fail_tx = fail;
        }

        /// Timestamp reported for the next transmissions.
        pub fn set_tx_timestamp(&self, ts: DeviceTime) {
            self.tx_timestamp.set(ts);
        }

        pub fn set_rx_timestamp(&self, ts: DeviceTime) {
            self.rx_timestamp.set(ts);
        }

        pub fn set_clock_offset(&mut self, ratio: f64) {
            self.clock_offset = ratio;
        }

        /// All transmissions so far.
        pub fn sent(&self) -> &[SentFrame] {
            &self.sent
        }

        /// Take all transmissions so far.
        pub fn take_sent(&mut self) -> Vec<SentFrame> {
            core::mem::take(&mut self.sent)
        }

        /// Configuration applied by the last successful `configure`.
        pub fn configured(&self) -> Option<&RadioConfig> {
            self.configured.as_ref()
        }

        /// Outcomes still queued.
        pub fn pending_rx(&self) -> usize {
            self.script.len()
        }
    }

    impl Radio for MockRadio {
        type Error = MockRadioError;

        fn configure(&mut self, config: &RadioConfig) -> Result<(), MockRadioError> {
            if self.fail_configure {
                return Err(MockRadioError::ConfigureFailed);
            }
            self.configured = Some(config.clone());
            Ok(())
        }

        fn send(&mut self, frame: &[u8], expect_response: bool) -> Result<(), MockRadioError> {
            if self.fail_tx {
                return Err(MockRadioError::TxFailed);
            }
            self.sent.push(SentFrame {
                data: frame.to_vec(),
                expect_response,
                at: None,
            });
            Ok(())
        }

        fn send_delayed(
            &mut self,
            frame: &[u8],
            at: DeviceTime,
        ) -> Result<DelayedTx, MockRadioError> {
            if self.fail_tx {
                return Err(MockRadioError::TxFailed);
            }
            if self.late_tx {
                return Ok(DelayedTx::TooLate);
            }
            self.sent.push(SentFrame {
                data: frame.to_vec(),
                expect_response: false,
                at: Some(at),
            });
            Ok(DelayedTx::Scheduled)
        }

        fn receive(&mut self, _timeout: Option<Duration>) -> Result<RxOutcome, MockRadioError> {
            let (outcome, rx_ts) = self
                .script
                .pop_front()
                .ok_or(MockRadioError::ScriptExhausted)?;
            if let Some(ts) = rx_ts {
                self.rx_timestamp.set(ts);
            }
            Ok(outcome)
        }

        fn read_tx_timestamp(&self) -> DeviceTime {
            self.tx_timestamp.get()
        }

        fn read_rx_timestamp(&self) -> DeviceTime {
            self.rx_timestamp.get()
        }

        fn read_clock_offset(&self) -> f64 {
            self.clock_offset
        }
    }

    /// Mock clock for testing (synchronous, time advances manually).
    pub struct MockClock {
        current: Cell<Timestamp>,
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self {
                current: Cell::new(Timestamp::ZERO),
            }
        }
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn at(time: Timestamp) -> Self {
            Self {
                current: Cell::new(time),
            }
        }

        /// Set the current time.
        pub fn set(&self, time: Timestamp) {
            self.current.set(time);
        }

        /// Advance time by the given duration.
        pub fn advance(&self, duration: Duration) {
            self.current.set(self.current.get() + duration);
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Timestamp {
            self.current.get()
        }

        fn sleep_until(&self, time: Timestamp) {
            if time > self.current.get() {
                self.current.set(time);
            }
        }
    }
}
