//! Single-sided two-way ranging math.
//!
//! An exchange produces four device timestamps:
//!
//! ```text
//! initiator   poll_tx ----------------------------- resp_rx
//!                  \                               /
//! responder         poll_rx ----------- resp_tx
//! ```
//!
//! The initiator round trip minus the responder turnaround, halved, is the
//! time of flight. The responder's turnaround is measured by its own clock,
//! so it is scaled by the carrier-integrator clock offset before subtracting.
//!
//! Only the low 32 bits of each timestamp are used. Round trips are taken
//! with wrapping subtraction and reinterpreted as signed, so a counter wrap
//! inside an exchange is harmless and a nonsensical exchange produces a
//! negative value rather than a panic. No plausibility filtering is applied.

use crate::time::DeviceTime;
use crate::types::{DELAYED_TX_MASK, DWT_TIME_UNITS, SPEED_OF_LIGHT, UUS_TO_DWT_TIME};

/// Scale of the raw carrier integrator clock offset reading (2^26).
const CLOCK_OFFSET_SCALE: f64 = (1u32 << 26) as f64;

/// The four timestamps of one exchange, low 32 bits each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Exchange {
    /// Poll transmission, initiator clock.
    pub poll_tx_ts: u32,
    /// Response reception, initiator clock.
    pub resp_rx_ts: u32,
    /// Poll reception, responder clock.
    pub poll_rx_ts: u32,
    /// Response transmission, responder clock.
    pub resp_tx_ts: u32,
}

/// Result of one exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Time of flight in seconds.
    pub tof: f64,
    /// Distance in metres.
    pub distance: f64,
}

impl Exchange {
    /// Initiator round trip in ticks.
    pub fn round_trip_initiator(&self) -> i64 {
        self.resp_rx_ts.wrapping_sub(self.poll_tx_ts) as i32 as i64
    }

    /// Responder turnaround in ticks.
    pub fn round_trip_responder(&self) -> i64 {
        self.resp_tx_ts.wrapping_sub(self.poll_rx_ts) as i32 as i64
    }

    /// Compute time of flight and distance.
    ///
    /// `clock_offset_ratio` is the responder clock offset as seen by the
    /// initiator (see [`clock_offset_ratio`]).
    pub fn measure(&self, clock_offset_ratio: f64) -> Measurement {
        let rt_init = self.round_trip_initiator() as f64;
        let rt_resp = self.round_trip_responder() as f64;
        let tof = (rt_init - rt_resp * (1.0 - clock_offset_ratio)) / 2.0 * DWT_TIME_UNITS;
        Measurement {
            tof,
            distance: tof * SPEED_OF_LIGHT,
        }
    }
}

/// Convert a raw carrier integrator reading to a clock offset ratio.
pub fn clock_offset_ratio(raw: i32) -> f64 {
    raw as f64 / CLOCK_OFFSET_SCALE
}

/// Delayed transmit time for a response to a poll received at `poll_rx`.
///
/// The low 9 bits are cleared since the transceiver ignores them.
pub fn reply_time(poll_rx: DeviceTime, delay_uus: u32) -> DeviceTime {
    let at = poll_rx.wrapping_add_ticks(delay_uus as u64 * UUS_TO_DWT_TIME);
    DeviceTime::from_ticks(at.ticks() & DELAYED_TX_MASK)
}

/// Timestamp the response will carry: the scheduled time plus antenna delay.
pub fn reply_timestamp(at: DeviceTime, tx_antenna_delay: u16) -> DeviceTime {
    at.wrapping_add_ticks(tx_antenna_delay as u64)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        let d = a - b;
        d < eps && d > -eps
    }

    #[test]
    fn test_regression_exchange() {
        let ex = Exchange {
            poll_tx_ts: 1000,
            resp_rx_ts: 5000,
            poll_rx_ts: 2000,
            resp_tx_ts: 4000,
        };
        assert_eq!(ex.round_trip_initiator(), 4000);
        assert_eq!(ex.round_trip_responder(), 2000);

        let m = ex.measure(0.0);
        assert_eq!(m.tof, 1000.0 * DWT_TIME_UNITS);
        assert_eq!(m.distance, 1000.0 * DWT_TIME_UNITS * SPEED_OF_LIGHT);
        // About 4.69 m.
        assert!(close(m.distance, 4.6903, 1e-3));
    }

    #[test]
    fn test_clock_offset_scales_responder_turnaround() {
        let ex = Exchange {
            poll_tx_ts: 0,
            resp_rx_ts: 1_000_000,
            poll_rx_ts: 0,
            resp_tx_ts: 998_000,
        };
        // Responder clock runs slow; offset stretches its turnaround.
        let m = ex.measure(0.002);
        let expected_ticks = (1_000_000.0 - 998_000.0 * 0.998) / 2.0;
        assert!(close(m.tof, expected_ticks * DWT_TIME_UNITS, 1e-18));
    }

    #[test]
    fn test_counter_wrap() {
        let ex = Exchange {
            poll_tx_ts: u32::MAX - 999,
            resp_rx_ts: 3000,
            poll_rx_ts: u32::MAX - 499,
            resp_tx_ts: 1500,
        };
        assert_eq!(ex.round_trip_initiator(), 4000);
        assert_eq!(ex.round_trip_responder(), 2000);
        assert_eq!(ex.measure(0.0).tof, 1000.0 * DWT_TIME_UNITS);
    }

    #[test]
    fn test_garbage_is_negative_not_panic() {
        let ex = Exchange {
            poll_tx_ts: 5000,
            resp_rx_ts: 6000,
            poll_rx_ts: 0,
            resp_tx_ts: 9000,
        };
        let m = ex.measure(0.0);
        assert!(m.distance < 0.0);
    }

    #[test]
    fn test_clock_offset_ratio() {
        assert_eq!(clock_offset_ratio(0), 0.0);
        assert_eq!(clock_offset_ratio(1 << 26), 1.0);
        assert_eq!(clock_offset_ratio(-(1 << 20)), -1.0 / 64.0);
    }

    #[test]
    fn test_reply_time_masks_low_bits() {
        let poll_rx = DeviceTime::from_ticks(0x10_0000_01FF);
        let at = reply_time(poll_rx, 450);
        assert_eq!(at.ticks() & 0x1FF, 0);
        let raw = 0x10_0000_01FF + 450 * UUS_TO_DWT_TIME;
        assert_eq!(at.ticks(), raw & DELAYED_TX_MASK);
    }

    #[test]
    fn test_reply_time_wraps() {
        let poll_rx = DeviceTime::from_ticks(DeviceTime::MASK - 100);
        let at = reply_time(poll_rx, 1);
        assert!(at.ticks() < UUS_TO_DWT_TIME);
    }

    #[test]
    fn test_reply_timestamp_adds_antenna_delay() {
        let at = DeviceTime::from_ticks(0x2000);
        assert_eq!(reply_timestamp(at, 16_385).ticks(), 0x2000 + 16_385);
    }

    proptest! {
        #[test]
        fn prop_distance_independent_of_counter_base(
            init_base in any::<u32>(),
            resp_base in any::<u32>(),
            rt_resp in 0u32..1_000_000,
            flight in 0u32..10_000,
        ) {
            let at_origin = Exchange {
                poll_tx_ts: 0,
                resp_rx_ts: rt_resp + 2 * flight,
                poll_rx_ts: 0,
                resp_tx_ts: rt_resp,
            };
            let shifted = Exchange {
                poll_tx_ts: init_base,
                resp_rx_ts: init_base.wrapping_add(rt_resp + 2 * flight),
                poll_rx_ts: resp_base,
                resp_tx_ts: resp_base.wrapping_add(rt_resp),
            };
            prop_assert_eq!(shifted.measure(0.0), at_origin.measure(0.0));
            prop_assert_eq!(shifted.round_trip_initiator(), (rt_resp + 2 * flight) as i64);
        }
    }
}
