//! Core types and constants for the ringrange protocol.

use core::fmt;

// Physical constants
/// Speed of light in air, metres per second.
pub const SPEED_OF_LIGHT: f64 = 299_702_547.0;
/// Duration of one device time tick in seconds: 1 / (499.2 MHz × 128).
pub const DWT_TIME_UNITS: f64 = 1.0 / 499.2e6 / 128.0;
/// Device ticks added per unit of a delayed-transmit offset (~1 µs).
pub const UUS_TO_DWT_TIME: u64 = 63_898;
/// The transceiver ignores the low 9 bits of a delayed transmit time.
pub const DELAYED_TX_MASK: u64 = !0x1FF;

// Radio defaults
pub const DEFAULT_ANTENNA_DELAY: u16 = 16_385;
pub const POLL_TX_TO_RESP_RX_DLY_UUS: u32 = 240;
pub const RESP_RX_TIMEOUT_UUS: u32 = 400;
pub const POLL_RX_TO_RESP_TX_DLY_UUS: u32 = 450;

// Message kinds (0-2 valid; anything else is rejected by the codec)
pub const MSG_HANDOFF: u8 = 0;
pub const MSG_POLL: u8 = 1;
pub const MSG_RESPONSE: u8 = 2;

// Frame layout
pub const HEADER_LEN: usize = 4;
pub const POLL_FRAME_LEN: usize = 12;
pub const RESPONSE_FRAME_LEN: usize = 20;

/// Distance value of a matrix cell that has never been measured.
pub const DEFAULT_DISTANCE: f64 = 0.0;

/// Banner logged when a node is initialized.
pub const APP_NAME: &str = "SS TWR DIST CONN MAT";

/// Index of a node in the ring, in `[0, N)`.
pub type NodeId = u8;

/// Error type for node operations.
///
/// Only setup can fail. Once running, timeouts, corrupted frames, missed
/// transmit deadlines and driver failures are handled inside the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error<E> {
    /// Radio configuration failed; the node cannot run.
    Configure(E),
    /// Local id is outside the ring.
    InvalidNodeId { id: NodeId, num_nodes: usize },
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configure(e) => write!(f, "radio configuration failed: {:?}", e),
            Error::InvalidNodeId { id, num_nodes } => {
                write!(f, "node id {} out of range for {} nodes", id, num_nodes)
            }
        }
    }
}

/// Per-node protocol counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RangingMetrics {
    /// Polls transmitted as initiator.
    pub polls_sent: u32,
    /// Responses accepted and turned into a distance.
    pub responses_received: u32,
    /// Responses scheduled as responder.
    pub responses_sent: u32,
    /// Exchanges that ended without any frame.
    pub timeouts: u32,
    /// Receptions reported as corrupted by the radio.
    pub frame_errors: u32,
    /// Frames dropped without effect (misaddressed, unknown, unexpected).
    pub discarded: u32,
    /// Delayed responses whose deadline had already passed.
    pub late_tx: u32,
    /// Transmissions the radio driver refused.
    pub tx_failures: u32,
    pub handoffs_sent: u32,
    pub handoffs_received: u32,
}

impl RangingMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e: Error<&str> = Error::InvalidNodeId { id: 7, num_nodes: 4 };
        assert_eq!(alloc::format!("{}", e), "node id 7 out of range for 4 nodes");

        let e: Error<&str> = Error::Configure("spi");
        assert_eq!(alloc::format!("{}", e), "radio configuration failed: \"spi\"");
    }

    #[test]
    fn test_uus_conversion_matches_tick_period() {
        // The delayed-transmit conversion is one microsecond of device ticks.
        let ticks = 1.0e-6 / DWT_TIME_UNITS;
        let diff = ticks - UUS_TO_DWT_TIME as f64;
        assert!(diff > -1.0 && diff < 1.0);
    }

    #[test]
    fn test_delayed_tx_mask_clears_low_bits() {
        assert_eq!(0x1234_5FFFu64 & DELAYED_TX_MASK, 0x1234_5E00);
    }
}
