//! Compile-time network configuration and runtime radio settings.
//!
//! The `NetworkConfig` trait fixes the ring size and protocol timing at
//! compile time. Use `DefaultConfig` for the four-node deployment with
//! extended-length frames, `CompactConfig` for a three-node ring restricted
//! to standard 127-byte frames.
//!
//! # Frame Budget
//!
//! The hand-off frame carries the whole matrix, so its size grows with N²:
//!
//! | Config | N | Hand-off frame | Frame ceiling |
//! |--------|--:|---------------:|--------------:|
//! | `DefaultConfig` | 4 | 132 bytes | 1021 bytes |
//! | `CompactConfig` | 3 | 76 bytes | 125 bytes |
//!
//! A config whose hand-off frame does not fit fails to build as soon as a
//! `Node` is instantiated with it.
//!
//! # Example
//!
//! ```
//! use ringrange::config::{fits_in_frame, handoff_frame_len, NetworkConfig};
//! use ringrange::Duration;
//!
//! struct EightNodes;
//! impl NetworkConfig for EightNodes {
//!     const NUM_NODES: usize = 8;
//!     const MAX_FRAME_LEN: usize = 1021;
//!     const RESPONSE_TIMEOUT: Duration = Duration::from_uus(400);
//!     const REPLY_DELAY_UUS: u32 = 450;
//!     const RANGING_DELAY: Duration = Duration::from_millis(100);
//! }
//!
//! assert_eq!(handoff_frame_len(8), 516);
//! assert!(fits_in_frame::<EightNodes>());
//! ```

use crate::time::Duration;
use crate::types::{
    DEFAULT_ANTENNA_DELAY, HEADER_LEN, POLL_FRAME_LEN, POLL_RX_TO_RESP_TX_DLY_UUS,
    POLL_TX_TO_RESP_RX_DLY_UUS, RESPONSE_FRAME_LEN, RESP_RX_TIMEOUT_UUS,
};

/// Configuration trait for the ring.
///
/// All values must be non-zero; `NUM_NODES` must be at least 2.
pub trait NetworkConfig {
    /// Number of nodes in the ring (ids `0..NUM_NODES`).
    const NUM_NODES: usize;

    /// Largest frame payload the radio can send, excluding the CRC.
    const MAX_FRAME_LEN: usize;

    /// How long the initiator listens for a response after the poll.
    const RESPONSE_TIMEOUT: Duration;

    /// Responder turnaround from poll reception to response transmission.
    const REPLY_DELAY_UUS: u32;

    /// Idle time between two exchanges of the same round.
    const RANGING_DELAY: Duration;
}

/// Four-node ring using extended-length PHR frames, one exchange per second.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl NetworkConfig for DefaultConfig {
    const NUM_NODES: usize = 4;
    const MAX_FRAME_LEN: usize = 1021;
    const RESPONSE_TIMEOUT: Duration = Duration::from_uus(RESP_RX_TIMEOUT_UUS);
    const REPLY_DELAY_UUS: u32 = POLL_RX_TO_RESP_TX_DLY_UUS;
    const RANGING_DELAY: Duration = Duration::from_secs(1);
}

/// Three-node ring within the standard 127-byte frame, fast rounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactConfig;

impl NetworkConfig for CompactConfig {
    const NUM_NODES: usize = 3;
    const MAX_FRAME_LEN: usize = 125;
    const RESPONSE_TIMEOUT: Duration = Duration::from_uus(RESP_RX_TIMEOUT_UUS);
    const REPLY_DELAY_UUS: u32 = POLL_RX_TO_RESP_TX_DLY_UUS;
    const RANGING_DELAY: Duration = Duration::from_millis(10);
}

/// Encoded size of a hand-off frame for an `n`-node ring.
pub const fn handoff_frame_len(n: usize) -> usize {
    HEADER_LEN + 8 * n * n
}

/// True if every frame kind fits within the configured frame ceiling.
pub const fn fits_in_frame<C: NetworkConfig>() -> bool {
    handoff_frame_len(C::NUM_NODES) <= C::MAX_FRAME_LEN
        && POLL_FRAME_LEN <= C::MAX_FRAME_LEN
        && RESPONSE_FRAME_LEN <= C::MAX_FRAME_LEN
}

/// Build-time guard: referencing `FrameCheck::<C>::OK` fails to compile
/// when `C`'s hand-off frame exceeds its frame ceiling.
pub(crate) struct FrameCheck<C>(core::marker::PhantomData<C>);

impl<C: NetworkConfig> FrameCheck<C> {
    pub(crate) const OK: () = {
        assert!(C::NUM_NODES >= 2, "a ring needs at least two nodes");
        assert!(fits_in_frame::<C>(), "hand-off frame exceeds MAX_FRAME_LEN");
    };
}

/// Data rate of the UWB PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    Kbps850,
    Mbps6_8,
}

/// PHR encoding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhrMode {
    /// Standard 7-bit length, frames up to 127 bytes.
    Standard,
    /// Extended 10-bit length, frames up to 1023 bytes.
    Extended,
}

/// Start-of-frame delimiter variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SfdType {
    Ieee8,
    NonStandard8,
    NonStandard16,
    Ieee4z8,
}

/// Runtime transceiver settings applied by `Radio::configure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioConfig {
    pub channel: u8,
    /// Preamble length in symbols.
    pub preamble_length: u16,
    /// Preamble acquisition chunk size in symbols.
    pub pac_size: u8,
    pub tx_preamble_code: u8,
    pub rx_preamble_code: u8,
    pub sfd_type: SfdType,
    pub data_rate: DataRate,
    pub phr_mode: PhrMode,
    pub phr_rate: DataRate,
    /// SFD detection timeout in symbols.
    pub sfd_timeout: u16,
    pub sts_enabled: bool,
    pub pdoa_enabled: bool,
    pub tx_antenna_delay: u16,
    pub rx_antenna_delay: u16,
    /// Delay between the end of a transmission and automatic receiver
    /// enable when a response is expected.
    pub rx_after_tx_delay_uus: u32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            channel: 5,
            preamble_length: 128,
            pac_size: 8,
            tx_preamble_code: 9,
            rx_preamble_code: 9,
            sfd_type: SfdType::NonStandard8,
            data_rate: DataRate::Mbps6_8,
            phr_mode: PhrMode::Standard,
            phr_rate: DataRate::Kbps850,
            sfd_timeout: 128 + 1 + 8 - 8,
            sts_enabled: false,
            pdoa_enabled: false,
            tx_antenna_delay: DEFAULT_ANTENNA_DELAY,
            rx_antenna_delay: DEFAULT_ANTENNA_DELAY,
            rx_after_tx_delay_uus: POLL_TX_TO_RESP_RX_DLY_UUS,
        }
    }
}

impl RadioConfig {
    /// Default settings, switched to extended PHR when the ring's frame
    /// ceiling is beyond what a standard PHR can signal.
    pub fn for_network<C: NetworkConfig>() -> Self {
        let mut cfg = Self::default();
        if C::MAX_FRAME_LEN > cfg.max_frame_len() {
            cfg.phr_mode = PhrMode::Extended;
        }
        cfg
    }

    /// Largest frame this PHR mode can carry, excluding the 2-byte CRC.
    pub fn max_frame_len(&self) -> usize {
        match self.phr_mode {
            PhrMode::Standard => 125,
            PhrMode::Extended => 1021,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(DefaultConfig::NUM_NODES, 4);
        assert_eq!(DefaultConfig::MAX_FRAME_LEN, 1021);
        assert_eq!(DefaultConfig::RESPONSE_TIMEOUT, Duration::from_uus(400));
        assert_eq!(DefaultConfig::REPLY_DELAY_UUS, 450);
        assert_eq!(DefaultConfig::RANGING_DELAY.as_millis(), 1000);
    }

    #[test]
    fn test_compact_config_values() {
        assert_eq!(CompactConfig::NUM_NODES, 3);
        assert_eq!(CompactConfig::MAX_FRAME_LEN, 125);
        assert_eq!(CompactConfig::RANGING_DELAY.as_millis(), 10);
    }

    #[test]
    fn test_handoff_frame_len() {
        assert_eq!(handoff_frame_len(3), 76);
        assert_eq!(handoff_frame_len(4), 132);
    }

    #[test]
    fn test_provided_configs_fit() {
        assert!(fits_in_frame::<DefaultConfig>());
        assert!(fits_in_frame::<CompactConfig>());
    }

    #[test]
    fn test_oversized_ring_does_not_fit() {
        struct Big;
        impl NetworkConfig for Big {
            const NUM_NODES: usize = 4;
            const MAX_FRAME_LEN: usize = 125;
            const RESPONSE_TIMEOUT: Duration = Duration::from_uus(400);
            const REPLY_DELAY_UUS: u32 = 450;
            const RANGING_DELAY: Duration = Duration::from_millis(1);
        }
        assert!(!fits_in_frame::<Big>());
    }

    #[test]
    fn test_radio_config_defaults() {
        let cfg = RadioConfig::default();
        assert_eq!(cfg.channel, 5);
        assert_eq!(cfg.preamble_length, 128);
        assert_eq!(cfg.pac_size, 8);
        assert_eq!(cfg.sfd_timeout, 129);
        assert_eq!(cfg.tx_antenna_delay, 16_385);
        assert_eq!(cfg.rx_after_tx_delay_uus, 240);
        assert!(!cfg.sts_enabled);
        assert_eq!(cfg.max_frame_len(), 125);
    }

    #[test]
    fn test_radio_config_for_network() {
        let cfg = RadioConfig::for_network::<DefaultConfig>();
        assert_eq!(cfg.phr_mode, PhrMode::Extended);
        assert!(cfg.max_frame_len() >= handoff_frame_len(DefaultConfig::NUM_NODES));

        let cfg = RadioConfig::for_network::<CompactConfig>();
        assert_eq!(cfg.phr_mode, PhrMode::Standard);
    }
}
