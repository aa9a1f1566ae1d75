#![forbid(unsafe_code)]
//! ringrange - Ring-circulated UWB ranging for a shared distance matrix
//!
//! A fixed set of N nodes with ids `0..N` measure every pairwise distance
//! with single-sided two-way ranging (SS-TWR) and pass the resulting matrix
//! around the ring, so each node eventually holds the complete picture.
//!
//! This crate is `no_std` but **requires the `alloc` crate**.
//!
//! # Key Properties
//!
//! - One token circulates: its holder is the only initiator
//! - The initiator polls every other node in ascending id order, then hands
//!   the token and its matrix to `(self + 1) mod N`
//! - Time of flight is corrected for the responder's clock drift using the
//!   transceiver's carrier integrator
//! - Lost exchanges are skipped, never retried; a lost hand-off stalls the ring
//! - Only radio configuration can fail; later driver errors drop one exchange
//!
//! # Example (basic usage)
//!
//! ```
//! use ringrange::{CompactConfig, Node, RadioConfig};
//! use ringrange::traits::test_impls::{MockClock, MockRadio};
//! use ringrange::wire::Message;
//!
//! let mut node = Node::<_, _, CompactConfig>::new(
//!     MockRadio::new(),
//!     MockClock::new(),
//!     0,
//!     RadioConfig::default(),
//! )
//! .unwrap();
//!
//! node.initialize().unwrap();
//! node.start();
//!
//! // Node 0 holds the token first and polls node 1 straight away.
//! assert!(node.is_initiator());
//! let poll = &node.radio().sent()[0];
//! assert_eq!(Message::decode(&poll.data, 3).unwrap(), Message::poll(0, 0, 1));
//! ```
//!
//! # Example (integration pattern)
//!
//! ```text
//! use ringrange::{DefaultConfig, Node, RadioConfig};
//!
//! // Implement Radio for the transceiver driver and Clock for the board timer...
//!
//! let mut node = Node::<_, _, DefaultConfig>::new(
//!     dw3000, timer, DEVICE_ID, RadioConfig::for_network::<DefaultConfig>(),
//! )?;
//!
//! // Blocks forever; only a configuration failure returns.
//! let err = node.run().unwrap_err();
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Constants, NodeId, Error, metrics
//! - [`ranging`] - Round-trip and time-of-flight math
//! - [`wire`] - Frame layouts and codec
//! - [`matrix`] - Distance row and connectivity matrix storage
//! - [`traits`] - Radio and Clock traits
//! - [`node`] - Node struct, drivers and public API
//! - `initiator` / `responder` - Role handlers
//! - [`time`] - Host time and device time types
//! - [`config`] - Ring configuration and radio settings
//! - [`debug`] - Protocol trace events

#![no_std]

#[cfg(all(feature = "test-support", not(test), not(debug_assertions)))]
compile_error!(
    "The `test-support` feature must not be enabled in release builds. \
     It only provides scripted radio and clock mocks."
);

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod debug;
mod initiator;
pub mod matrix;
pub mod node;
pub mod ranging;
mod responder;
pub mod time;
pub mod traits;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use config::{CompactConfig, DefaultConfig, NetworkConfig, RadioConfig};
pub use debug::DebugEvent;
pub use matrix::{ConnectivityMatrix, MatrixError, MatrixStore};
pub use node::{Node, Pending, Role};
pub use ranging::{Exchange, Measurement};
pub use time::{DeviceTime, Duration, Timestamp};
pub use traits::{Clock, DelayedTx, Radio, RxOutcome};
pub use types::{Error, NodeId, RangingMetrics};
pub use wire::{Decode, DecodeError, Encode, Message, Payload};

// Re-export constants
pub use types::{APP_NAME, DEFAULT_DISTANCE, DWT_TIME_UNITS, SPEED_OF_LIGHT, UUS_TO_DWT_TIME};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::test_impls::{MockClock, MockRadio};

    /// Three nodes wired together by hand. Timestamps stay at zero, so the
    /// distances are meaningless; only the token's path is checked.
    #[test]
    fn test_ring_passes_token_around() {
        let mut nodes: alloc::vec::Vec<Node<MockRadio, MockClock, CompactConfig>> = (0..3)
            .map(|id| {
                Node::new(MockRadio::new(), MockClock::new(), id, RadioConfig::default()).unwrap()
            })
            .collect();
        for n in nodes.iter_mut() {
            n.initialize().unwrap();
            n.start();
        }

        // Relay frames until every node has finished one round.
        let mut handoffs = alloc::vec::Vec::new();
        for _ in 0..64 {
            for from in 0..3 {
                for frame in nodes[from].radio_mut().take_sent() {
                    let msg = Message::decode(&frame.data, 3).unwrap();
                    if let Payload::Handoff(_) = msg.payload {
                        handoffs.push((msg.src, msg.dest));
                    }
                    let to = msg.dest as usize;
                    nodes[to].handle_rx(RxOutcome::Frame(frame.data));
                }
            }
            for n in nodes.iter_mut() {
                n.handle_pause_elapsed();
            }
            if handoffs.len() >= 3 {
                break;
            }
        }

        assert_eq!(&handoffs[..3], &[(0, 1), (1, 2), (2, 0)]);
        let initiators = nodes.iter().filter(|n| n.is_initiator()).count();
        assert_eq!(initiators, 1);
        // Node 0 adopted node 2's matrix, which carries every committed row.
        for row in 0..3 {
            assert!(!nodes[0].matrix().is_row_default(row));
        }
    }
}
