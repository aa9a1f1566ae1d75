//! Responder role: answer polls, wait for the token.
//!
//! Receive timeouts, corrupted frames and failed transmissions are not
//! errors here; the node simply listens again. Frames for other nodes are dropped without any
//! trace beyond a log line.

use log::{info, trace, warn};

use crate::config::NetworkConfig;
use crate::debug::DebugEvent;
use crate::matrix::ConnectivityMatrix;
use crate::node::Node;
use crate::ranging::{reply_time, reply_timestamp};
use crate::traits::{Clock, DelayedTx, Radio, RxOutcome};
use crate::types::NodeId;
use crate::wire::{DecodeError, Encode, Message, Payload};

impl<R, Clk, C> Node<R, Clk, C>
where
    R: Radio,
    Clk: Clock,
    C: NetworkConfig,
{
    /// Handle a receive outcome while responding.
    pub(crate) fn responder_rx(&mut self, outcome: RxOutcome) {
        let data = match outcome {
            RxOutcome::Frame(data) => data,
            RxOutcome::Timeout => return,
            RxOutcome::FrameError => {
                self.metrics.frame_errors += 1;
                trace!("node {}: corrupted frame", self.node_id);
                return;
            }
        };

        let msg = match Message::decode_addressed(&data, self.node_id, C::NUM_NODES) {
            Ok(msg) => msg,
            Err(DecodeError::NotAddressed { dest }) => {
                trace!("node {}: frame for {} ignored", self.node_id, dest);
                return;
            }
            Err(e) => {
                self.discard(decode_reason(e));
                return;
            }
        };

        match msg.payload {
            Payload::Poll => self.answer_poll(msg.src, msg.seq),
            Payload::Handoff(matrix) => self.accept_handoff(msg.src, matrix),
            Payload::Response { .. } => self.discard("response while responding"),
        }
    }

    /// Schedule a response at a fixed turnaround after the poll arrived.
    fn answer_poll(&mut self, from: NodeId, seq: u8) {
        let poll_rx = self.radio.read_rx_timestamp();
        let at = reply_time(poll_rx, C::REPLY_DELAY_UUS);
        let resp_tx = reply_timestamp(at, self.radio_config.tx_antenna_delay);
        let frame = Message::response(seq, self.node_id, from, poll_rx.lo32(), resp_tx.lo32())
            .encode_to_vec();

        let now = self.clock.now();
        match self.radio.send_delayed(&frame, at) {
            Ok(DelayedTx::Scheduled) => {
                self.metrics.responses_sent += 1;
                trace!("node {}: response #{} to {}", self.node_id, seq, from);
                self.emit(DebugEvent::ResponseSent {
                    timestamp: now,
                    to: from,
                    seq,
                });
            }
            Ok(DelayedTx::TooLate) => {
                self.metrics.late_tx += 1;
                warn!(
                    "node {}: response to {} missed its transmit time",
                    self.node_id, from
                );
                self.emit(DebugEvent::DelayedTxMissed {
                    timestamp: now,
                    to: from,
                });
            }
            Err(e) => self.tx_failed(from, e),
        }
    }

    /// Adopt the sender's matrix and start our own round.
    fn accept_handoff(&mut self, from: NodeId, matrix: ConnectivityMatrix) {
        if let Err(e) = self.store.adopt(matrix) {
            warn!("node {}: hand-off from {} rejected: {}", self.node_id, from, e);
            return;
        }
        let now = self.clock.now();
        self.metrics.handoffs_received += 1;
        info!(
            "node {}: token from {}, matrix adopted\n{}",
            self.node_id,
            from,
            self.store.matrix()
        );
        self.emit(DebugEvent::HandoffReceived {
            timestamp: now,
            from,
        });
        self.emit(DebugEvent::MatrixAdopted {
            timestamp: now,
            from,
        });
        self.begin_session()
    }

    fn discard(&mut self, reason: &'static str) {
        self.metrics.discarded += 1;
        trace!("node {}: frame discarded: {}", self.node_id, reason);
        self.emit(DebugEvent::FrameDiscarded {
            timestamp: self.clock.now(),
            reason,
        });
    }
}

fn decode_reason(e: DecodeError) -> &'static str {
    match e {
        DecodeError::UnknownKind(_) => "unknown kind",
        DecodeError::InvalidNodeId(_) => "node id outside ring",
        DecodeError::UnexpectedEof | DecodeError::InvalidLength => "bad length",
        DecodeError::NotAddressed { .. } => "misaddressed",
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use proptest::prelude::*;

    use crate::config::{CompactConfig, NetworkConfig, RadioConfig};
    use crate::debug::DebugEvent;
    use crate::matrix::ConnectivityMatrix;
    use crate::node::{Node, Role};
    use crate::ranging::reply_time;
    use crate::time::DeviceTime;
    use crate::traits::test_impls::{MockClock, MockRadio};
    use crate::traits::RxOutcome;
    use crate::types::{DEFAULT_ANTENNA_DELAY, MSG_POLL};
    use crate::wire::{Encode, Message, Payload};

    type TestNode = Node<MockRadio, MockClock, CompactConfig>;

    fn responder(id: u8) -> TestNode {
        let mut node =
            Node::new(MockRadio::new(), MockClock::new(), id, RadioConfig::default()).unwrap();
        node.start();
        node
    }

    #[test]
    fn test_poll_answered_with_delayed_response() {
        let mut node = responder(1);
        let poll_rx = DeviceTime::from_ticks(0x01_0000_0000);
        node.radio_mut()
            .push_frame_at(Message::poll(42, 0, 1).encode_to_vec(), poll_rx);
        node.step();

        let sent = node.radio().sent();
        assert_eq!(sent.len(), 1);
        let at = reply_time(poll_rx, CompactConfig::REPLY_DELAY_UUS);
        assert_eq!(sent[0].at, Some(at));

        let msg = Message::decode(&sent[0].data, 3).unwrap();
        assert_eq!(msg.seq, 42);
        assert_eq!(msg.dest, 0);
        assert_eq!(
            msg.payload,
            Payload::Response {
                poll_rx_ts: poll_rx.lo32(),
                resp_tx_ts: at.lo32().wrapping_add(DEFAULT_ANTENNA_DELAY as u32),
            }
        );
        assert_eq!(*node.role(), Role::Responder);
        assert_eq!(node.metrics().responses_sent, 1);
    }

    #[test]
    fn test_late_tx_abandons_exchange() {
        let mut node = responder(2);
        node.radio_mut().set_late_tx(true);
        node.handle_rx(RxOutcome::Frame(Message::poll(0, 0, 2).encode_to_vec()));
        assert!(node.radio().sent().is_empty());
        assert_eq!(node.metrics().late_tx, 1);
        assert_eq!(*node.role(), Role::Responder);

        let mut events = Vec::new();
        while let Ok(e) = node.debug_channel().try_receive() {
            events.push(e);
        }
        assert!(events
            .iter()
            .any(|e| matches!(e, DebugEvent::DelayedTxMissed { to: 0, .. })));
    }

    #[test]
    fn test_failed_response_keeps_serving_polls() {
        let mut node = responder(1);
        node.radio_mut().set_fail_tx(true);
        for seq in 0..2 {
            node.radio_mut().push_frame_at(
                Message::poll(seq, 0, 1).encode_to_vec(),
                DeviceTime::from_ticks(0x1000),
            );
        }
        node.step();
        node.step();

        assert_eq!(node.radio().pending_rx(), 0);
        assert_eq!(node.metrics().tx_failures, 2);
        assert_eq!(node.metrics().responses_sent, 0);
        assert_eq!(*node.role(), Role::Responder);

        let mut events = Vec::new();
        while let Ok(e) = node.debug_channel().try_receive() {
            events.push(e);
        }
        assert!(events
            .iter()
            .any(|e| matches!(e, DebugEvent::TxFailed { to: 0, .. })));

        // Driver back: the next poll is answered.
        node.radio_mut().set_fail_tx(false);
        node.radio_mut().push_frame_at(
            Message::poll(2, 0, 1).encode_to_vec(),
            DeviceTime::from_ticks(0x1000),
        );
        node.step();
        assert_eq!(node.metrics().responses_sent, 1);
        assert_eq!(node.radio().sent().len(), 1);
    }

    #[test]
    fn test_timeout_and_frame_error_recovered() {
        let mut node = responder(1);
        node.handle_rx(RxOutcome::Timeout);
        node.handle_rx(RxOutcome::FrameError);
        assert_eq!(*node.role(), Role::Responder);
        assert_eq!(node.metrics().frame_errors, 1);
    }

    #[test]
    fn test_handoff_adopts_and_polls_lowest_target() {
        let mut node = responder(1);
        let snapshot =
            ConnectivityMatrix::from_cells(3, vec![0.0, 1.25, 2.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
                .unwrap();
        node.handle_rx(RxOutcome::Frame(
            Message::handoff(9, 0, 1, snapshot.clone()).encode_to_vec(),
        ));

        assert_eq!(node.matrix(), &snapshot);
        assert!(node.is_initiator());
        let sent = node.radio().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(Message::decode(&sent[0].data, 3).unwrap(), Message::poll(0, 1, 0));
    }

    #[test]
    fn test_unknown_kind_discarded() {
        let mut node = responder(1);
        let mut frame = Message::poll(0, 0, 1).encode_to_vec();
        frame[0] = 7;
        node.handle_rx(RxOutcome::Frame(frame));
        assert_eq!(node.metrics().discarded, 1);
        assert!(node.radio().sent().is_empty());
    }

    proptest! {
        #[test]
        fn prop_misaddressed_frames_are_noops(
            kind in 0u8..3,
            seq in any::<u8>(),
            src in 0u8..3,
            body in proptest::collection::vec(any::<u8>(), 72),
        ) {
            // Valid frames of every kind addressed to node 2, seen by node 1.
            let mut frame = vec![kind, seq, src, 2];
            let len = match kind {
                0 => 4 + 8 * 9,
                MSG_POLL => 12,
                _ => 20,
            };
            frame.extend_from_slice(&body[..len - 4]);

            let mut node = responder(1);
            let before = (*node.role(), node.seq(), node.wait_epoch(), node.matrix().clone());
            node.handle_rx(RxOutcome::Frame(frame));
            let after = (*node.role(), node.seq(), node.wait_epoch(), node.matrix().clone());

            prop_assert_eq!(before, after);
            prop_assert!(node.radio().sent().is_empty());
            prop_assert_eq!(node.metrics().discarded, 0);
        }
    }
}
