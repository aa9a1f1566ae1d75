//! Initiator role: one ranging round over every other node, then hand-off.
//!
//! Targets are visited in ascending id order, skipping self, with one
//! attempt each. Between exchanges the node pauses for `RANGING_DELAY`.
//! After the last target the row is committed and the matrix travels to
//! `(self + 1) mod N` together with the token; no acknowledgement is
//! awaited.

use log::{debug, info, trace, warn};

use crate::config::NetworkConfig;
use crate::debug::{DebugEvent, RoleKind};
use crate::node::{Node, Phase, Role, Session};
use crate::ranging::Exchange;
use crate::time::Duration;
use crate::traits::{Clock, Radio, RxOutcome};
use crate::types::NodeId;
use crate::wire::{DecodeError, Encode, Message, Payload};

impl<R, Clk, C> Node<R, Clk, C>
where
    R: Radio,
    Clk: Clock,
    C: NetworkConfig,
{
    /// Take the token and range to the first target immediately.
    pub(crate) fn begin_session(&mut self) {
        self.set_role(Role::Initiator(Session {
            cursor: 0,
            phase: Phase::Pause,
        }));
        info!("node {}: initiator", self.node_id);
        self.emit(DebugEvent::RoleAssigned {
            timestamp: self.clock.now(),
            role: RoleKind::Initiator,
        });
        self.next_exchange()
    }

    /// Lowest target id at or after `from`, skipping self.
    fn next_target(&self, from: usize) -> Option<NodeId> {
        (from..C::NUM_NODES)
            .map(|t| t as NodeId)
            .find(|&t| t != self.node_id)
    }

    fn cursor(&self) -> Option<usize> {
        match self.role {
            Role::Initiator(session) => Some(session.cursor),
            Role::Responder => None,
        }
    }

    /// Poll the next target, or finish the round if none is left.
    pub(crate) fn next_exchange(&mut self) {
        let Some(cursor) = self.cursor() else {
            return;
        };
        match self.next_target(cursor) {
            Some(target) => self.send_poll(target),
            None => self.finalize_round(),
        }
    }

    fn send_poll(&mut self, target: NodeId) {
        let seq = self.seq;
        let frame = Message::poll(seq, self.node_id, target).encode_to_vec();
        if let Err(e) = self.radio.send(&frame, true) {
            self.tx_failed(target, e);
            // Counts as this target's attempt for the round.
            self.set_role(Role::Initiator(Session {
                cursor: target as usize + 1,
                phase: Phase::Pause,
            }));
            return self.abandon_exchange(target, "poll not sent");
        }

        let now = self.clock.now();
        let poll_tx_ts = self.radio.read_tx_timestamp();
        // The receive timeout only starts once the receiver is armed.
        let window = Duration::from_uus(self.radio_config.rx_after_tx_delay_uus)
            + C::RESPONSE_TIMEOUT;
        self.seq = self.seq.wrapping_add(1);
        self.metrics.polls_sent += 1;
        self.set_role(Role::Initiator(Session {
            cursor: target as usize + 1,
            phase: Phase::Awaiting {
                target,
                seq,
                poll_tx_ts,
                deadline: now + window,
            },
        }));

        trace!("node {}: poll #{} to {}", self.node_id, seq, target);
        self.emit(DebugEvent::PollSent {
            timestamp: now,
            target,
            seq,
        });
    }

    /// Handle a receive outcome while awaiting a response.
    pub(crate) fn initiator_rx(&mut self, outcome: RxOutcome) {
        let Role::Initiator(Session {
            phase:
                Phase::Awaiting {
                    target,
                    seq,
                    poll_tx_ts,
                    ..
                },
            ..
        }) = self.role
        else {
            return;
        };
        let now = self.clock.now();

        let data = match outcome {
            RxOutcome::Frame(data) => data,
            RxOutcome::Timeout => {
                self.metrics.timeouts += 1;
                debug!("node {}: no response from {}", self.node_id, target);
                self.emit(DebugEvent::ExchangeTimedOut {
                    timestamp: now,
                    target,
                });
                return self.end_exchange();
            }
            RxOutcome::FrameError => {
                self.metrics.frame_errors += 1;
                return self.abandon_exchange(target, "frame error");
            }
        };

        let msg = match Message::decode_addressed(&data, self.node_id, C::NUM_NODES) {
            Ok(msg) => msg,
            Err(DecodeError::NotAddressed { dest }) => {
                trace!("node {}: frame for {} ignored", self.node_id, dest);
                return;
            }
            Err(e) => {
                trace!("node {}: undecodable frame: {}", self.node_id, e);
                return self.abandon_exchange(target, "undecodable frame");
            }
        };

        match msg.payload {
            Payload::Response {
                poll_rx_ts,
                resp_tx_ts,
            } if msg.src == target && msg.seq == seq => {
                let resp_rx_ts = self.radio.read_rx_timestamp();
                let ratio = self.radio.read_clock_offset();
                let measurement = Exchange {
                    poll_tx_ts: poll_tx_ts.lo32(),
                    resp_rx_ts: resp_rx_ts.lo32(),
                    poll_rx_ts,
                    resp_tx_ts,
                }
                .measure(ratio);

                self.store.record_distance(target, measurement.distance);
                self.metrics.responses_received += 1;
                debug!(
                    "node {}: distance to {} = {:.3} m",
                    self.node_id, target, measurement.distance
                );
                self.emit(DebugEvent::RangeMeasured {
                    timestamp: now,
                    target,
                    distance: measurement.distance,
                });
                self.end_exchange()
            }
            Payload::Response { .. } => {
                // Reply to an earlier poll: keep waiting for the real one.
                self.metrics.discarded += 1;
                trace!(
                    "node {}: stale response #{} from {} ignored",
                    self.node_id,
                    msg.seq,
                    msg.src
                );
                self.emit(DebugEvent::FrameDiscarded {
                    timestamp: now,
                    reason: "stale response",
                });
            }
            _ => self.abandon_exchange(target, "unexpected frame kind"),
        }
    }

    fn abandon_exchange(
        &mut self,
        target: NodeId,
        reason: &'static str,
    ) {
        debug!("node {}: exchange with {} abandoned: {}", self.node_id, target, reason);
        self.emit(DebugEvent::ExchangeAbandoned {
            timestamp: self.clock.now(),
            target,
            reason,
        });
        self.end_exchange()
    }

    /// Pause before the next target, or finish right away after the last.
    fn end_exchange(&mut self) {
        let Some(cursor) = self.cursor() else {
            return;
        };
        if self.next_target(cursor).is_some() {
            self.set_role(Role::Initiator(Session {
                cursor,
                phase: Phase::Pause,
            }));
        } else {
            self.finalize_round()
        }
    }

    /// Commit the row and pass the token with the matrix to the successor.
    ///
    /// If the driver refuses the hand-off the token is lost, same as a
    /// hand-off lost on air.
    fn finalize_round(&mut self) {
        let now = self.clock.now();
        self.store.commit_row();
        info!(
            "node {}: row committed\n{}",
            self.node_id,
            self.store.matrix()
        );
        self.emit(DebugEvent::RowCommitted { timestamp: now });

        let next = ((self.node_id as usize + 1) % C::NUM_NODES) as NodeId;
        let frame = Message::handoff(self.seq, self.node_id, next, self.store.snapshot())
            .encode_to_vec();
        match self.radio.send(&frame, false) {
            Ok(()) => {
                self.seq = self.seq.wrapping_add(1);
                self.metrics.handoffs_sent += 1;
                info!("node {}: token to {}", self.node_id, next);
                self.emit(DebugEvent::HandoffSent {
                    timestamp: now,
                    to: next,
                });
            }
            Err(e) => {
                self.tx_failed(next, e);
                warn!("node {}: token lost", self.node_id);
            }
        }

        self.become_responder();
    }
}
