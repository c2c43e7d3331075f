//! The session state machine and the single struct, guarded by one mutex,
//! that every other piece of `SenderSocket` mutates. Nothing here touches
//! the network or spawns threads — that's `sender.rs` and `ack_loop.rs`.

use crate::rto::RtoEstimator;
use crate::wire::{Status, DEFAULT_INITIAL_RTO};
use crate::window::PacketBuffer;

/// Closed -> Handshaking -> Connected -> Draining -> Closed, plus Aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Closed,
    Handshaking,
    Connected,
    Draining,
    Aborted,
}

/// All protocol state mutated only while holding `SenderSocket`'s mutex.
#[derive(Debug)]
pub struct SenderState {
    pub phase: Phase,
    pub sender_window: u32,
    pub receiver_window: u32,
    pub effective_window: u32,
    /// Lowest unacknowledged sequence; -1 means "no data sent yet".
    pub sender_base: i64,
    pub next_sequence: u32,
    pub status: Status,
    pub connected: bool,
    pub fin_sent: bool,
    pub kill_ack_loop: bool,
    /// Consecutive timeouts on the oldest unacked slot.
    pub timeout_count: u32,
    pub dup_acks: u32,
    pub transfer_time_start: Option<f64>,
    pub transfer_time_end: Option<f64>,
    /// Set when the SYN is (re)transmitted, used to compute the handshake
    /// RTT sample when the SYN-ACK arrives.
    pub syn_send_time: Option<f64>,
    /// Cumulative counters the stats thread reports; kept here because they
    /// change only under this mutex (the `Atomic*` mirrors on `Shared` are
    /// what the stats thread actually reads, see `sender.rs`).
    pub total_timeouts: u64,
    pub total_fast_retx: u64,
    pub bytes_acked: u64,
    /// The retransmission ring, preallocated to `sender_window` at `open`.
    pub buffer: PacketBuffer,
    pub rto: RtoEstimator,
}

impl SenderState {
    pub fn new(sender_window: u32) -> Self {
        SenderState {
            phase: Phase::Closed,
            sender_window,
            receiver_window: 0,
            effective_window: sender_window,
            sender_base: -1,
            next_sequence: 0,
            status: Status::Ok,
            connected: false,
            fin_sent: false,
            kill_ack_loop: false,
            timeout_count: 0,
            dup_acks: 0,
            transfer_time_start: None,
            transfer_time_end: None,
            syn_send_time: None,
            total_timeouts: 0,
            total_fast_retx: 0,
            bytes_acked: 0,
            buffer: PacketBuffer::new(sender_window as usize),
            rto: RtoEstimator::new(DEFAULT_INITIAL_RTO),
        }
    }

    /// Transitions Handshaking -> Connected on a valid SYN-ACK. The
    /// handshake does not consume a data sequence number: both
    /// `sender_base` and `next_sequence` are (re)reset to their
    /// pre-transfer values so the first data packet occupies sequence 0.
    pub fn complete_handshake(&mut self) {
        self.phase = Phase::Connected;
        self.connected = true;
        self.sender_base = -1;
        self.next_sequence = 0;
    }

    /// Index used to look up the slot for the oldest unacked packet; -1
    /// (no data yet, or only the SYN outstanding) maps to slot 0.
    pub fn base_index(&self) -> u32 {
        if self.sender_base < 0 {
            0
        } else {
            self.sender_base as u32
        }
    }

    /// `-1 <= sender_base <= next_sequence <= sender_base + effective_window`.
    pub fn assert_invariants(&self) {
        assert!(self.sender_base >= -1);
        assert!(self.sender_base <= self.next_sequence as i64);
        assert!(
            (self.next_sequence as i64) <= self.sender_base + self.effective_window as i64,
            "next_sequence {} exceeds sender_base {} + effective_window {}",
            self.next_sequence,
            self.sender_base,
            self.effective_window
        );
        if self.connected {
            assert_eq!(self.status, Status::Ok);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_satisfies_invariants() {
        let state = SenderState::new(8);
        state.assert_invariants();
        assert_eq!(state.sender_base, -1);
        assert_eq!(state.phase, Phase::Closed);
    }

    #[test]
    fn complete_handshake_resets_sequence_space_for_data_phase() {
        let mut state = SenderState::new(4);
        state.phase = Phase::Handshaking;
        state.sender_base = 1; // as if a SYN-ACK advanced it during handshake
        state.next_sequence = 1;

        state.complete_handshake();

        assert_eq!(state.phase, Phase::Connected);
        assert!(state.connected);
        assert_eq!(state.sender_base, -1);
        assert_eq!(state.next_sequence, 0);
        state.assert_invariants();
    }

    #[test]
    fn base_index_treats_no_data_yet_as_slot_zero() {
        let state = SenderState::new(4);
        assert_eq!(state.base_index(), 0);
    }

    #[test]
    #[should_panic]
    fn connected_with_non_ok_status_violates_invariant() {
        let mut state = SenderState::new(4);
        state.connected = true;
        state.status = Status::Timeout;
        state.assert_invariants();
    }
}
