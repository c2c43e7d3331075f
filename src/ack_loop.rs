//! The background ACK/retransmit thread: one `SenderSocket` spawns exactly
//! one of these. It owns all reads from the UDP socket; `sender.rs` only
//! ever writes to it.

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::sender::Shared;
use crate::session::Phase;
use crate::wire::{AckOutcome, ReceiverHeader, Status, MAX_PAYLOAD, MAX_RETX, MTU};

pub(crate) fn run_ack_loop(shared: Arc<Shared>) {
    loop {
        let fin_sent = {
            let st = shared.state.lock().unwrap();
            if st.kill_ack_loop {
                return;
            }
            st.fin_sent
        };
        if !fin_sent {
            shared.full_slots.wait();
        }
        // A Drop-triggered shutdown may have woken the wait above with
        // nothing really in flight; re-check before spinning on receives.
        if shared.state.lock().unwrap().kill_ack_loop {
            return;
        }

        loop {
            match receive_once(&shared) {
                AckOutcome::Valid => break,
                AckOutcome::Fatal(_) => return,
                AckOutcome::InvalidAck | AckOutcome::SelectTimeout | AckOutcome::FastRetx => {}
            }
        }
    }
}

/// One pass of the inner receive loop: compute the deadline for the oldest
/// unacked slot, wait for either a reply or that deadline, and dispatch.
fn receive_once(shared: &Arc<Shared>) -> AckOutcome {
    let deadline = {
        let st = shared.state.lock().unwrap();
        let idx = st.base_index();
        st.buffer.get(idx).timestamp + st.rto.rto()
    };
    let remaining = deadline - shared.clock.time();
    if remaining <= 0.0 {
        return on_timeout(shared);
    }

    let mut buf = [0u8; MTU];
    match shared.recv_timeout(&mut buf, Duration::from_secs_f64(remaining)) {
        Ok((n, _)) => on_datagram(shared, &buf[..n]),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            on_timeout(shared)
        }
        Err(_) => {
            let mut st = shared.state.lock().unwrap();
            st.status = Status::FailedRecv;
            st.connected = false;
            st.phase = Phase::Aborted;
            st.kill_ack_loop = true;
            drop(st);
            shared.cv.notify_all();
            shared.empty_slots.signal(1);
            AckOutcome::Fatal(Status::FailedRecv)
        }
    }
}

/// The readiness wait on the oldest unacked slot elapsed. Retransmits it
/// (Karn: clears the slot's eligibility for an RTT sample) unless the
/// retransmission budget is exhausted, in which case the session aborts.
fn on_timeout(shared: &Arc<Shared>) -> AckOutcome {
    let mut st = shared.state.lock().unwrap();
    st.timeout_count += 1;
    st.total_timeouts += 1;
    shared.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);

    let idx = st.base_index();
    let now = shared.clock.time();
    let bytes = st.buffer.get(idx).bytes.clone();
    st.buffer.mark_retransmitted(idx, now);
    if !st.connected {
        st.syn_send_time = Some(now);
    }
    shared.debug_print(format_args!(
        "timeout #{} on slot {idx} (rto {:.3}s)",
        st.timeout_count,
        st.rto.rto()
    ));

    if st.timeout_count >= MAX_RETX {
        st.status = Status::Timeout;
        st.connected = false;
        st.phase = Phase::Aborted;
        st.kill_ack_loop = true;
        drop(st);
        shared.cv.notify_all();
        shared.empty_slots.signal(1);
        return AckOutcome::Fatal(Status::Timeout);
    }
    drop(st);

    if shared.send_raw(&bytes) != Status::Ok {
        let mut st = shared.state.lock().unwrap();
        st.status = Status::FailedSend;
        st.connected = false;
        st.phase = Phase::Aborted;
        st.kill_ack_loop = true;
        drop(st);
        shared.cv.notify_all();
        shared.empty_slots.signal(1);
        return AckOutcome::Fatal(Status::FailedSend);
    }
    AckOutcome::SelectTimeout
}

/// A datagram arrived. Decodes it as a `ReceiverHeader`; garbage is treated
/// as noise (`InvalidAck`, loops back around). A real reply is checked for
/// validity — `ack > SenderBase && ack <= NextSequence`, with the incoming
/// ack pre-incremented by one when `Fin` is set (see `DESIGN.md`'s FIN-ack
/// resolution) — and dispatched as a duplicate, a fast retransmit trigger,
/// or a genuine advancing ACK.
fn on_datagram(shared: &Arc<Shared>, buf: &[u8]) -> AckOutcome {
    let Some(header) = ReceiverHeader::decode(buf) else {
        return AckOutcome::InvalidAck;
    };
    let effective_ack = header.ack_sequence + u32::from(header.flags.fin);

    let mut st = shared.state.lock().unwrap();
    let valid =
        effective_ack as i64 > st.sender_base && effective_ack as i64 <= st.next_sequence as i64;

    if !valid {
        let mut outcome = AckOutcome::InvalidAck;
        if header.ack_sequence as i64 == st.sender_base {
            st.dup_acks += 1;
            if st.dup_acks == 3 {
                st.dup_acks = 0;
                st.total_fast_retx += 1;
                shared.stats.total_fast_retx.fetch_add(1, Ordering::Relaxed);

                let idx = st.base_index();
                let now = shared.clock.time();
                let bytes = st.buffer.get(idx).bytes.clone();
                st.buffer.mark_retransmitted(idx, now);
                shared.debug_print(format_args!("fast retransmit on slot {idx} (3 dup acks)"));
                drop(st);
                shared.send_raw(&bytes);
                return AckOutcome::FastRetx;
            }
        }
        drop(st);
        return outcome;
    }

    st.dup_acks = 0;
    st.timeout_count = 0;

    let prior_base = st.sender_base.max(0);
    let newly_acked = (effective_ack as i64 - prior_base) as u32;
    let acked_bytes = newly_acked as u64 * MAX_PAYLOAD as u64;
    st.bytes_acked += acked_bytes;
    shared.stats.bytes_acked.fetch_add(acked_bytes, Ordering::Relaxed);

    // The handshake RTO seed isn't a Karn-gated sample: it's always
    // 2 * (time of this SYN-ACK - time of the most recent SYN send),
    // however many SYNs were lost along the way.
    if header.flags.syn {
        let syn_send_time = st.syn_send_time.unwrap_or(shared.clock.time());
        let handshake_rtt = shared.clock.time() - syn_send_time;
        st.rto.seed_from_handshake(handshake_rtt);
    } else {
        // Karn's algorithm: only sample the RTT from a slot that was never
        // retransmitted. `effective_ack - 1` is the last sequence this ACK
        // actually covers.
        let sample_index = effective_ack.saturating_sub(1);
        let (sample_retransmitted, sample_timestamp) = {
            let slot = st.buffer.get(sample_index);
            (slot.retransmitted, slot.timestamp)
        };
        if !sample_retransmitted {
            let sample = shared.clock.time() - sample_timestamp;
            st.rto.sample(sample);
        }
    }

    st.sender_base = effective_ack as i64;
    st.receiver_window = header.receiver_window;
    st.effective_window = st.sender_window.min(header.receiver_window);

    shared.stats.sender_base.store(st.sender_base, Ordering::Relaxed);
    shared.stats.next_sequence.store(st.next_sequence, Ordering::Relaxed);
    shared.stats.effective_window.store(st.effective_window, Ordering::Relaxed);

    let mut notify = false;
    if header.flags.syn {
        st.complete_handshake();
        shared.debug_print(format_args!("handshake complete, rto seeded to {:.3}s", st.rto.rto()));
        notify = true;
    } else if header.flags.fin {
        st.connected = false;
        st.phase = Phase::Closed;
        st.kill_ack_loop = true;
        shared.debug_print(format_args!("fin acked, session closed"));
        notify = true;
    } else {
        st.transfer_time_end = Some(shared.clock.time());
    }

    let fin_sent = st.fin_sent;
    drop(st);

    if notify {
        shared.cv.notify_all();
    }
    shared.empty_slots.signal(newly_acked as i64);
    if !fin_sent {
        shared.full_slots.wait_deferred(newly_acked as i64);
    }

    AckOutcome::Valid
}
