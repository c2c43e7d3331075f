//! A minimal cumulative-ACK receiver fixture, driven over a real loopback
//! UDP socket. The receiver side of this protocol is explicitly out of
//! scope for the library (see `DESIGN.md`'s Non-goals); this exists only to
//! exercise `SenderSocket` end-to-end against something that actually
//! speaks the wire format.
//!
//! Buffers out-of-order DATA packets by sequence number and drains
//! contiguously from the next-expected sequence, so a single retransmitted
//! packet can unblock a whole run of already-received followers with one
//! jump of the cumulative ACK — the same behavior a real selective-repeat
//! receiver would produce.

use std::collections::HashMap;
use std::collections::HashSet;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const MTU: usize = 1472;
const RECEIVER_WINDOW: u32 = 64;
const MAGIC_PROTOCOL: u32 = 0x8311AA;

pub struct MockReceiver {
    pub addr: SocketAddr,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MockReceiver {
    /// `should_drop(is_syn, sequence, attempt)` decides whether to silently
    /// ignore a packet; `attempt` is 1 the first time a (is_syn, sequence)
    /// pair is seen, 2 the next, and so on — SYN and the data packet that
    /// later reuses sequence 0 are tracked independently. `ack_delay` is
    /// applied before every reply, letting tests emulate a slow/Nagle-ish
    /// receiver.
    pub fn spawn<F>(should_drop: F, ack_delay: Duration) -> Self
    where
        F: Fn(bool, u32, u32) -> bool + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind mock receiver");
        socket.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
        let addr = socket.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let stop = stop.clone();
            thread::spawn(move || {
                let mut expected: u32 = 0;
                let mut received: HashSet<u32> = HashSet::new();
                let mut attempts: HashMap<(bool, u32), u32> = HashMap::new();
                let mut buf = [0u8; MTU];

                while !stop.load(Ordering::Relaxed) {
                    let (n, peer) = match socket.recv_from(&mut buf) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if n < 8 {
                        continue;
                    }
                    let flags_word = u32::from_le_bytes(buf[0..4].try_into().unwrap());
                    if flags_word >> 8 != MAGIC_PROTOCOL {
                        continue;
                    }
                    let syn = flags_word & (1 << 5) != 0;
                    let fin = flags_word & (1 << 7) != 0;
                    let sequence = u32::from_le_bytes(buf[4..8].try_into().unwrap());

                    // SYN and the first DATA packet both carry sequence 0
                    // (the handshake doesn't consume a data sequence
                    // number); key retry tracking on (syn, sequence) so a
                    // dropped SYN and the real sequence-0 data packet don't
                    // share an attempt counter.
                    let attempt = attempts.entry((syn, sequence)).or_insert(0);
                    *attempt += 1;
                    let attempt = *attempt;

                    if should_drop(syn, sequence, attempt) {
                        continue;
                    }

                    let ack_sequence;
                    if syn {
                        // The handshake doesn't advance the data sequence
                        // space: acking the SYN just confirms "ready for
                        // sequence 0", independent of `expected`.
                        ack_sequence = 0;
                    } else if fin {
                        // FIN-ack convention: echo the FIN's own sequence
                        // rather than bumping to "next expected" — see
                        // DESIGN.md's FIN-ack resolution. Only meaningful
                        // once every earlier data packet has drained.
                        if sequence == expected {
                            ack_sequence = sequence;
                            expected += 1;
                        } else {
                            ack_sequence = expected;
                        }
                    } else {
                        received.insert(sequence);
                        while received.remove(&expected) {
                            expected += 1;
                        }
                        ack_sequence = expected;
                    }

                    if !ack_delay.is_zero() {
                        thread::sleep(ack_delay);
                    }

                    let mut ack_flags = MAGIC_PROTOCOL << 8;
                    if syn {
                        ack_flags |= 1 << 5;
                    }
                    if fin {
                        ack_flags |= 1 << 7;
                    }
                    let mut reply = Vec::with_capacity(12);
                    reply.extend_from_slice(&ack_flags.to_le_bytes());
                    reply.extend_from_slice(&RECEIVER_WINDOW.to_le_bytes());
                    reply.extend_from_slice(&ack_sequence.to_le_bytes());
                    let _ = socket.send_to(&reply, peer);
                }
            })
        };

        MockReceiver { addr, stop, handle: Some(handle) }
    }

    /// A receiver that never replies to anything — used to exercise
    /// retransmission-budget exhaustion deterministically.
    pub fn silent() -> Self {
        Self::spawn(|_, _, _| true, Duration::ZERO)
    }
}

impl Drop for MockReceiver {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
