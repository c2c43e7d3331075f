//! `SenderSocket`: the public `open`/`send`/`close` API, and the shared,
//! mutex-guarded state every background thread touches. Owns an
//! `Arc<Mutex<_>>`, spawns the background ack and stats threads, and joins
//! them on shutdown.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::ack_loop::run_ack_loop;
use crate::clock::Clock;
use crate::dns;
use crate::error::Error;
use crate::semaphore::CountingSemaphore;
use crate::session::{Phase, SenderState};
use crate::stats::run_stats_reporter;
use crate::wire::{Flags, LinkProperties, SenderDataHeader, SenderSynHeader, Status, HEADER_LEN, MAX_RETX};

/// Atomics the stats thread reads without taking the session lock. Mirrors
/// a subset of `SenderState`, updated alongside it under the same lock.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub sender_base: AtomicI64,
    pub next_sequence: AtomicU32,
    pub effective_window: AtomicU32,
    pub total_timeouts: AtomicU64,
    pub total_fast_retx: AtomicU64,
    pub bytes_acked: AtomicU64,
}

pub(crate) struct Shared {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    pub(crate) clock: Clock,
    pub(crate) state: Mutex<SenderState>,
    pub(crate) cv: Condvar,
    pub(crate) empty_slots: CountingSemaphore,
    pub(crate) full_slots: CountingSemaphore,
    pub(crate) stats: StatsCounters,
    pub(crate) debug: bool,
}

impl Shared {
    fn new(
        socket: UdpSocket,
        peer: Option<SocketAddr>,
        clock: Clock,
        state: SenderState,
        debug: bool,
    ) -> Self {
        let empty_slots = CountingSemaphore::new(state.sender_window as i64);
        Shared {
            socket,
            peer,
            clock,
            state: Mutex::new(state),
            cv: Condvar::new(),
            empty_slots,
            full_slots: CountingSemaphore::new(0),
            stats: StatsCounters::default(),
            debug,
        }
    }

    /// Transmits a datagram to the peer, retrying on `WouldBlock`. Never
    /// touches `state`; callers hold the session mutex across the call so
    /// packet construction and transmission stay atomic, matching the
    /// original's locked `SendPacket`.
    pub(crate) fn send_raw(&self, bytes: &[u8]) -> Status {
        let Some(dest) = self.peer else {
            return Status::FailedSend;
        };
        loop {
            match self.socket.send_to(bytes, dest) {
                Ok(_) => return Status::Ok,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(1));
                }
                Err(_) => return Status::FailedSend,
            }
        }
    }

    pub(crate) fn recv_timeout(&self, buf: &mut [u8], timeout: Duration) -> io::Result<(usize, SocketAddr)> {
        self.socket.set_read_timeout(Some(timeout))?;
        self.socket.recv_from(buf)
    }

    /// Prints to stderr only when the session was opened with debugging on.
    pub(crate) fn debug_print(&self, line: std::fmt::Arguments) {
        if self.debug {
            eprintln!("[reliable-sender] {line}");
        }
    }
}

/// A reliable, ordered sender session over an unreliable datagram transport.
///
/// `open`, `send`, and `close` all report outcomes as a [`Status`] rather
/// than an `Err`, so callers branch on protocol-level outcomes the same way
/// regardless of which call produced them. `Error` is reserved for failures
/// below the protocol (socket creation,
/// name resolution's own system call failing outright).
pub struct SenderSocket {
    shared: Arc<Shared>,
    ack_handle: Option<JoinHandle<()>>,
    stats_handle: Option<JoinHandle<()>>,
}

impl SenderSocket {
    /// Resolves `host`, preallocates a `sender_window`-sized retransmission
    /// ring, and drives the SYN handshake to completion (or exhaustion).
    /// Returns `Ok` even when the protocol itself failed to connect — check
    /// [`SenderSocket::status`] for `InvalidName`/`Timeout`/etc. `Err` is
    /// reserved for failures outside the protocol, such as the local socket
    /// failing to bind.
    pub fn open(
        host: &str,
        port: u16,
        sender_window: u32,
        link_properties: LinkProperties,
    ) -> Result<SenderSocket, Error> {
        Self::open_with_debug(host, port, sender_window, link_properties, false)
    }

    /// As [`SenderSocket::open`], but additionally prints a line to stderr
    /// for every retransmit, fast retransmit, and handshake/teardown event
    /// the ack loop observes.
    pub fn open_with_debug(
        host: &str,
        port: u16,
        sender_window: u32,
        mut link_properties: LinkProperties,
        debug: bool,
    ) -> Result<SenderSocket, Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let clock = Clock::new();
        let mut state = SenderState::new(sender_window);

        let peer = match dns::resolve(host, port) {
            Ok(addr) => addr,
            Err(_) => {
                state.status = Status::InvalidName;
                state.phase = Phase::Aborted;
                let shared = Arc::new(Shared::new(socket, None, clock, state, debug));
                return Ok(SenderSocket { shared, ack_handle: None, stats_handle: None });
            }
        };

        state.phase = Phase::Handshaking;
        link_properties.buffer_size = sender_window + MAX_RETX;

        let shared = Arc::new(Shared::new(socket, Some(peer), clock, state, debug));

        let syn = SenderSynHeader {
            header: SenderDataHeader { flags: Flags::syn(), sequence: 0 },
            link_properties,
        };
        let bytes = syn.encode();

        {
            let mut st = shared.state.lock().unwrap();
            let now = shared.clock.time();
            st.syn_send_time = Some(now);
            let send_status = shared.send_raw(&bytes);
            if send_status != Status::Ok {
                st.status = send_status;
                st.phase = Phase::Aborted;
                drop(st);
                return Ok(SenderSocket { shared, ack_handle: None, stats_handle: None });
            }
            st.buffer.store(0, bytes, now);
        }
        shared.full_slots.signal(1);

        let ack_shared = shared.clone();
        let ack_handle = thread::spawn(move || run_ack_loop(ack_shared));

        let mut st = shared.state.lock().unwrap();
        while st.status == Status::Ok && !st.connected {
            st = shared.cv.wait(st).unwrap();
        }
        let connected = st.connected;
        drop(st);

        let stats_handle = if connected {
            let stats_shared = shared.clone();
            Some(thread::spawn(move || run_stats_reporter(stats_shared)))
        } else {
            None
        };

        Ok(SenderSocket { shared, ack_handle: Some(ack_handle), stats_handle })
    }

    /// Admits `payload` into the sliding window, blocking while the window
    /// is full. `payload` must be at most [`crate::wire::MAX_PAYLOAD`] bytes;
    /// chunking a larger buffer is the caller's job (see `sender-cli`).
    pub fn send(&self, payload: &[u8]) -> Status {
        {
            let st = self.shared.state.lock().unwrap();
            if !st.connected {
                return Status::NotConnected;
            }
        }

        self.shared.empty_slots.wait();

        let mut st = self.shared.state.lock().unwrap();
        if st.status != Status::Ok {
            return st.status;
        }

        let sequence = st.next_sequence;
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        SenderDataHeader { flags: Flags::default(), sequence }.encode(&mut bytes);
        bytes.extend_from_slice(payload);

        let send_status = self.shared.send_raw(&bytes);
        if send_status != Status::Ok {
            st.status = send_status;
            return send_status;
        }

        let now = self.shared.clock.time();
        if sequence == 0 {
            st.transfer_time_start = Some(now);
        }
        st.buffer.store(sequence, bytes, now);
        st.next_sequence += 1;
        drop(st);

        self.shared.full_slots.signal(1);
        Status::Ok
    }

    /// Transmits a FIN carrying the next free sequence number, then blocks
    /// until the session drains (FIN acked) or aborts. Returns the elapsed
    /// transfer time when it can be computed (first data packet sent to
    /// last data packet acked).
    pub fn close(&self) -> (Status, Option<f64>) {
        {
            let st = self.shared.state.lock().unwrap();
            if !st.connected {
                return (Status::NotConnected, None);
            }
        }

        self.shared.empty_slots.wait();

        let mut st = self.shared.state.lock().unwrap();
        if st.status != Status::Ok {
            return (st.status, None);
        }

        let sequence = st.next_sequence;
        let mut bytes = Vec::with_capacity(HEADER_LEN);
        SenderDataHeader { flags: Flags::fin(), sequence }.encode(&mut bytes);

        let send_status = self.shared.send_raw(&bytes);
        if send_status != Status::Ok {
            st.status = send_status;
            return (send_status, None);
        }

        let now = self.shared.clock.time();
        st.buffer.store(sequence, bytes, now);
        st.next_sequence += 1;
        st.fin_sent = true;
        st.phase = Phase::Draining;
        drop(st);

        self.shared.full_slots.signal(1);

        let mut st = self.shared.state.lock().unwrap();
        while st.status == Status::Ok && st.connected {
            st = self.shared.cv.wait(st).unwrap();
        }
        let status = st.status;
        let elapsed = st.transfer_time_start.zip(st.transfer_time_end).map(|(s, e)| e - s);
        (status, elapsed)
    }

    pub fn status(&self) -> Status {
        self.shared.state.lock().unwrap().status
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.lock().unwrap().phase
    }

    pub fn estimated_rtt(&self) -> f64 {
        self.shared.state.lock().unwrap().rto.estimated_rtt()
    }

    pub fn rto(&self) -> f64 {
        self.shared.state.lock().unwrap().rto.rto()
    }
}

impl Drop for SenderSocket {
    fn drop(&mut self) {
        {
            let mut st = self.shared.state.lock().unwrap();
            st.kill_ack_loop = true;
        }
        self.shared.cv.notify_all();
        self.shared.full_slots.signal(1); // unstick an outer Wait blocked with nothing in flight
        if let Some(h) = self.ack_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.stats_handle.take() {
            let _ = h.join();
        }
    }
}
