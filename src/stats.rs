//! Periodic, purely informational reporter: plain `println!`, no metrics
//! crate, just a line every couple of seconds.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use crate::sender::Shared;

const REPORT_INTERVAL: Duration = Duration::from_secs(2);
const BYTES_PER_MEGABYTE: f64 = 1_000_000.0;
const BITS_PER_BYTE: f64 = 8.0;

/// Runs until the session disconnects (cleanly or otherwise).
pub(crate) fn run_stats_reporter(shared: Arc<Shared>) {
    loop {
        sleep(REPORT_INTERVAL);

        let (connected, transfer_start) = {
            let st = shared.state.lock().unwrap();
            (st.connected, st.transfer_time_start)
        };
        if !connected {
            return;
        }

        let sender_base = shared.stats.sender_base.load(Ordering::Relaxed);
        let next_sequence = shared.stats.next_sequence.load(Ordering::Relaxed);
        let effective_window = shared.stats.effective_window.load(Ordering::Relaxed);
        let total_timeouts = shared.stats.total_timeouts.load(Ordering::Relaxed);
        let total_fast_retx = shared.stats.total_fast_retx.load(Ordering::Relaxed);
        let bytes_acked = shared.stats.bytes_acked.load(Ordering::Relaxed);
        let estimated_rtt = shared.state.lock().unwrap().rto.estimated_rtt();

        let megabytes = bytes_acked as f64 / BYTES_PER_MEGABYTE;
        let mbps = match transfer_start {
            Some(start) => {
                let elapsed = shared.clock.time() - start;
                if elapsed > 0.0 {
                    (megabytes * BITS_PER_BYTE) / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        println!(
            "base {sender_base} next {next_sequence} window {effective_window} \
             acked {megabytes:.1} MB ({mbps:.3} Mbps) timeouts {total_timeouts} \
             fast-retx {total_fast_retx} rtt {estimated_rtt:.3}s"
        );
    }
}
