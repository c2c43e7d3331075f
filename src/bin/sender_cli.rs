//! `sender-cli`: drives a [`reliable_sender::SenderSocket`] across a real
//! UDP socket, parameterized by host, power-of-two payload size, window,
//! and emulated RTT/loss/bandwidth.

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use reliable_sender::{Error, LinkProperties, SenderSocket, Status, MAGIC_PORT, MAX_PAYLOAD, MTU};

const BITS_PER_BYTE: f64 = 8.0;
const BITS_PER_KILOBIT: f64 = 1_000.0;
const BITS_PER_MEGABIT: f32 = 1_000_000.0;

/// Reliable sender over an unreliable UDP datagram service.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Receiver hostname or literal IP address.
    host: String,

    /// Synthetic payload size, as a power of two (2^power 32-bit words).
    #[arg(long, default_value_t = 16)]
    power: u32,

    /// Sender window, in packets.
    #[arg(long, default_value_t = 10)]
    window: u32,

    /// Emulated propagation RTT, in seconds.
    #[arg(long, default_value_t = 0.0)]
    rtt: f32,

    /// Emulated forward-path loss probability.
    #[arg(long = "loss-forward", default_value_t = 0.0)]
    loss_forward: f32,

    /// Emulated return-path loss probability.
    #[arg(long = "loss-return", default_value_t = 0.0)]
    loss_return: f32,

    /// Emulated bottleneck bandwidth, in Mbit/s.
    #[arg(long, default_value_t = 100.0)]
    bandwidth_mbps: f32,

    /// Print a line to stderr for every retransmit, fast retransmit, and
    /// handshake/teardown event.
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sender-cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    println!(
        "sender W = {}, RTT {} sec, loss {} / {}, link {} Mbps",
        cli.window, cli.rtt, cli.loss_forward, cli.loss_return, cli.bandwidth_mbps
    );

    let word_count = 1usize << cli.power;
    print!("initializing word array with 2^{} elements... ", cli.power);
    let build_start = Instant::now();
    let mut buffer = Vec::with_capacity(word_count * 4);
    for i in 0..word_count as u32 {
        buffer.extend_from_slice(&i.to_le_bytes());
    }
    println!("done in {:.0} ms", build_start.elapsed().as_secs_f64() * 1000.0);

    let link_properties = LinkProperties {
        rtt: cli.rtt,
        speed: cli.bandwidth_mbps * BITS_PER_MEGABIT,
        loss: [cli.loss_forward, cli.loss_return],
        buffer_size: 0, // SenderSocket::open fills this in from `window`
    };

    let socket =
        SenderSocket::open_with_debug(&cli.host, MAGIC_PORT, cli.window, link_properties, cli.debug)?;
    if socket.status() != Status::Ok {
        eprintln!("connect failed with status {:?}", socket.status());
        return Ok(());
    }
    println!(
        "connected to {} in {:.3} sec, pkt size {} bytes",
        cli.host,
        socket.estimated_rtt(),
        MTU
    );

    let transfer_start = Instant::now();
    let mut offset = 0;
    while offset < buffer.len() {
        let chunk_len = (buffer.len() - offset).min(MAX_PAYLOAD);
        let status = socket.send(&buffer[offset..offset + chunk_len]);
        if status != Status::Ok {
            eprintln!("send failed with status {status:?}");
            return Ok(());
        }
        offset += chunk_len;
    }

    let (status, transfer_time) = socket.close();
    if status != Status::Ok {
        eprintln!("close failed with status {status:?}");
        return Ok(());
    }
    let transfer_time = transfer_time.unwrap_or_else(|| transfer_start.elapsed().as_secs_f64());

    let checksum = crc32fast::hash(&buffer);
    let bits_transferred = buffer.len() as f64 * BITS_PER_BYTE;
    let transfer_rate = bits_transferred / transfer_time / BITS_PER_KILOBIT;
    println!("transfer finished in {transfer_time:.3} sec, {transfer_rate:.2} Kbps checksum {checksum:X}");

    let packets_sent = (buffer.len() as f64 / MAX_PAYLOAD as f64).ceil();
    println!("packets sent {}", packets_sent as u64);

    let est_rtt = socket.estimated_rtt();
    let ideal_rate = bits_transferred / packets_sent / est_rtt / BITS_PER_KILOBIT;
    println!("estRTT {est_rtt:.3}, ideal rate {ideal_rate:.2} Kbps");

    Ok(())
}
