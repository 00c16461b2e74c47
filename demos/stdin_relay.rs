//! Stdin relay - Broadcasts standard input to WebSocket clients
//!
//! Run with: cargo run --example stdin_relay -- [HOST] [PORT]
//!
//! Examples:
//!   ffmpeg -i input.mp4 -c copy -f mpegts - | cargo run --example stdin_relay
//!   cat capture.bin | cargo run --example stdin_relay -- 127.0.0.1 9000
//!
//! Each chunk read from stdin is sent to every connected client as one
//! binary message. Connect with any WebSocket client, e.g.:
//!   websocat --binary ws://localhost:8080/
//!
//! The relay stops when stdin reaches end of file.

use std::io::Read;

use ws_relay::{RelayConfig, RelayServer};

const CHUNK_SIZE: usize = 64 * 1024;

fn print_usage() {
    eprintln!("Usage: stdin_relay [HOST] [PORT]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  HOST    Address to bind to (default: 0.0.0.0)");
    eprintln!("  PORT    Port to listen on (default: 8080)");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ws_relay=info".parse()?),
        )
        .init();

    let mut config = RelayConfig::default();
    if let Some(host) = args.get(1) {
        config = config.host(host.as_str());
    }
    if let Some(port) = args.get(2) {
        config = config.port(port.parse()?);
    }

    let relay = RelayServer::new(config);
    let addr = relay.start()?;
    println!(
        "Relaying stdin on ws://{addr}/ (queue={}, send timeout={:?})",
        relay.config().queue_capacity,
        relay.config().send_timeout,
    );

    let mut stdin = std::io::stdin().lock();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut chunks = 0u64;

    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        let report = relay.broadcast(buf[..n].to_vec());
        chunks += 1;

        if report.failed() > 0 || report.dropped() > 0 {
            tracing::warn!(
                chunk = chunks,
                delivered = report.delivered(),
                dropped = report.dropped(),
                failed = report.failed(),
                "Partial delivery"
            );
        }
    }

    relay.stop()?;

    let stats = relay.stats();
    println!(
        "Stats: chunks={} clients={} delivered={} dropped={} failed={} bytes={}",
        chunks,
        stats.total_connections,
        stats.delivered,
        stats.dropped,
        stats.failed,
        stats.bytes_sent,
    );
    Ok(())
}
