//! Test-pattern broadcast demo
//!
//! Run with: cargo run --example test_pattern [VIEWERS] [SECONDS] [SNAPSHOT_PATH]
//!
//! Examples:
//!   cargo run --example test_pattern                    # 2 viewers for 5 seconds
//!   cargo run --example test_pattern 8 10               # 8 viewers for 10 seconds
//!   cargo run --example test_pattern 1 3 /tmp/snap.jpg  # also save the last frame
//!
//! Each simulated viewer connects, starts viewing and drains its frame queue.
//! When the last viewer disconnects the source is released (power save),
//! which shows up in the logs as "Video source stopped".
//!
//! Set `RUST_LOG=camcast=debug` for per-transition detail.

use std::sync::Arc;
use std::time::Duration;

use camcast::{Broadcaster, BroadcasterConfig, ChannelSink, ClientId, TestPatternProvider};

fn print_usage() {
    eprintln!("Usage: test_pattern [VIEWERS] [SECONDS] [SNAPSHOT_PATH]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  VIEWERS        Number of simulated viewers (default: 2)");
    eprintln!("  SECONDS        How long to stream (default: 5)");
    eprintln!("  SNAPSHOT_PATH  Write the last frame as JPEG before stopping");
}

fn parse_arg<T: std::str::FromStr>(args: &[String], index: usize, default: T) -> Result<T, String> {
    match args.get(index) {
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("Invalid argument '{}'", raw)),
        None => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let (viewers, seconds) = match (parse_arg(&args, 1, 2usize), parse_arg(&args, 2, 5u64)) {
        (Ok(v), Ok(s)) => (v, s),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };
    let snapshot_path = args.get(3).cloned();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("camcast=info".parse()?)
                .add_directive("test_pattern=info".parse()?),
        )
        .init();

    let sink = Arc::new(ChannelSink::new());
    let broadcaster = Arc::new(Broadcaster::new(
        BroadcasterConfig::default().resolution(640, 360),
        Arc::new(TestPatternProvider::new()),
        sink.clone(),
    ));

    let mut readers = Vec::with_capacity(viewers);
    for n in 0..viewers {
        let id = ClientId::new(format!("viewer-{}", n));
        let mut frames = sink.register(id.clone());

        broadcaster.on_client_connect(id.clone()).await;
        broadcaster.on_start_viewing(id.clone()).await;

        readers.push(tokio::spawn(async move {
            let mut received = 0u64;
            let mut bytes = 0u64;
            while let Some(frame) = frames.recv().await {
                received += 1;
                bytes += frame.jpeg.len() as u64;
            }
            (id, received, bytes)
        }));
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted");
        }
    }

    let status = broadcaster.status().await;
    println!(
        "Status: state={} fps={} viewers={} encoded={} delivered={} dropped={}",
        status.run_state,
        status.fps,
        status.viewers,
        status.stats.frames_encoded,
        status.stats.frames_delivered,
        status.stats.delivery_failures,
    );

    if let Some(path) = snapshot_path {
        match broadcaster.snapshot() {
            Some(frame) => {
                std::fs::write(&path, &frame.jpeg)?;
                println!("Saved frame #{} to {}", frame.sequence, path);
            }
            None => println!("No frame available for snapshot"),
        }
    }

    for n in 0..viewers {
        let id = ClientId::new(format!("viewer-{}", n));
        broadcaster.on_client_disconnect(id.clone()).await;
        sink.unregister(&id);
    }

    for reader in readers {
        let (id, received, bytes) = reader.await?;
        println!("{}: {} frames, {} bytes", id, received, bytes);
    }

    println!("Source active after last disconnect: {}", broadcaster.is_source_active());
    broadcaster.shutdown().await;

    Ok(())
}
