//! Demo: concurrent increments drained by a bounded periodic flush.
//!
//! Run with:
//! ```bash
//! RUST_LOG=registro=trace cargo run --example flush_demo --features demo -- --help
//! ```

use clap::{Parser, ValueEnum};
use registro::{CounterStore, FlushConfig, StoreSnapshot};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// What the flush callback does on each tick.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum FlushMode {
    /// Print the drained snapshot, then start from zero
    #[default]
    Drain,
    /// Discard every counter without reporting it
    Reset,
}

/// Output format for drained snapshots.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// One `key = value` line per counter
    #[default]
    Text,
    /// JSON document
    Json,
}

/// Demo application for registro - keyed counters with a periodic flush.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Flush interval in milliseconds
    #[arg(short, long, default_value = "5000")]
    interval: u64,

    /// Flush lifetime in milliseconds (0 = until the demo ends)
    #[arg(short, long, default_value = "60000")]
    lifetime: u64,

    /// What to do on each flush
    #[arg(short, long, value_enum, default_value = "drain")]
    mode: FlushMode,

    /// Output format for drained snapshots
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Pretty print JSON output
    #[arg(long)]
    pretty: bool,

    /// Number of writer threads
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Increments per writer thread per round
    #[arg(long, default_value = "10000")]
    iterations: usize,

    /// Number of rounds; the store is printed after each one
    #[arg(short, long, default_value = "5")]
    rounds: usize,

    /// Pause between rounds in milliseconds
    #[arg(long, default_value = "2000")]
    pause: u64,
}

fn configure_logger() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

fn render(args: &Args, snapshot: StoreSnapshot) -> String {
    let snapshot = snapshot.sorted();
    match args.format {
        OutputFormat::Text => snapshot
            .iter()
            .map(|counter| format!("{} = {}", counter.key, counter.value))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => {
            let json = if args.pretty {
                snapshot.to_json_pretty()
            } else {
                snapshot.to_json()
            };
            json.unwrap_or_else(|e| format!("Error: {}", e))
        }
    }
}

/// Writers bump a handful of keys with positive and negative deltas.
fn simulate_traffic(store: &Arc<CounterStore>, num_threads: usize, iterations: usize) {
    let mut handles = vec![];

    for i in 0..num_threads {
        let store = Arc::clone(store);
        handles.push(thread::spawn(move || {
            for j in 0..iterations {
                store.increment("get.called", 1);

                // Simulate ~5% error rate
                if (i * iterations + j) % 20 == 0 {
                    store.increment("get.errors", 1);
                }

                // Simulate connection churn
                if j % 10 == 0 {
                    store.increment("connections", 1);
                }
                if j % 15 == 0 {
                    store.increment("connections", -1);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

fn main() -> registro::Result<()> {
    let args = Args::parse();
    configure_logger();

    let store: Arc<CounterStore> = Arc::new(CounterStore::new());

    let mut config = FlushConfig::new(Duration::from_millis(args.interval));
    config = if args.lifetime == 0 {
        config.unbounded()
    } else {
        config.with_lifetime(Duration::from_millis(args.lifetime))
    };

    let handle = match args.mode {
        FlushMode::Reset => config.start(store.reset_callback())?,
        FlushMode::Drain => {
            let args = args.clone();
            config.start(store.flush_callback(move |snapshot| {
                if !snapshot.is_empty() {
                    println!("--- flush ---\n{}", render(&args, snapshot));
                }
            }))?
        }
    };

    for round in 0..args.rounds {
        simulate_traffic(&store, args.threads, args.iterations);
        println!("round {}: get.called = {}", round + 1, store.get("get.called"));
        thread::sleep(Duration::from_millis(args.pause));
    }

    handle.shutdown()?;

    let leftover = store.drain();
    if !leftover.is_empty() {
        println!("--- final ---\n{}", render(&args, leftover));
    }

    Ok(())
}
