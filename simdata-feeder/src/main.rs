//! simdata-feeder: check simulator interfaces and dump live readings.
//!
//! Runs the poller in the foreground without the HTTP layer. Useful for
//! checking which interface a machine exposes before exporting.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing_subscriber::EnvFilter;

use simdata_core::config::PollerConfig;
use simdata_core::{Catalog, ReadingStore};
use simdata_feeder::{default_sources, CycleOutcome, Poller};

#[derive(Parser)]
#[command(
    name = "simdata-feeder",
    version,
    about = "Flight simulator telemetry sources"
)]
struct Cli {
    /// Offsets file for the FSUIPC source
    #[arg(long, global = true, default_value = simdata_core::catalog::DEFAULT_OFFSETS_FILE)]
    offsets_file: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which simulator interfaces are present and reachable
    Probe,

    /// Poll and print one JSON reading per cycle
    Watch {
        /// Stop after this many cycles (runs until killed if omitted)
        #[arg(short, long)]
        count: Option<u64>,

        /// Add the synthetic source as a last resort
        #[arg(long)]
        mock: bool,

        /// Milliseconds between cycles
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Probe => cmd_probe(&cli.offsets_file),
        Commands::Watch {
            count,
            mock,
            interval_ms,
        } => cmd_watch(&cli.offsets_file, count, mock, interval_ms),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_probe(offsets_file: &Path) {
    let catalog = Catalog::load_or_init(offsets_file);
    let mut sources = default_sources(catalog, false);

    let mut table = Table::new();
    table.set_header(vec!["Source", "Available", "Connected"]);
    for source in sources.iter_mut() {
        let available = source.available();
        let connected = available && source.connect();
        table.add_row(vec![
            Cell::new(source.source()),
            Cell::new(if available { "yes" } else { "no" }),
            Cell::new(if connected { "yes" } else { "no" }),
        ]);
    }
    println!("{table}");
}

fn cmd_watch(offsets_file: &Path, count: Option<u64>, mock: bool, interval_ms: u64) {
    let catalog = Catalog::load_or_init(offsets_file);
    let config = PollerConfig {
        interval_ms,
        backoff_ms: interval_ms,
        mock,
        ..PollerConfig::default()
    };
    let store = Arc::new(ReadingStore::new());
    let mut poller = Poller::new(
        Arc::clone(&store),
        default_sources(catalog, config.mock),
        config.clone(),
    );
    poller.warm_up();

    let mut cycles = 0u64;
    while count.map_or(true, |n| cycles < n) {
        let outcome = poller.cycle();
        cycles += 1;

        match serde_json::to_string(&store.snapshot()) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!(error = %e, "Cannot serialize reading"),
        }

        if count.map_or(true, |n| cycles < n) {
            thread::sleep(match outcome {
                CycleOutcome::Published(_) => config.interval(),
                CycleOutcome::Unavailable => config.backoff(),
            });
        }
    }
}
