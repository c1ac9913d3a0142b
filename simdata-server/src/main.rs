//! simdata: export live simulator telemetry over HTTP.
//!
//! `simdata` (or `simdata serve`) polls the simulator in the background and
//! serves the latest reading at `/data` plus a small dashboard.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};

use simdata_core::catalog::{format_offset, TypeTag};
use simdata_core::config::{self, Config};
use simdata_core::{Catalog, ReadingStore};
use simdata_feeder::{default_sources, Poller};
use simdata_server::{logging, net, web};

#[derive(Parser)]
#[command(name = "simdata", version, about = "Flight simulator telemetry exporter")]
struct Cli {
    /// Settings file (optional; defaults are used if missing)
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the simulator and serve readings over HTTP (default)
    Serve(ServeArgs),

    /// Print the FSUIPC field catalog in effect
    Offsets {
        /// Offsets file (created with defaults if missing)
        #[arg(long)]
        offsets_file: Option<PathBuf>,
    },

    /// Print the settings in effect, optionally writing them to the settings file
    Settings {
        /// Write the effective settings to the --config path
        #[arg(long)]
        write: bool,
    },

    /// Store the HTTP port in the port file
    Port {
        port: u16,

        /// Port file to write
        #[arg(long)]
        port_file: Option<PathBuf>,
    },
}

#[derive(clap::Args, Default)]
struct ServeArgs {
    /// Bind address
    #[arg(long, env = "SIMDATA_HOST")]
    host: Option<String>,

    /// TCP port (overrides the port file for this run)
    #[arg(short, long, env = "SIMDATA_PORT")]
    port: Option<u16>,

    /// File holding the TCP port
    #[arg(long)]
    port_file: Option<PathBuf>,

    /// FSUIPC offsets file
    #[arg(long)]
    offsets_file: Option<PathBuf>,

    /// Directory with index.html, style.css and html-lang.json
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Fall back to synthetic data when no simulator answers
    #[arg(long)]
    mock: bool,

    /// Start with polling stopped
    #[arg(long)]
    armed: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let mut settings = config::load_config(&cli.config);

    match cli.command {
        None => cmd_serve(settings, ServeArgs::default()),
        Some(Commands::Serve(args)) => cmd_serve(settings, args),
        Some(Commands::Offsets { offsets_file }) => {
            if let Some(path) = offsets_file {
                settings.files.offsets_file = path.display().to_string();
            }
            cmd_offsets(Path::new(&settings.files.offsets_file));
        }
        Some(Commands::Settings { write }) => cmd_settings(&cli.config, &settings, write),
        Some(Commands::Port { port, port_file }) => {
            let path = port_file.unwrap_or_else(|| PathBuf::from(&settings.files.port_file));
            cmd_port(&path, port);
        }
    }
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

fn apply_overrides(settings: &mut Config, args: &ServeArgs) {
    if let Some(host) = &args.host {
        settings.server.host = host.clone();
    }
    if let Some(dir) = &args.static_dir {
        settings.server.static_dir = dir.display().to_string();
    }
    if let Some(path) = &args.port_file {
        settings.files.port_file = path.display().to_string();
    }
    if let Some(path) = &args.offsets_file {
        settings.files.offsets_file = path.display().to_string();
    }
    if args.mock {
        settings.poller.mock = true;
    }
}

fn cmd_serve(mut settings: Config, args: ServeArgs) {
    apply_overrides(&mut settings, &args);
    let port = config::effective_port(args.port, Path::new(&settings.files.port_file));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Cannot start async runtime");
            process::exit(1);
        }
    };

    // Bind before polling starts so a taken port fails fast.
    let listener = match runtime.block_on(web::bind(&settings.server.host, port)) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(host = %settings.server.host, port, error = %e, "Cannot bind HTTP port");
            process::exit(1);
        }
    };

    let catalog = Catalog::load_or_init(Path::new(&settings.files.offsets_file));
    let store = Arc::new(ReadingStore::new());
    let poller = Poller::new(
        Arc::clone(&store),
        default_sources(catalog, settings.poller.mock),
        settings.poller.clone(),
    );
    let mut handle = match poller.spawn() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "Cannot start poller thread");
            process::exit(1);
        }
    };
    if !args.armed {
        handle.start();
    }

    let url = net::dashboard_url(&net::display_host(&settings.server.host), port);
    tracing::info!(%url, "Dashboard available");

    let state = Arc::new(web::AppState {
        store,
        static_dir: PathBuf::from(&settings.server.static_dir),
    });
    let served = runtime.block_on(web::serve(listener, state, shutdown_signal()));

    handle.shutdown();
    if let Err(e) = served {
        tracing::error!(error = %e, "HTTP server failed");
        process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

// ---------------------------------------------------------------------------
// offsets / settings / port
// ---------------------------------------------------------------------------

fn cmd_offsets(path: &Path) {
    let catalog = Catalog::load_or_init(path);

    let mut table = Table::new();
    table.set_header(vec!["Name", "Offset", "Type", "Scale", "Add", "Divisor"]);
    for spec in catalog.specs() {
        let tag = match spec.encoding.tag() {
            TypeTag::Code(code) => code,
            TypeTag::Length(len) => format!("text[{len}]"),
        };
        table.add_row(vec![
            Cell::new(&spec.name),
            Cell::new(format_offset(spec.offset)),
            Cell::new(tag),
            Cell::new(spec.scale),
            Cell::new(spec.offset_add),
            Cell::new(spec.divisor.map(|d| d.to_string()).unwrap_or_else(|| "-".into())),
        ]);
    }

    println!("{table}");
    println!("Offsets file: {}", path.display());
}

fn cmd_settings(path: &Path, settings: &Config, write: bool) {
    print!("{}", config::serialize_config(settings));
    if !write {
        return;
    }
    match config::save_config(path, settings) {
        Ok(()) => println!("Settings saved to {}", path.display()),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Cannot save settings");
            process::exit(1);
        }
    }
}

fn cmd_port(path: &Path, port: u16) {
    match config::save_port(path, port) {
        Ok(()) => println!("Port {port} saved to {}", path.display()),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Cannot save port");
            process::exit(1);
        }
    }
}
