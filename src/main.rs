//! CLI entry point: parse flags, set up logging, optionally daemonize, then
//! hand over to the server. Startup failures exit 1; clean shutdown exits 0.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{debug, error, info};

use hermes_satellite::config::{Config, DEFAULT_CONFIG_PATH};
use hermes_satellite::error::StartupError;
use hermes_satellite::{logging, server};

#[derive(Debug, Parser)]
#[command(
    name = "hermes-satellite",
    version,
    about = "Desktop voice satellite for the Hermes protocol"
)]
struct Args {
    /// Use verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Detach into the background and log to a file
    #[arg(short, long)]
    daemon: bool,
}

fn main() {
    let args = Args::parse();
    logging::init(args.verbose, args.daemon);
    info!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    if args.daemon {
        debug!("starting daemon...");
        if let Err(err) = daemonize::Daemonize::new().start() {
            error!("{}. Exiting...", StartupError::Daemonize(err.to_string()));
            process::exit(1);
        }
    }

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}. Exiting...");
            process::exit(1);
        }
    };

    if let Err(err) = server::run(config) {
        error!("{err:#}. Exiting...");
        process::exit(1);
    }
}
