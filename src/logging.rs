//! tracing initialization for interactive and daemonized runs.

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

/// Where the daemonized process writes its log.
pub fn daemon_log_path() -> PathBuf {
    env::var("HERMES_SATELLITE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("hermes-satellite.log"))
}

/// Install the global subscriber. `RUST_LOG` overrides the flag-derived
/// level. Safe to call more than once; only the first call wins.
pub fn init(verbose: bool, daemon: bool) {
    INIT.get_or_init(|| {
        let fallback = if verbose { "debug" } else { "info" };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
        if daemon {
            if let Ok(file) = OpenOptions::new()
                .create(true)
                .append(true)
                .open(daemon_log_path())
            {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(file)
                    .with_ansi(false)
                    .try_init();
                return;
            }
            // Fall back to stdout when the log file cannot be opened; the
            // daemon parent will have redirected it, but we keep running.
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(fallback))
                .try_init();
        } else {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    });
}
