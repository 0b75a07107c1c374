//! Startup error kinds. Anything here is fatal: `main` logs it and exits 1.
//!
//! Worker threads never surface these; their failures are `anyhow` errors
//! caught and logged at the worker boundary.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration file {0} not found")]
    ConfigNotFound(PathBuf),

    #[error("configuration file {path} is not valid JSON: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot read configuration file {0}: permission denied")]
    ConfigPermission(PathBuf),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("no default audio {0} device available")]
    NoDefaultAudioDevice(&'static str),

    #[error("failed to detach into the background: {0}")]
    Daemonize(String),
}
