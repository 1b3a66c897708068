//! Tracing setup for the binary.
//!
//! Diagnostics go to stderr so they never mix with the tables on stdout.
//! With a log directory, a daily-rolling plain-text file is written as well.

use std::path::Path;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding a filter directive, e.g. `dirtidy=debug`.
pub const LOG_ENV_VAR: &str = "DIRTIDY_LOG";

/// Base name of the rolling log file.
pub const LOG_FILE_NAME: &str = "dirtidy.log";

/// How chatty the stderr output should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    Quiet,
    Verbose,
    Debug,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, debug: bool) -> Self {
        match (verbose, debug) {
            (_, true) => Verbosity::Debug,
            (true, false) => Verbosity::Verbose,
            (false, false) => Verbosity::Quiet,
        }
    }

    /// Filter used when `DIRTIDY_LOG` is not set.
    pub fn default_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Verbose => "info",
            Verbosity::Debug => "debug",
        }
    }
}

/// Installs the global subscriber.
///
/// `DIRTIDY_LOG` takes precedence over `verbosity`. The returned guard
/// flushes the file writer on drop and must be held until the program ends.
///
/// Installing twice is harmless: the second call leaves the first
/// subscriber in place.
pub fn init_logging(verbosity: Verbosity, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_directive()));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .compact()
        .without_time()
        .with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_ok();
    if installed {
        debug!(?verbosity, log_dir = ?log_dir, "logging initialized");
    }

    guard
}
