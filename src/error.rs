//! Error handling for daemonctl.
use std::{io, path::PathBuf, time::Duration};

use nix::errno::Errno;
use thiserror::Error;

use crate::lifecycle::LifecycleError;

/// Errors raised by the daemon supervisor operations.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A pidfile is already present, so `start` refuses to fork again.
    #[error("pidfile {} already exist. Daemon already running!", .path.display())]
    AlreadyRunning {
        /// Location of the existing pidfile.
        path: PathBuf,
        /// PID recorded in the existing pidfile, when it could be read.
        pid: Option<u32>,
    },

    /// `fork(2)` failed, usually because of resource exhaustion.
    #[error("fork #{stage} failed: {source}")]
    Fork {
        /// Which of the two forks failed (1 or 2).
        stage: u8,
        /// The underlying OS error.
        #[source]
        source: Errno,
    },

    /// A detachment step other than forking failed.
    #[error("failed to {step} while detaching: {source}")]
    Detach {
        /// Human-readable name of the failing step.
        step: &'static str,
        /// The underlying OS error.
        #[source]
        source: Errno,
    },

    /// Signal delivery failed for a reason other than the process being gone.
    #[error("failed to signal process [{pid}]: {source}")]
    Signal {
        /// Target process id.
        pid: u32,
        /// The underlying OS error.
        #[source]
        source: Errno,
    },

    /// A bounded stop gave up before the process disappeared.
    #[error("process [{pid}] still alive after {waited:?}")]
    StopTimeout {
        /// Target process id.
        pid: u32,
        /// How long the stop loop waited.
        waited: Duration,
    },

    /// Error for pidfile handling.
    #[error("pidfile error: {0}")]
    PidFile(#[from] PidFileError),

    /// Error opening one of the redirection targets.
    #[error("failed to open {}: {source}", .path.display())]
    Redirect {
        /// The redirection target that could not be opened.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The payload reported a failure.
    #[error("payload failed: {0}")]
    Payload(String),

    /// The lifecycle state machine rejected a transition.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Generic I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Error type for pidfile operations.
#[derive(Debug, Error)]
pub enum PidFileError {
    /// Error reading or writing the pidfile.
    #[error("failed to access pidfile: {0}")]
    Io(#[from] io::Error),

    /// The pidfile exists but does not start with a numeric PID.
    #[error("failed to parse pidfile {}: {content:?}", .path.display())]
    Parse {
        /// Location of the malformed pidfile.
        path: PathBuf,
        /// The raw contents that failed to parse.
        content: String,
    },

    /// Exclusive creation found an existing pidfile.
    #[error("pidfile {} already exists", .path.display())]
    AlreadyExists {
        /// Location of the existing pidfile.
        path: PathBuf,
    },
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading a configuration file.
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A `${VAR}` reference names an unset environment variable.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    /// A duration string could not be parsed.
    #[error("Invalid duration value: '{0}'")]
    InvalidDuration(String),

    /// A umask value was not a valid octal mode.
    #[error("Invalid umask value: '{0}'")]
    InvalidUmask(String),

    /// The run mode was not recognised.
    #[error("Unknown run mode '{0}', expected 'debug' or 'production'")]
    InvalidMode(String),
}

/// Errors surfaced by a process inspector.
#[derive(Debug, Error)]
pub enum InspectError {
    /// The requested process is not in the process table.
    #[error("no such process [{0}]")]
    NotFound(u32),
}
