//! Command-line interface for dctl.
use std::str::FromStr;

use clap::{Parser, Subcommand};
use strum_macros::{AsRefStr, EnumString};
use tracing::level_filters::LevelFilter;

use crate::constants::DEFAULT_CONFIG_FILE;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for an `EnvFilter` directive.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };
            return Ok(LogLevelArg(level));
        }

        let level = match trimmed.to_ascii_lowercase().as_str() {
            "off" => LevelFilter::OFF,
            "error" | "err" => LevelFilter::ERROR,
            "warn" | "warning" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            _ => return Err(format!("invalid log level '{trimmed}'")),
        };

        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for dctl.
#[derive(Parser, Debug)]
#[command(name = "dctl", version)]
#[command(about = "Run a command as a pidfile-tracked daemon and control it", long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: String,

    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Force debug mode: daemon streams go to log files in the scratch directory.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Disable ANSI colors in output.
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// The operation to perform.
    #[command(subcommand)]
    pub command: Operation,
}

/// Operations understood by the controller.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    /// Detach and run the configured command as a daemon.
    Start,
    /// Terminate the running daemon.
    Stop,
    /// Stop the daemon, then start it again.
    Restart,
    /// Show whether the daemon is alive.
    Status {
        /// Emit machine-readable JSON instead of the status line.
        #[arg(long)]
        json: bool,
    },
    /// Check the daemon and restart it if it is dead.
    Monitor,
    /// Print the recorded PID.
    Pid,
}

impl Operation {
    /// Name of the operation as typed on the command line.
    pub fn name(&self) -> &str {
        self.as_ref()
    }

    /// Whether the operation may launch the payload.
    pub fn launches_payload(&self) -> bool {
        matches!(self, Self::Start | Self::Restart | Self::Monitor)
    }
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
