//! Status reporting for the supervised daemon.
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::{
    constants::{GREEN_BOLD, RED_BOLD, RESET},
    inspector::ProcessInfo,
};

/// Colours used for controller output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    Green,
    Red,
}

/// Wraps `text` in ANSI colour codes when `enabled`.
pub fn colour(text: &str, colour: Colour, enabled: bool) -> String {
    if !enabled {
        return text.to_string();
    }

    let code = match colour {
        Colour::Green => GREEN_BOLD,
        Colour::Red => RED_BOLD,
    };
    format!("{code} {text} {RESET}")
}

/// Message written to stderr whenever the daemon is found not running.
pub fn not_running_message(pidfile: &Path) -> String {
    format!(
        "pidfile {} does not exist. Daemon not running!",
        pidfile.display()
    )
}

/// Renders an optional PID the way the controller prints it.
pub fn display_pid(pid: Option<u32>) -> String {
    pid.map(|pid| pid.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Result of a `status` or `monitor` liveness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    /// The recorded PID is alive.
    Running {
        /// Pidfile that was consulted.
        pidfile: PathBuf,
        /// Details of the live process.
        info: ProcessInfo,
    },
    /// No pidfile, or its PID is not in the live process set.
    NotFound {
        /// Pidfile that was consulted.
        pidfile: PathBuf,
        /// PID read from the pidfile, if any.
        pid: Option<u32>,
    },
}

#[derive(Serialize)]
struct StatusJson<'a> {
    pidfile: &'a Path,
    pid: Option<u32>,
    running: bool,
    cmdline: &'a [String],
}

impl StatusReport {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Running { info, .. } => Some(info.pid),
            Self::NotFound { pid, .. } => *pid,
        }
    }

    pub fn pidfile(&self) -> &Path {
        match self {
            Self::Running { pidfile, .. } | Self::NotFound { pidfile, .. } => pidfile,
        }
    }

    /// Line printed on stdout.
    pub fn render(&self, colour_enabled: bool) -> String {
        match self {
            Self::Running { info, .. } => {
                colour(&info.to_string(), Colour::Green, colour_enabled)
            }
            Self::NotFound { pid, .. } => colour(
                &format!("Not found process [{}]", display_pid(*pid)),
                Colour::Red,
                colour_enabled,
            ),
        }
    }

    /// Line printed on stderr, if any.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::Running { .. } => None,
            Self::NotFound { pidfile, .. } => Some(not_running_message(pidfile)),
        }
    }

    /// Machine-readable form used by `status --json`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let (running, cmdline) = match self {
            Self::Running { info, .. } => (info.running, info.cmdline.as_slice()),
            Self::NotFound { .. } => (false, &[][..]),
        };

        serde_json::to_string(&StatusJson {
            pidfile: self.pidfile(),
            pid: self.pid(),
            running,
            cmdline,
        })
    }
}
