//! Constants and default values for the daemon supervisor.
//!
//! Timing defaults, file names and the user-facing message templates live here so the
//! controller output stays consistent between operations.

use std::time::Duration;

// ============================================================================
// Configuration Defaults
// ============================================================================

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "daemon.yaml";

/// Environment variable that overrides the configured run mode.
pub const MODE_ENV_VAR: &str = "DCTL_MODE";

/// Destination used for every standard stream unless configured otherwise.
pub const DEV_NULL: &str = "/dev/null";

/// Working directory the daemon moves into after the first fork.
pub const DEFAULT_WORKING_DIR: &str = "/";

/// File creation mask applied by the detached daemon.
pub const DEFAULT_UMASK: u32 = 0;

/// Stream file names used under the scratch directory in debug mode.
pub const DEBUG_STDIN_FILE: &str = "stdin.log";
/// See [`DEBUG_STDIN_FILE`].
pub const DEBUG_STDOUT_FILE: &str = "stdout.log";
/// See [`DEBUG_STDIN_FILE`].
pub const DEBUG_STDERR_FILE: &str = "stderr.log";

// ============================================================================
// Identity Record
// ============================================================================

/// Separator between the PID and the timestamp in a pidfile.
pub const PID_RECORD_SEPARATOR: char = '_';

/// `chrono` format of the pidfile timestamp.
pub const PID_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Suffix of the scratch file a record is staged in before it is linked into place.
pub const PID_STAGING_SUFFIX: &str = ".tmp";

// ============================================================================
// Termination Timing
// ============================================================================

/// Delay between two graceful-termination signals in `stop`.
pub const STOP_SIGNAL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Shell Execution
// ============================================================================

/// Shell used to run the configured payload command.
pub const DEFAULT_SHELL: &str = "sh";

/// Shell argument flag for executing command strings.
pub const SHELL_COMMAND_FLAG: &str = "-c";

// ============================================================================
// Output
// ============================================================================

/// Bright green, used for healthy results.
pub const GREEN_BOLD: &str = "\x1b[32;1m";

/// Bright red, used for missing processes.
pub const RED_BOLD: &str = "\x1b[31;1m";

/// Reset color.
pub const RESET: &str = "\x1b[0m";
