//! Configuration management for daemonctl.
use regex::Regex;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::LazyLock,
    time::Duration,
};
use strum_macros::{AsRefStr, EnumString};

use crate::{
    constants::{
        DEBUG_STDERR_FILE, DEBUG_STDIN_FILE, DEBUG_STDOUT_FILE, DEFAULT_UMASK,
        DEFAULT_WORKING_DIR, DEV_NULL, MODE_ENV_VAR, STOP_SIGNAL_INTERVAL,
    },
    error::ConfigError,
};

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("env var pattern is valid")
});

/// Selects where the daemon's standard streams go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RunMode {
    /// Caller-supplied destinations, `/dev/null` by default.
    #[default]
    Production,
    /// Log files under a scratch directory, for interactive debugging.
    Debug,
}

/// How `stop` delivers termination signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    /// Delay between two `SIGTERM` deliveries.
    pub interval: Duration,
    /// Upper bound on the whole stop; `None` retries until the process is gone.
    pub timeout: Option<Duration>,
    /// Send `SIGKILL` once the timeout elapses instead of failing.
    pub force_kill: bool,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            interval: STOP_SIGNAL_INTERVAL,
            timeout: None,
            force_kill: false,
        }
    }
}

/// Immutable settings of a daemon instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pidfile: PathBuf,
    stdin: PathBuf,
    stdout: PathBuf,
    stderr: PathBuf,
    mode: RunMode,
    working_dir: PathBuf,
    umask: u32,
    stop: StopPolicy,
}

impl DaemonConfig {
    /// Production configuration with every stream discarded.
    pub fn new(pidfile: impl Into<PathBuf>) -> Self {
        Self {
            pidfile: pidfile.into(),
            stdin: PathBuf::from(DEV_NULL),
            stdout: PathBuf::from(DEV_NULL),
            stderr: PathBuf::from(DEV_NULL),
            mode: RunMode::Production,
            working_dir: PathBuf::from(DEFAULT_WORKING_DIR),
            umask: DEFAULT_UMASK,
            stop: StopPolicy::default(),
        }
    }

    /// Debug configuration: streams go to `stdin.log`, `stdout.log` and `stderr.log`
    /// under `scratch_dir`.
    pub fn debug(pidfile: impl Into<PathBuf>, scratch_dir: &Path) -> Self {
        Self {
            stdin: scratch_dir.join(DEBUG_STDIN_FILE),
            stdout: scratch_dir.join(DEBUG_STDOUT_FILE),
            stderr: scratch_dir.join(DEBUG_STDERR_FILE),
            mode: RunMode::Debug,
            ..Self::new(pidfile)
        }
    }

    /// Overrides the stream destinations. Ignored in debug mode, whose destinations are
    /// fixed by the scratch directory.
    pub fn with_streams(
        mut self,
        stdin: impl Into<PathBuf>,
        stdout: impl Into<PathBuf>,
        stderr: impl Into<PathBuf>,
    ) -> Self {
        if self.mode == RunMode::Production {
            self.stdin = stdin.into();
            self.stdout = stdout.into();
            self.stderr = stderr.into();
        }
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_umask(mut self, umask: u32) -> Self {
        self.umask = umask;
        self
    }

    pub fn with_stop_policy(mut self, stop: StopPolicy) -> Self {
        self.stop = stop;
        self
    }

    pub fn pidfile(&self) -> &Path {
        &self.pidfile
    }

    pub fn stdin(&self) -> &Path {
        &self.stdin
    }

    pub fn stdout(&self) -> &Path {
        &self.stdout
    }

    pub fn stderr(&self) -> &Path {
        &self.stderr
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn umask(&self) -> u32 {
        self.umask
    }

    pub fn stop_policy(&self) -> StopPolicy {
        self.stop
    }
}

/// Raw `umask` value, written either as an octal string or as a number whose digits are
/// read as octal.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum UmaskValue {
    Number(u32),
    Text(String),
}

impl UmaskValue {
    fn parse(&self) -> Result<u32, ConfigError> {
        let digits = match self {
            Self::Number(value) => value.to_string(),
            Self::Text(text) => text.trim().trim_start_matches("0o").to_string(),
        };

        u32::from_str_radix(&digits, 8)
            .ok()
            .filter(|mask| *mask <= 0o777)
            .ok_or_else(|| ConfigError::InvalidUmask(digits))
    }
}

/// `stop:` section of the configuration file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StopConfig {
    /// Delay between signals, e.g. `"100ms"`.
    pub interval: Option<String>,
    /// Overall stop deadline, e.g. `"30s"`. Unbounded when absent.
    pub timeout: Option<String>,
    /// Escalate to `SIGKILL` once the timeout elapses.
    #[serde(default)]
    pub force_kill: bool,
}

/// Represents the structure of the configuration file.
#[derive(Debug, Deserialize, Clone)]
pub struct ConfigFile {
    /// Location of the pidfile.
    pub pidfile: String,
    /// Shell command run as the daemon payload.
    pub command: Option<String>,
    /// `production` (default) or `debug`.
    pub mode: Option<String>,
    /// Directory holding the debug-mode stream files.
    pub scratch_dir: Option<String>,
    pub stdin: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// Directory the daemon changes into after detaching.
    pub working_dir: Option<String>,
    pub umask: Option<UmaskValue>,
    pub stop: Option<StopConfig>,
}

/// A parsed configuration file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Daemon settings derived from the file.
    pub daemon: DaemonConfig,
    /// Payload command, if the file declares one.
    pub command: Option<String>,
}

/// Expands `$VAR` and `${VAR}` references from the environment.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing = None;
    let result = ENV_VAR_PATTERN.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(ConfigError::MissingVariable(var_name)),
        None => Ok(result.into_owned()),
    }
}

/// Parses durations such as `100ms`, `5s`, `2m` or `1h`; bare numbers are seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidDuration(raw.to_string()));
    }

    let invalid = || ConfigError::InvalidDuration(raw.to_string());

    if let Some(stripped) = value.strip_suffix("ms") {
        let amount: u64 = stripped.trim().parse().map_err(|_| invalid())?;
        return Ok(Duration::from_millis(amount));
    }

    let (amount_str, multiplier) = if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3600)
    } else {
        (value, 1)
    };

    let amount: u64 = amount_str.parse().map_err(|_| invalid())?;
    Ok(Duration::from_secs(amount.saturating_mul(multiplier)))
}

fn resolve_path(base: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl StopConfig {
    fn to_policy(&self) -> Result<StopPolicy, ConfigError> {
        let defaults = StopPolicy::default();
        Ok(StopPolicy {
            interval: match &self.interval {
                Some(raw) => parse_duration(raw)?,
                None => defaults.interval,
            },
            timeout: self.timeout.as_deref().map(parse_duration).transpose()?,
            force_kill: self.force_kill,
        })
    }
}

impl ConfigFile {
    /// Builds the immutable daemon configuration, resolving relative paths against `base`.
    pub fn into_config(
        self,
        base: &Path,
        mode_override: Option<RunMode>,
    ) -> Result<Config, ConfigError> {
        let mode = match mode_override {
            Some(mode) => mode,
            None => match self.mode.as_deref() {
                Some(raw) => RunMode::from_str(raw.trim())
                    .map_err(|_| ConfigError::InvalidMode(raw.to_string()))?,
                None => RunMode::default(),
            },
        };

        let pidfile = resolve_path(base, &self.pidfile);
        let mut daemon = match mode {
            RunMode::Debug => {
                let scratch = self
                    .scratch_dir
                    .as_deref()
                    .map(|dir| resolve_path(base, dir))
                    .unwrap_or_else(env::temp_dir);
                DaemonConfig::debug(pidfile, &scratch)
            }
            RunMode::Production => {
                let stream = |value: &Option<String>| {
                    value
                        .as_deref()
                        .map(|raw| resolve_path(base, raw))
                        .unwrap_or_else(|| PathBuf::from(DEV_NULL))
                };
                DaemonConfig::new(pidfile).with_streams(
                    stream(&self.stdin),
                    stream(&self.stdout),
                    stream(&self.stderr),
                )
            }
        };

        if let Some(dir) = &self.working_dir {
            daemon = daemon.with_working_dir(resolve_path(base, dir));
        }
        if let Some(umask) = &self.umask {
            daemon = daemon.with_umask(umask.parse()?);
        }
        if let Some(stop) = &self.stop {
            daemon = daemon.with_stop_policy(stop.to_policy()?);
        }

        Ok(Config {
            daemon,
            command: self.command,
        })
    }
}

/// Reads the run mode override from `DCTL_MODE`. Unset or blank means no override.
pub fn mode_from_env() -> Result<Option<RunMode>, ConfigError> {
    match env::var(MODE_ENV_VAR) {
        Ok(raw) if !raw.trim().is_empty() => RunMode::from_str(raw.trim())
            .map(Some)
            .map_err(|_| ConfigError::InvalidMode(raw)),
        _ => Ok(None),
    }
}

/// Loads and parses the configuration file, expanding environment variables.
///
/// The run mode is taken from `mode_override`, then `DCTL_MODE`, then the file.
pub fn load_config(
    config_path: &Path,
    mode_override: Option<RunMode>,
) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
        path: config_path.to_path_buf(),
        source,
    })?;

    let expanded = expand_env_vars(&content)?;
    let file: ConfigFile = serde_yaml::from_str(&expanded)?;

    let base_path = config_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mode = match mode_override {
        Some(mode) => Some(mode),
        None => mode_from_env()?,
    };
    file.into_config(&base_path, mode)
}
