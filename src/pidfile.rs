//! Identity record handling.
//!
//! A pidfile holds a single line `"<pid>_<YYYY-MM-DD HH:MM:SS>\n"` naming the process that
//! currently runs as the daemon. Controllers and the daemon never share memory, so this
//! file is the only source of truth for which OS process the daemon is.
use std::{
    ffi::OsString,
    fmt,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime, Timelike};
use tracing::{debug, warn};

use crate::{
    constants::{PID_RECORD_SEPARATOR, PID_STAGING_SUFFIX, PID_TIMESTAMP_FORMAT},
    error::PidFileError,
};

/// Contents of a pidfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidRecord {
    /// Process id of the daemon.
    pub pid: u32,
    /// Local time at which the record was written, when known.
    pub started_at: Option<NaiveDateTime>,
}

impl PidRecord {
    /// Builds a record for `pid` stamped with the current local time.
    pub fn now(pid: u32) -> Self {
        Self {
            pid,
            started_at: Local::now().naive_local().with_nanosecond(0),
        }
    }

    /// Parses pidfile contents. Only the PID is mandatory; a missing or malformed
    /// timestamp is tolerated so that records written by other tools stay usable.
    ///
    /// PID 0 is rejected since signalling it would address the caller's process group.
    pub fn parse(content: &str) -> Option<Self> {
        let line = content.lines().next()?.trim();
        let (pid_part, stamp_part) = match line.split_once(PID_RECORD_SEPARATOR) {
            Some((pid, stamp)) => (pid, Some(stamp)),
            None => (line, None),
        };

        let pid = pid_part.trim().parse::<u32>().ok().filter(|pid| *pid > 0)?;
        let started_at = stamp_part.and_then(|stamp| {
            NaiveDateTime::parse_from_str(stamp.trim(), PID_TIMESTAMP_FORMAT).ok()
        });

        Some(Self { pid, started_at })
    }

    /// Serialises the record as written to disk, trailing newline included.
    pub fn encode(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for PidRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.started_at {
            Some(stamp) => write!(
                f,
                "{}{}{}",
                self.pid,
                PID_RECORD_SEPARATOR,
                stamp.format(PID_TIMESTAMP_FORMAT)
            ),
            None => write!(f, "{}", self.pid),
        }
    }
}

/// Handle on the pidfile at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Creates a handle; nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the pidfile path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a pidfile currently exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads the record. An absent file is `Ok(None)`.
    pub fn read(&self) -> Result<Option<PidRecord>, PidFileError> {
        let content = match fs::read(&self.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        PidRecord::parse(&content)
            .map(Some)
            .ok_or_else(|| PidFileError::Parse {
                path: self.path.clone(),
                content,
            })
    }

    /// Returns the recorded PID, treating unreadable or malformed records as absent.
    pub fn pid(&self) -> Option<u32> {
        match self.read() {
            Ok(record) => record.map(|record| record.pid),
            Err(err) => {
                debug!("Ignoring unusable pidfile {:?}: {err}", self.path);
                None
            }
        }
    }

    /// Writes `record` only if no pidfile exists yet.
    ///
    /// The record is staged in a sibling file and hard-linked into place, so concurrent
    /// writers cannot both succeed and readers never see a partial line.
    pub fn create(&self, record: &PidRecord) -> Result<(), PidFileError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let staging = self.staging_path(record.pid);
        fs::write(&staging, record.encode())?;
        let linked = fs::hard_link(&staging, &self.path);
        if let Err(err) = fs::remove_file(&staging) {
            warn!("Failed to remove staging pidfile {:?}: {err}", staging);
        }

        match linked {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(PidFileError::AlreadyExists {
                    path: self.path.clone(),
                })
            }
            Err(err) => {
                debug!(
                    "Hard link into {:?} failed ({err}); falling back to exclusive create",
                    self.path
                );
                self.create_in_place(record)
            }
        }
    }

    fn create_in_place(&self, record: &PidRecord) -> Result<(), PidFileError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|err| {
                if err.kind() == ErrorKind::AlreadyExists {
                    PidFileError::AlreadyExists {
                        path: self.path.clone(),
                    }
                } else {
                    PidFileError::Io(err)
                }
            })?;
        file.write_all(record.encode().as_bytes())?;
        Ok(())
    }

    /// Deletes the pidfile. Returns `false` when there was nothing to delete.
    pub fn remove(&self) -> Result<bool, PidFileError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns a guard that deletes the record for `pid` when dropped.
    pub fn guard(&self, pid: u32) -> PidFileGuard {
        PidFileGuard {
            pidfile: self.clone(),
            pid,
        }
    }

    fn staging_path(&self, pid: u32) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{pid}{PID_STAGING_SUFFIX}"));
        PathBuf::from(name)
    }
}

/// Removes the pidfile on drop, provided it still names the guarded process.
#[derive(Debug)]
pub struct PidFileGuard {
    pidfile: PidFile,
    pid: u32,
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        match self.pidfile.read() {
            Ok(Some(record)) if record.pid == self.pid => {
                if let Err(err) = self.pidfile.remove() {
                    warn!("Failed to remove pidfile {:?}: {err}", self.pidfile.path);
                } else {
                    debug!("Removed pidfile {:?}", self.pidfile.path);
                }
            }
            Ok(Some(record)) => {
                debug!(
                    "Pidfile {:?} now belongs to PID {}; leaving it in place",
                    self.pidfile.path, record.pid
                );
            }
            Ok(None) => {}
            Err(err) => warn!("Unable to verify pidfile before cleanup: {err}"),
        }
    }
}
