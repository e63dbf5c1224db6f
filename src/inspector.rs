//! Process inspection and signal delivery.
//!
//! Both are collaborators of the supervisor rather than part of it, so they sit behind
//! small traits: [`ProcessInspector`] answers "is this PID alive and what is it", and
//! [`Signaller`] delivers signals.
use std::{collections::HashSet, fmt};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid as NixPid,
};
use serde::Serialize;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

use crate::error::InspectError;

/// Snapshot of a process as reported by `status` and `monitor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    /// Process id.
    pub pid: u32,
    /// Command-line tokens.
    pub cmdline: Vec<String>,
    /// Whether the process is still executing (not a zombie).
    pub running: bool,
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Status:[{}] PID:[{}]",
            self.cmdline.join(" "),
            self.running,
            self.pid
        )
    }
}

/// Coarse liveness of a PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exited but not yet reaped by its parent.
    Zombie,
    Missing,
}

/// Enumerates processes and describes individual ones.
pub trait ProcessInspector {
    /// All PIDs currently present in the process table.
    fn live_pids(&self) -> Result<HashSet<u32>, InspectError>;

    /// Command line and running flag for `pid`.
    fn describe(&self, pid: u32) -> Result<ProcessInfo, InspectError>;

    /// Liveness of `pid`.
    fn state(&self, pid: u32) -> ProcessState;
}

/// Inspector backed by the `sysinfo` process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoInspector;

impl SysinfoInspector {
    pub fn new() -> Self {
        Self
    }

    fn refreshed(pid: u32) -> System {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[Pid::from_u32(pid)]),
            true,
            ProcessRefreshKind::everything(),
        );
        system
    }

    fn is_defunct(process: &Process) -> bool {
        matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
    }
}

impl ProcessInspector for SysinfoInspector {
    fn live_pids(&self) -> Result<HashSet<u32>, InspectError> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        Ok(system.processes().keys().map(|pid| pid.as_u32()).collect())
    }

    fn describe(&self, pid: u32) -> Result<ProcessInfo, InspectError> {
        let system = Self::refreshed(pid);
        let process = system
            .process(Pid::from_u32(pid))
            .ok_or(InspectError::NotFound(pid))?;

        let mut cmdline: Vec<String> = process
            .cmd()
            .iter()
            .map(|token| token.to_string_lossy().into_owned())
            .collect();
        if cmdline.is_empty() {
            cmdline.push(process.name().to_string_lossy().into_owned());
        }

        Ok(ProcessInfo {
            pid,
            cmdline,
            running: !Self::is_defunct(process),
        })
    }

    fn state(&self, pid: u32) -> ProcessState {
        let system = Self::refreshed(pid);
        match system.process(Pid::from_u32(pid)) {
            None => ProcessState::Missing,
            Some(process) if Self::is_defunct(process) => ProcessState::Zombie,
            Some(_) => ProcessState::Running,
        }
    }
}

/// Delivers signals to processes.
pub trait Signaller {
    /// Sends `signal` to `pid`. `ESRCH` means the process no longer exists.
    fn send(&self, pid: u32, signal: Signal) -> Result<(), Errno>;

    /// Checks that `pid` still exists without delivering anything (signal 0).
    fn check(&self, pid: u32) -> Result<(), Errno>;
}

/// Signaller using `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct KillSignaller;

impl Signaller for KillSignaller {
    fn send(&self, pid: u32, signal: Signal) -> Result<(), Errno> {
        signal::kill(target(pid)?, signal)
    }

    fn check(&self, pid: u32) -> Result<(), Errno> {
        signal::kill(target(pid)?, None)
    }
}

// PIDs beyond i32 cannot exist; kill(2) would read them as process groups.
fn target(pid: u32) -> Result<NixPid, Errno> {
    i32::try_from(pid)
        .map(NixPid::from_raw)
        .map_err(|_| Errno::ESRCH)
}
