//! Daemon supervisor: turns the calling process into a pidfile-tracked background
//! daemon and controls it from later, independent invocations.
//!
//! `start` double-forks, detaches and runs the payload; `stop`, `status`, `monitor` and
//! `pid` only ever talk to the daemon through the pidfile and signals, since controller
//! invocations share no memory with it.
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    os::fd::AsRawFd,
    path::{Path, PathBuf},
    process, thread,
    time::Instant,
};

use nix::{
    errno::Errno,
    sys::{
        signal::Signal,
        stat::{Mode, umask},
    },
    unistd::{ForkResult, chdir, dup2, fork, setsid},
};
use tracing::{debug, error, info, warn};

use crate::{
    config::DaemonConfig,
    error::{DaemonError, PidFileError},
    inspector::{KillSignaller, ProcessInspector, ProcessState, Signaller, SysinfoInspector},
    lifecycle::{DaemonState, Lifecycle, LifecycleEvent},
    payload::Payload,
    pidfile::{PidFile, PidRecord},
    status::{Colour, StatusReport, colour, not_running_message},
};

/// Result of a `stop` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No pidfile was present; nothing was signalled.
    NotRunning,
    /// The recorded process is gone and its pidfile cleared.
    Stopped {
        /// PID that was terminated.
        pid: u32,
        /// Number of signals delivered before the process disappeared.
        signals_sent: u32,
        /// Whether the stop had to escalate to `SIGKILL`.
        forced: bool,
    },
}

/// Result of a `monitor` call that did not hand over to a new daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The recorded daemon is alive.
    Healthy(StatusReport),
    /// The daemon was dead and has been restarted; only returned inside the new daemon
    /// once its payload completes.
    Restarted {
        /// PID found in the stale pidfile, if any.
        previous: Option<u32>,
    },
}

/// Supervises one daemon identified by its pidfile.
pub struct Daemon<I = SysinfoInspector, S = KillSignaller> {
    config: DaemonConfig,
    pidfile: PidFile,
    inspector: I,
    signaller: S,
    lifecycle: Lifecycle,
    colour: bool,
}

impl Daemon {
    /// Creates a supervisor using the system process table and `kill(2)`.
    pub fn new(config: DaemonConfig) -> Self {
        Self::with_collaborators(config, SysinfoInspector::new(), KillSignaller)
    }
}

impl<I, S> Daemon<I, S>
where
    I: ProcessInspector,
    S: Signaller,
{
    /// Creates a supervisor with explicit inspection and signalling backends.
    pub fn with_collaborators(config: DaemonConfig, inspector: I, signaller: S) -> Self {
        // The daemon changes directory before writing the pidfile, so pin it now.
        let pidfile = PidFile::new(absolute(config.pidfile()));
        Self {
            config,
            pidfile,
            inspector,
            signaller,
            lifecycle: Lifecycle::new(),
            colour: true,
        }
    }

    /// Enables or disables ANSI colours in printed results.
    pub fn with_colour(mut self, enabled: bool) -> Self {
        self.colour = enabled;
        self
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn pidfile(&self) -> &PidFile {
        &self.pidfile
    }

    /// Lifecycle state as seen by this supervisor instance.
    pub fn state(&self) -> DaemonState {
        self.lifecycle.state()
    }

    /// Detaches into a daemon and runs `payload` once.
    ///
    /// Refuses to do anything while a pidfile exists, even a stale one. The launching
    /// process and the intermediate fork exit with status 0 inside this call; it only
    /// returns in the daemon itself (after the payload finished) or on failure.
    pub fn start<P: Payload + ?Sized>(&mut self, payload: &mut P) -> Result<(), DaemonError> {
        if self.pidfile.exists() {
            let pid = self.pidfile.pid();
            if let Some(pid) = pid
                && self.inspector.state(pid) == ProcessState::Missing
            {
                warn!(
                    "Recorded PID {pid} is not alive; run `restart` to clear the stale pidfile"
                );
            }
            return Err(DaemonError::AlreadyRunning {
                path: self.pidfile.path().to_path_buf(),
                pid,
            });
        }

        self.lifecycle.advance(LifecycleEvent::Fork)?;
        self.detach()?;
        self.lifecycle.advance(LifecycleEvent::Detach)?;

        let pid = process::id();
        let _guard = self.pidfile.guard(pid);
        self.pidfile
            .create(&PidRecord::now(pid))
            .map_err(|err| match err {
                PidFileError::AlreadyExists { path } => {
                    DaemonError::AlreadyRunning { path, pid: None }
                }
                other => other.into(),
            })?;
        self.lifecycle.advance(LifecycleEvent::Launch)?;
        info!(
            "Daemon running as PID {pid} (pidfile {:?})",
            self.pidfile.path()
        );

        let result = payload.run();
        self.lifecycle.advance(LifecycleEvent::Exit)?;

        result.map_err(|err| {
            error!("Daemon payload failed: {err}");
            DaemonError::Payload(err.to_string())
        })
    }

    /// Terminates the recorded daemon.
    ///
    /// Sends `SIGTERM` every `interval` until delivery fails with `ESRCH`, then clears the
    /// pidfile if it still names the stopped process. Without a configured timeout this
    /// retries indefinitely.
    pub fn stop(&mut self) -> Result<StopOutcome, DaemonError> {
        let Some(pid) = self.recorded_pid_for_stop()? else {
            println!(
                "{}",
                colour("Not found process [-]", Colour::Red, self.colour)
            );
            eprintln!("{}", not_running_message(self.pidfile.path()));
            return Ok(StopOutcome::NotRunning);
        };

        let policy = self.config.stop_policy();
        let mut lifecycle = Lifecycle::observed(DaemonState::Running);
        lifecycle.advance(LifecycleEvent::Terminate)?;

        let started = Instant::now();
        let mut forced_at: Option<Instant> = None;
        let mut kill_sent = false;
        let mut signals_sent = 0u32;

        loop {
            // After the single SIGKILL only existence is polled.
            let delivery = match (forced_at, kill_sent) {
                (Some(_), true) => self.signaller.check(pid),
                (Some(_), false) => {
                    kill_sent = true;
                    self.deliver(pid, Signal::SIGKILL, &mut signals_sent)
                }
                (None, _) => self.deliver(pid, Signal::SIGTERM, &mut signals_sent),
            };

            match delivery {
                Ok(()) => {}
                Err(Errno::ESRCH) => break,
                Err(source) => return Err(DaemonError::Signal { pid, source }),
            }

            thread::sleep(policy.interval);

            if self.inspector.state(pid) == ProcessState::Zombie {
                debug!("PID {pid} exited and awaits reaping by its parent");
                break;
            }

            if let Some(timeout) = policy.timeout {
                match forced_at {
                    None if started.elapsed() >= timeout => {
                        if !policy.force_kill {
                            return Err(DaemonError::StopTimeout {
                                pid,
                                waited: started.elapsed(),
                            });
                        }
                        warn!("PID {pid} ignored SIGTERM for {timeout:?}; sending SIGKILL");
                        forced_at = Some(Instant::now());
                    }
                    Some(forced) if forced.elapsed() >= timeout => {
                        return Err(DaemonError::StopTimeout {
                            pid,
                            waited: started.elapsed(),
                        });
                    }
                    _ => {}
                }
            }
        }

        lifecycle.advance(LifecycleEvent::Exit)?;
        self.lifecycle = lifecycle;
        self.clear_pidfile_for(pid)?;

        println!(
            "{}",
            colour(
                &format!("kill process [{pid}] success"),
                Colour::Green,
                self.colour
            )
        );
        Ok(StopOutcome::Stopped {
            pid,
            signals_sent,
            forced: forced_at.is_some(),
        })
    }

    /// `stop` followed by `start`.
    pub fn restart<P: Payload + ?Sized>(&mut self, payload: &mut P) -> Result<(), DaemonError> {
        self.stop()?;
        self.start(payload)
    }

    /// Checks the recorded PID against the live process table without printing.
    ///
    /// Inspector failures and zombie processes count as "not found".
    pub fn inspect(&self) -> StatusReport {
        let pidfile = self.pidfile.path().to_path_buf();
        let Some(pid) = self.pidfile.pid() else {
            return StatusReport::NotFound { pidfile, pid: None };
        };

        let live = match self.inspector.live_pids() {
            Ok(pids) => pids.contains(&pid),
            Err(err) => {
                debug!("Process listing failed: {err}");
                false
            }
        };
        if !live {
            return StatusReport::NotFound {
                pidfile,
                pid: Some(pid),
            };
        }

        match self.inspector.describe(pid) {
            Ok(info) if info.running => StatusReport::Running { pidfile, info },
            Ok(_) => StatusReport::NotFound {
                pidfile,
                pid: Some(pid),
            },
            Err(err) => {
                debug!("Unable to describe PID {pid}: {err}");
                StatusReport::NotFound {
                    pidfile,
                    pid: Some(pid),
                }
            }
        }
    }

    /// Prints the daemon's status line (and the not-running notice on stderr).
    pub fn status(&self) -> StatusReport {
        let report = self.inspect();
        println!("{}", report.render(self.colour));
        if let Some(diagnostic) = report.diagnostic() {
            eprintln!("{diagnostic}");
        }
        report
    }

    /// Like `status`, but restarts the daemon when it is not alive.
    pub fn monitor<P: Payload + ?Sized>(
        &mut self,
        payload: &mut P,
    ) -> Result<MonitorOutcome, DaemonError> {
        let report = self.inspect();
        if report.is_running() {
            println!("{}", report.render(self.colour));
            return Ok(MonitorOutcome::Healthy(report));
        }

        warn!(
            "Daemon for {:?} is not running; restarting",
            self.pidfile.path()
        );
        let previous = report.pid();
        self.restart(payload)?;
        Ok(MonitorOutcome::Restarted { previous })
    }

    /// Prints the recorded PID, or a not-found notice. Never fails.
    pub fn pid(&self) -> Option<u32> {
        let pid = self.pidfile.pid();
        match pid {
            Some(pid) => println!("{pid}"),
            None => println!("{}", colour("Not found pid", Colour::Red, self.colour)),
        }
        pid
    }

    fn deliver(&self, pid: u32, signal: Signal, sent: &mut u32) -> Result<(), Errno> {
        match self.signaller.send(pid, signal) {
            Ok(()) => {
                *sent += 1;
                Ok(())
            }
            Err(Errno::ESRCH) => Err(Errno::ESRCH),
            Err(source) => {
                error!("Failed to deliver {signal} to PID {pid}: {source}");
                Err(source)
            }
        }
    }

    /// PID that `stop` should terminate. An unparsable pidfile names nothing to signal
    /// and would block `start`, so it is removed.
    fn recorded_pid_for_stop(&self) -> Result<Option<u32>, DaemonError> {
        match self.pidfile.read() {
            Ok(record) => Ok(record.map(|record| record.pid)),
            Err(PidFileError::Parse { path, content }) => {
                warn!("Removing unusable pidfile {path:?} (content {content:?})");
                self.pidfile.remove()?;
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn clear_pidfile_for(&self, pid: u32) -> Result<(), DaemonError> {
        match self.pidfile.read() {
            Ok(Some(record)) if record.pid != pid => {
                info!(
                    "Pidfile now names PID {}; leaving it in place",
                    record.pid
                );
                Ok(())
            }
            _ => {
                if self.pidfile.remove()? {
                    debug!("Removed pidfile {:?}", self.pidfile.path());
                }
                Ok(())
            }
        }
    }

    /// Double-fork detachment. Only the grandchild returns `Ok`.
    fn detach(&self) -> Result<(), DaemonError> {
        let stdin = absolute(self.config.stdin());
        let stdout = absolute(self.config.stdout());
        let stderr = absolute(self.config.stderr());

        fork_and_exit_parent(1)?;

        chdir(self.config.working_dir()).map_err(|source| DaemonError::Detach {
            step: "change directory",
            source,
        })?;
        setsid().map_err(|source| DaemonError::Detach {
            step: "start a new session",
            source,
        })?;
        umask(Mode::from_bits_truncate(self.config.umask() as libc::mode_t));

        // A session leader could still acquire a controlling terminal; its child cannot.
        fork_and_exit_parent(2)?;

        redirect(&open_stream(&stdin, true)?, libc::STDIN_FILENO, "stdin")?;
        redirect(&open_stream(&stdout, false)?, libc::STDOUT_FILENO, "stdout")?;
        redirect(&open_stream(&stderr, false)?, libc::STDERR_FILENO, "stderr")?;
        Ok(())
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn fork_and_exit_parent(stage: u8) -> Result<(), DaemonError> {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();

    // SAFETY: the child only continues with async-signal-safe setup before reaching the
    // payload, and the controller is single-threaded when it starts a daemon.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            debug!("fork #{stage} created PID {child}; parent exiting");
            process::exit(0);
        }
        Ok(ForkResult::Child) => Ok(()),
        Err(source) => {
            error!("fork #{stage} failed: {source}");
            Err(DaemonError::Fork { stage, source })
        }
    }
}

/// Opens a redirection target in append mode, creating it when missing.
fn open_stream(path: &Path, readable: bool) -> Result<File, DaemonError> {
    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|source| DaemonError::Redirect {
            path: path.to_path_buf(),
            source,
        })?;
    }

    OpenOptions::new()
        .read(readable)
        .append(true)
        .create(true)
        .open(path)
        .map_err(|source| DaemonError::Redirect {
            path: path.to_path_buf(),
            source,
        })
}

fn redirect(file: &File, target: i32, step: &'static str) -> Result<(), DaemonError> {
    dup2(file.as_raw_fd(), target)
        .map(|_| ())
        .map_err(|source| DaemonError::Detach { step, source })
}
