//! Units of work executed by a detached daemon.
use std::{
    error::Error,
    os::unix::process::CommandExt,
    process::Command,
    sync::atomic::{AtomicBool, AtomicI32, Ordering},
};

use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_SHELL, SHELL_COMMAND_FLAG};

/// Outcome of a payload run. Errors are logged by the supervisor, never retried.
pub type PayloadResult = Result<(), Box<dyn Error + Send + Sync>>;

/// The work a daemon performs once it has fully detached. Invoked exactly once.
pub trait Payload {
    fn run(&mut self) -> PayloadResult;
}

impl<F> Payload for F
where
    F: FnMut() -> PayloadResult,
{
    fn run(&mut self) -> PayloadResult {
        self()
    }
}

/// Process group of the running command, 0 when none.
static CHILD_PGID: AtomicI32 = AtomicI32::new(0);
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

fn forward_termination() {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
    let pgid = CHILD_PGID.load(Ordering::SeqCst);
    if pgid > 0 {
        let _ = signal::killpg(Pid::from_raw(pgid), Signal::SIGTERM);
    }
}

fn install_signal_forwarding() -> Result<(), ctrlc::Error> {
    match ctrlc::set_handler(forward_termination) {
        Ok(()) | Err(ctrlc::Error::MultipleHandlers) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Runs a shell command in its own process group and waits for it.
///
/// With signal forwarding enabled (the default), `SIGTERM`, `SIGINT` and `SIGHUP` received
/// by the daemon are relayed to the command's process group. The payload then returns
/// normally, so the daemon exits through its regular cleanup path.
#[derive(Debug, Clone)]
pub struct CommandPayload {
    command: String,
    forward_signals: bool,
}

impl CommandPayload {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            forward_signals: true,
        }
    }

    /// Disables signal relaying, for embedders that manage signals themselves.
    pub fn forward_signals(mut self, enabled: bool) -> Self {
        self.forward_signals = enabled;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Payload for CommandPayload {
    fn run(&mut self) -> PayloadResult {
        if self.forward_signals {
            install_signal_forwarding()?;
        }

        let mut child = Command::new(DEFAULT_SHELL)
            .arg(SHELL_COMMAND_FLAG)
            .arg(&self.command)
            .process_group(0)
            .spawn()?;

        let pgid = i32::try_from(child.id())?;
        CHILD_PGID.store(pgid, Ordering::SeqCst);
        info!("Payload command `{}` running as PID {pgid}", self.command);

        if self.forward_signals && SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            debug!("Termination requested before the command started; forwarding now");
            forward_termination();
        }

        let status = child.wait();
        CHILD_PGID.store(0, Ordering::SeqCst);
        let status = status?;

        if status.success() {
            info!("Payload command exited cleanly");
            Ok(())
        } else if self.forward_signals && SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Payload command stopped on request ({status})");
            Ok(())
        } else {
            warn!("Payload command failed with {status}");
            Err(format!("`{}` exited with {status}", self.command).into())
        }
    }
}
