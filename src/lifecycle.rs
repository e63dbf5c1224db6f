//! Daemon lifecycle state machine.
//!
//! Tracks where a daemon instance is in its life so that each step of the fork/detach
//! dance and of the termination protocol is an explicit, checked transition.
use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use tracing::debug;

/// Observable states of a daemon instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum DaemonState {
    /// Nothing has happened yet.
    Unstarted,
    /// Forking away from the launching process.
    Forking,
    /// Fully detached from the controlling terminal, streams redirected.
    Detached,
    /// The pidfile is written and the payload is executing.
    Running,
    /// A controller is delivering termination signals.
    Terminating,
    /// The process is gone.
    Stopped,
}

/// Inputs that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleEvent {
    /// First fork requested.
    Fork,
    /// Double fork, session change and stream redirection completed.
    Detach,
    /// Pidfile written; payload invoked.
    Launch,
    /// Termination signal delivery started.
    Terminate,
    /// Process exited or was confirmed gone.
    Exit,
}

/// Error for an event that is not valid in the current state.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid lifecycle transition: {event} while {from}")]
pub struct LifecycleError {
    /// State the machine was in.
    pub from: DaemonState,
    /// Rejected event.
    pub event: LifecycleEvent,
}

/// Checked state holder for one daemon instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    state: DaemonState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// A fresh, unstarted lifecycle.
    pub const fn new() -> Self {
        Self {
            state: DaemonState::Unstarted,
        }
    }

    /// A lifecycle resumed from an externally observed state, as a controller does
    /// when it finds a live PID in the pidfile.
    pub const fn observed(state: DaemonState) -> Self {
        Self { state }
    }

    /// Current state.
    pub const fn state(&self) -> DaemonState {
        self.state
    }

    /// Computes the target state without mutating anything.
    pub fn next(state: DaemonState, event: LifecycleEvent) -> Option<DaemonState> {
        use DaemonState::*;
        use LifecycleEvent::*;

        match (state, event) {
            (Unstarted | Stopped, Fork) => Some(Forking),
            (Forking, Detach) => Some(Detached),
            (Detached, Launch) => Some(Running),
            (Running, Terminate) => Some(Terminating),
            (Terminating, Terminate) => Some(Terminating),
            (Forking | Detached | Running | Terminating, Exit) => Some(Stopped),
            _ => None,
        }
    }

    /// Applies `event`, returning the new state.
    pub fn advance(&mut self, event: LifecycleEvent) -> Result<DaemonState, LifecycleError> {
        let next = Self::next(self.state, event).ok_or(LifecycleError {
            from: self.state,
            event,
        })?;
        debug!("daemon lifecycle: {} --{}--> {}", self.state, event, next);
        self.state = next;
        Ok(next)
    }
}
