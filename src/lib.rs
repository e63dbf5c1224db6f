//! daemonctl turns a unit of work into a classic Unix daemon and controls it afterwards.
//! A daemon is identified only by its pidfile, so every control operation (stop, status,
//! monitor, pid) runs from a fresh process that shares nothing with the daemon but that
//! file and the kernel's process table.

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Timing defaults and file names.
pub mod constants;

/// Daemon supervisor.
pub mod daemon;

/// Error handling.
pub mod error;

/// Process inspection and signal delivery.
pub mod inspector;

/// Daemon lifecycle state machine.
pub mod lifecycle;

/// Work executed by the daemon.
pub mod payload;

/// Pidfile identity record.
pub mod pidfile;

/// Status reporting.
pub mod status;
