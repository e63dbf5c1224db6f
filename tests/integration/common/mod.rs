#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command as StdCommand,
    thread,
    time::{Duration, Instant},
};

use assert_cmd::Command;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

/// Writes a `daemon.yaml` into `dir` and returns its path.
pub fn write_config(dir: &Path, command: &str) -> PathBuf {
    let path = dir.join("daemon.yaml");
    fs::write(
        &path,
        format!(
            r#"
pidfile: "worker.pid"
command: "{command}"
stop:
  interval: "50ms"
"#
        ),
    )
    .expect("write config");
    path
}

/// `dctl` invocation bound to the given config file, without colours.
pub fn dctl(config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dctl"));
    cmd.arg("--no-color").arg("--config").arg(config);
    cmd
}

pub fn read_pid(pidfile: &Path) -> Option<u32> {
    let content = fs::read_to_string(pidfile).ok()?;
    content.split('_').next()?.trim().parse().ok()
}

/// PID of a process that has already exited and been reaped.
pub fn dead_pid() -> u32 {
    let mut child = StdCommand::new("true").spawn().expect("spawn true");
    let pid = child.id();
    child.wait().expect("wait for true");
    pid
}

pub fn wait_for_path(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("Timed out waiting for {:?} to exist", path);
}

/// Waits until the pidfile names a PID other than `previous`.
pub fn wait_for_pid_record(pidfile: &Path, previous: Option<u32>) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(pid) = read_pid(pidfile)
            && Some(pid) != previous
        {
            return pid;
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for a new PID in {:?}", pidfile);
        }

        thread::sleep(Duration::from_millis(50));
    }
}

pub fn wait_for_removed(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if !path.exists() {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("Timed out waiting for {:?} to be removed", path);
}

/// Alive means present in the process table and not a zombie.
pub fn is_process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
        .process(Pid::from_u32(pid))
        .is_some_and(|process| {
            !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
        })
}

pub fn wait_for_process_exit(pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("Timed out waiting for PID {} to exit", pid);
}

/// Stops whatever daemon the config points at; used for cleanup.
pub fn stop_daemon(config: &Path) {
    let _ = dctl(config).arg("stop").timeout(Duration::from_secs(10)).output();
}
