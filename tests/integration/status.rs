#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::{dctl, dead_pid, stop_daemon, wait_for_pid_record, wait_for_process_exit, write_config};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

#[test]
fn status_without_pidfile_reports_not_running() {
    let temp = tempdir().expect("create tempdir");
    let config = write_config(temp.path(), "sleep 30");
    let pidfile = temp.path().join("worker.pid");

    dctl(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not found process [-]"))
        .stderr(predicate::str::contains(format!(
            "pidfile {} does not exist. Daemon not running!",
            pidfile.display()
        )));
}

#[test]
fn status_names_dead_recorded_pid() {
    let temp = tempdir().expect("create tempdir");
    let config = write_config(temp.path(), "sleep 30");
    let pidfile = temp.path().join("worker.pid");
    let pid = dead_pid();
    fs::write(&pidfile, format!("{pid}_2024-01-01 00:00:00\n")).expect("seed pidfile");

    dctl(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Not found process [{pid}]")))
        .stderr(predicate::str::contains("Daemon not running!"));

    // status is read-only
    assert!(pidfile.exists());
}

#[test]
fn status_json_describes_running_daemon() {
    let temp = tempdir().expect("create tempdir");
    let config = write_config(temp.path(), "sleep 30");
    let pidfile = temp.path().join("worker.pid");

    dctl(&config).arg("start").assert().success();
    let pid = wait_for_pid_record(&pidfile, None);

    let output = dctl(&config)
        .arg("status")
        .arg("--json")
        .output()
        .expect("run dctl status");
    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(value["pid"], pid);
    assert_eq!(value["running"], true);
    assert!(value["cmdline"].as_array().is_some_and(|cmd| !cmd.is_empty()));

    dctl(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Status:[true] PID:[{pid}]")));

    stop_daemon(&config);
    wait_for_process_exit(pid);
}

#[test]
fn pid_prints_record_or_not_found() {
    let temp = tempdir().expect("create tempdir");
    let config = write_config(temp.path(), "sleep 30");
    let pidfile = temp.path().join("worker.pid");

    dctl(&config)
        .arg("pid")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not found pid"));

    fs::write(&pidfile, "4821_2024-01-01 00:00:00\n").expect("seed pidfile");
    dctl(&config)
        .arg("pid")
        .assert()
        .success()
        .stdout(predicate::str::diff("4821\n"));
}
