#[path = "common/mod.rs"]
mod common;

use std::fs;

use assert_cmd::Command;
use common::{dctl, write_config};
use predicates::prelude::*;
use tempfile::tempdir;

fn bare() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("dctl"))
}

#[test]
fn missing_operation_prints_usage() {
    bare()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn unknown_and_extra_operations_are_rejected() {
    bare().arg("reload").assert().code(2);
    bare().args(["start", "stop"]).assert().code(2);
}

#[test]
fn missing_config_file_is_an_error() {
    let temp = tempdir().expect("create tempdir");
    dctl(&temp.path().join("absent.yaml"))
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("absent.yaml"));
}

#[test]
fn start_without_command_is_an_error() {
    let temp = tempdir().expect("create tempdir");
    let config = temp.path().join("daemon.yaml");
    fs::write(&config, "pidfile: worker.pid\n").expect("write config");

    dctl(&config)
        .arg("start")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no `command` configured"));
    assert!(!temp.path().join("worker.pid").exists());
}

#[test]
fn config_variables_are_expanded() {
    let temp = tempdir().expect("create tempdir");
    let config = temp.path().join("daemon.yaml");
    fs::write(&config, "pidfile: \"${DCTL_TEST_PID_DIR}/worker.pid\"\n").expect("write config");
    let pid_dir = temp.path().join("run");
    fs::create_dir_all(&pid_dir).expect("create pid dir");
    fs::write(pid_dir.join("worker.pid"), "77\n").expect("seed pidfile");

    dctl(&config)
        .env("DCTL_TEST_PID_DIR", &pid_dir)
        .arg("pid")
        .assert()
        .success()
        .stdout(predicate::str::diff("77\n"));

    dctl(&config)
        .env_remove("DCTL_TEST_PID_DIR")
        .arg("pid")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("DCTL_TEST_PID_DIR"));
}

#[test]
fn colours_are_on_by_default() {
    let temp = tempdir().expect("create tempdir");
    let config = write_config(temp.path(), "sleep 30");

    bare()
        .arg("--config")
        .arg(&config)
        .arg("pid")
        .assert()
        .success()
        .stdout(predicate::str::contains("\x1b[31;1m Not found pid"));
}
