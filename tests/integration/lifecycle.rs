#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::{
    dctl, dead_pid, is_process_alive, read_pid, stop_daemon, wait_for_pid_record,
    wait_for_process_exit, wait_for_removed, write_config,
};
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn start_refuses_while_pidfile_exists() {
    let temp = tempdir().expect("create tempdir");
    let marker = temp.path().join("ran");
    let config = write_config(temp.path(), &format!("touch {}", marker.display()));
    let pidfile = temp.path().join("worker.pid");
    fs::write(&pidfile, "4821_2024-01-01 00:00:00\n").expect("seed pidfile");

    dctl(&config)
        .arg("start")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exist. Daemon already running!"));

    assert_eq!(
        fs::read_to_string(&pidfile).expect("read pidfile"),
        "4821_2024-01-01 00:00:00\n"
    );
    std::thread::sleep(std::time::Duration::from_millis(300));
    assert!(!marker.exists(), "payload must not run");
}

#[test]
fn record_lives_exactly_as_long_as_the_daemon() {
    let temp = tempdir().expect("create tempdir");
    let config = write_config(temp.path(), "sleep 1");
    let pidfile = temp.path().join("worker.pid");

    dctl(&config).arg("start").assert().success();

    let pid = wait_for_pid_record(&pidfile, None);
    assert!(is_process_alive(pid), "daemon {pid} should be alive");
    assert_ne!(pid, std::process::id());

    let content = fs::read_to_string(&pidfile).expect("read pidfile");
    assert!(content.starts_with(&format!("{pid}_")), "{content:?}");
    assert!(content.ends_with('\n'));

    wait_for_removed(&pidfile);
    wait_for_process_exit(pid);
}

#[test]
fn stop_without_pidfile_is_a_no_op() {
    let temp = tempdir().expect("create tempdir");
    let config = write_config(temp.path(), "sleep 30");

    dctl(&config)
        .arg("stop")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not found process [-]"))
        .stderr(predicate::str::contains("does not exist. Daemon not running!"));
}

#[test]
fn stop_terminates_the_daemon_and_clears_the_record() {
    let temp = tempdir().expect("create tempdir");
    let config = write_config(temp.path(), "sleep 30");
    let pidfile = temp.path().join("worker.pid");

    dctl(&config).arg("start").assert().success();
    let pid = wait_for_pid_record(&pidfile, None);

    dctl(&config)
        .arg("stop")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("kill process [{pid}] success")));

    assert!(!pidfile.exists());
    wait_for_process_exit(pid);
}

#[test]
fn restart_with_nothing_running_starts_a_daemon() {
    let temp = tempdir().expect("create tempdir");
    let config = write_config(temp.path(), "sleep 30");
    let pidfile = temp.path().join("worker.pid");

    dctl(&config).arg("restart").assert().success();
    let pid = wait_for_pid_record(&pidfile, None);
    assert!(is_process_alive(pid));

    dctl(&config).arg("restart").assert().success();
    let replacement = wait_for_pid_record(&pidfile, Some(pid));
    assert!(is_process_alive(replacement));
    wait_for_process_exit(pid);

    stop_daemon(&config);
    wait_for_process_exit(replacement);
}

#[test]
fn monitor_restarts_a_dead_daemon() {
    let temp = tempdir().expect("create tempdir");
    let config = write_config(temp.path(), "sleep 30");
    let pidfile = temp.path().join("worker.pid");
    let stale = dead_pid();
    fs::write(&pidfile, format!("{stale}_2024-01-01 00:00:00\n")).expect("seed pidfile");

    dctl(&config).arg("monitor").assert().success();

    let pid = wait_for_pid_record(&pidfile, Some(stale));
    assert!(is_process_alive(pid));

    dctl(&config)
        .arg("monitor")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Status:[true] PID:[{pid}]")));
    assert_eq!(read_pid(&pidfile), Some(pid));

    stop_daemon(&config);
    wait_for_process_exit(pid);
}

#[test]
fn debug_mode_redirects_streams_to_scratch_dir() {
    let temp = tempdir().expect("create tempdir");
    let scratch = temp.path().join("scratch");
    let config = temp.path().join("daemon.yaml");
    fs::write(
        &config,
        format!(
            "pidfile: worker.pid\ncommand: \"echo hello-from-daemon\"\nscratch_dir: \"{}\"\n",
            scratch.display()
        ),
    )
    .expect("write config");
    let pidfile = temp.path().join("worker.pid");

    dctl(&config).arg("--debug").arg("start").assert().success();

    let stdout = scratch.join("stdout.log");
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        if fs::read_to_string(&stdout)
            .map(|content| content.contains("hello-from-daemon"))
            .unwrap_or(false)
        {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "daemon output never reached {stdout:?}"
        );
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    wait_for_removed(&pidfile);
    assert!(scratch.join("stdin.log").exists());
    assert!(scratch.join("stderr.log").exists());
}

#[test]
fn restart_and_monitor_recover_from_unusable_pidfile() {
    for (operation, contents) in [("restart", ""), ("monitor", "garbage\n")] {
        let temp = tempdir().expect("create tempdir");
        let config = write_config(temp.path(), "sleep 30");
        let pidfile = temp.path().join("worker.pid");
        fs::write(&pidfile, contents).expect("seed pidfile");

        dctl(&config)
            .arg(operation)
            .assert()
            .success()
            .stdout(predicate::str::contains("Not found process [-]"));

        let pid = wait_for_pid_record(&pidfile, None);
        assert!(is_process_alive(pid), "{operation} should launch a daemon");

        stop_daemon(&config);
        wait_for_process_exit(pid);
    }
}
