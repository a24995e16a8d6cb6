//! Real-process tests for the command executor
//!
//! These spawn `sh`, so they only run on unix hosts.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use devstrap::command::PackageCommand;
use devstrap::executor::{CommandRunner, ExitKind, ProcessExecutor};
use devstrap::types::OutcomeStatus;

fn sh(script: &str, timeout: Duration) -> PackageCommand {
    PackageCommand::new("sh").args(["-c", script]).timeout(timeout)
}

fn executor() -> ProcessExecutor {
    ProcessExecutor::default().with_kill_grace(Duration::from_millis(500))
}

fn pid_alive(pid: i32) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{}/stat", pid)) else {
        return false;
    };
    // Field 3 is the state; zombies count as gone.
    stat.split_whitespace()
        .nth(2)
        .is_some_and(|state| !matches!(state, "Z" | "X"))
}

#[test]
fn test_zero_exit_is_success() {
    let result = executor().run(&sh("echo installed", Duration::from_secs(10)));
    assert_eq!(result.exit, ExitKind::Exited(0));
    assert!(result.success);
    assert_eq!(result.status(), OutcomeStatus::Success);
    assert!(result.tail.contains("installed"));
}

#[test]
fn test_nonzero_exit_is_failure_with_tail() {
    let result = executor().run(&sh(
        "echo 'resolving'; echo 'E404 not found' >&2; exit 3",
        Duration::from_secs(10),
    ));
    assert_eq!(result.exit, ExitKind::Exited(3));
    assert_eq!(result.status(), OutcomeStatus::Failed);
    assert!(result.tail.contains("resolving"));
    assert!(result.tail.contains("E404 not found"));
}

#[test]
fn test_success_predicate_decides() {
    let cmd = sh("exit 7", Duration::from_secs(10)).success_when(|code| code == 7);
    let result = executor().run(&cmd);
    assert!(result.success);
    assert_eq!(result.exit_code(), Some(7));
}

#[test]
fn test_timeout_is_enforced_promptly() {
    let timeout = Duration::from_millis(500);
    let start = Instant::now();
    let result = executor().run(&sh("echo started; sleep 30", timeout));
    let elapsed = start.elapsed();

    assert_eq!(result.exit, ExitKind::TimedOut);
    assert_eq!(result.status(), OutcomeStatus::TimedOut);
    assert!(result.tail.contains("started"));
    // Timeout + kill grace + reader drain, with slack for slow CI.
    assert!(
        elapsed < Duration::from_secs(5),
        "timed-out command took {:?}",
        elapsed
    );
}

#[test]
fn test_timeout_kills_grandchildren() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("grandchild.pid");
    let script = format!("sleep 60 & echo $! > {}; wait", pid_file.display());

    let result = executor().run(&sh(&script, Duration::from_millis(500)));
    assert_eq!(result.exit, ExitKind::TimedOut);

    let pid: i32 = read_pid(&pid_file);
    // Give the kernel a moment to deliver SIGKILL to the group.
    let deadline = Instant::now() + Duration::from_secs(3);
    while pid_alive(pid) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    assert!(!pid_alive(pid), "grandchild {} survived the timeout", pid);
}

fn read_pid(path: &Path) -> i32 {
    fs::read_to_string(path)
        .expect("pid file written")
        .trim()
        .parse()
        .expect("pid file holds a number")
}

#[test]
fn test_sigterm_ignoring_command_is_still_killed() {
    let start = Instant::now();
    let result = executor().run(&sh("trap '' TERM; sleep 30", Duration::from_millis(300)));
    assert_eq!(result.exit, ExitKind::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_output_tail_is_bounded() {
    let executor = ProcessExecutor::new(1024);
    // ~60 KB of output followed by a marker line.
    let script = "i=0; while [ $i -lt 2000 ]; do echo \"progress line number $i\"; i=$((i+1)); done; echo DONE-MARKER";
    let result = executor.run(&sh(script, Duration::from_secs(20)));

    assert!(result.success);
    assert!(result.tail.len() <= 1024 + 3, "tail is {} bytes", result.tail.len());
    assert!(result.tail.contains("DONE-MARKER"));
    assert!(!result.tail.contains("progress line number 0\n"));
}

#[test]
fn test_missing_program_is_spawn_failure() {
    let cmd = PackageCommand::new("devstrap-no-such-package-manager").timeout(Duration::from_secs(1));
    let result = executor().run(&cmd);
    assert_eq!(result.exit, ExitKind::SpawnFailed);
    assert_eq!(result.status(), OutcomeStatus::Failed);
    assert_eq!(result.exit_code(), None);
}

#[test]
fn test_stdin_is_closed() {
    // A command that waits for input must see EOF instead of hanging.
    let result = executor().run(&sh("read answer; echo \"got:$answer\"", Duration::from_secs(10)));
    assert_eq!(result.status(), OutcomeStatus::Success);
    assert!(result.tail.contains("got:"));
}
