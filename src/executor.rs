//! Command execution with a hard wall-clock timeout
//!
//! `ProcessExecutor` is the only place that spawns package-manager processes.
//! Every spawn goes through it so that:
//!
//! - the child leads its own process group and is registered for shutdown cleanup
//! - stdout and stderr are drained into one bounded `OutputTail`
//! - a command that outlives its timeout is killed together with its process tree
//!
//! The executor never retries. One invocation produces one `RunResult`.

use crate::command::PackageCommand;
use crate::output_tail::{DEFAULT_TAIL_BYTES, OutputTail};
use crate::process_guard::{self, CommandProcessGroup, KILL_GRACE_PERIOD};
use crate::types::OutcomeStatus;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long to wait for pipe readers once the child is gone. A detached
/// grandchild can keep a pipe open indefinitely.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How the process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    /// Normal exit with a code
    Exited(i32),
    /// Killed by a signal it did not cause us to send
    Signaled,
    /// Killed by the executor after the timeout expired
    TimedOut,
    /// The program could not be started at all
    SpawnFailed,
}

/// Raw result of one command invocation
#[derive(Debug, Clone)]
pub struct RunResult {
    pub exit: ExitKind,
    /// Exit code accepted by the command's success predicate
    pub success: bool,
    /// Last bytes of combined stdout/stderr
    pub tail: String,
    pub duration: Duration,
}

impl RunResult {
    /// Completed run whose exit code was judged by a predicate
    pub fn exited(code: i32, success: bool, tail: impl Into<String>) -> Self {
        Self {
            exit: ExitKind::Exited(code),
            success,
            tail: tail.into(),
            duration: Duration::ZERO,
        }
    }

    pub fn timed_out(tail: impl Into<String>) -> Self {
        Self {
            exit: ExitKind::TimedOut,
            success: false,
            tail: tail.into(),
            duration: Duration::ZERO,
        }
    }

    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self {
            exit: ExitKind::SpawnFailed,
            success: false,
            tail: message.into(),
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Outcome status for an install/update execution
    pub fn status(&self) -> OutcomeStatus {
        match self.exit {
            ExitKind::TimedOut => OutcomeStatus::TimedOut,
            _ if self.success => OutcomeStatus::Success,
            _ => OutcomeStatus::Failed,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.exit {
            ExitKind::Exited(code) => Some(code),
            _ => None,
        }
    }
}

/// Runs a structured command to completion or timeout.
///
/// Implemented by `ProcessExecutor` for real subprocesses and by test fakes.
pub trait CommandRunner {
    fn run(&self, command: &PackageCommand) -> RunResult;
}

/// Subprocess-backed `CommandRunner`
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    tail_bytes: usize,
    kill_grace: Duration,
    poll_interval: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_BYTES)
    }
}

impl ProcessExecutor {
    pub fn new(tail_bytes: usize) -> Self {
        Self {
            tail_bytes,
            kill_grace: KILL_GRACE_PERIOD,
            poll_interval: Duration::from_millis(25),
        }
    }

    /// Override the SIGTERM → SIGKILL grace period
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    fn spawn_reader<R: Read + Send + 'static>(
        stream: Option<R>,
        tail: Arc<Mutex<OutputTail>>,
        done: mpsc::Sender<()>,
    ) {
        std::thread::spawn(move || {
            if let Some(mut reader) = stream {
                let mut buffer = [0u8; 4096];
                loop {
                    match reader.read(&mut buffer) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let mut guard = match tail.lock() {
                                Ok(guard) => guard,
                                Err(poisoned) => poisoned.into_inner(),
                            };
                            guard.push(&buffer[..n]);
                        }
                    }
                }
            }
            let _ = done.send(());
        });
    }
}

impl CommandRunner for ProcessExecutor {
    fn run(&self, command: &PackageCommand) -> RunResult {
        let start = Instant::now();
        info!("exec: {} (timeout {}s)", command, command.timeout.as_secs());

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {}: {}", command.program, e);
                return RunResult::spawn_failed(format!(
                    "failed to start '{}': {}",
                    command.program, e
                ))
                .with_duration(start.elapsed());
            }
        };

        let pid = child.id();
        process_guard::with_registry(|registry| registry.register(pid));

        let tail = Arc::new(Mutex::new(OutputTail::new(self.tail_bytes)));
        let (done_tx, done_rx) = mpsc::channel();
        Self::spawn_reader(child.stdout.take(), Arc::clone(&tail), done_tx.clone());
        Self::spawn_reader(child.stderr.take(), Arc::clone(&tail), done_tx);

        // An unrepresentable deadline means the command is never timed out.
        let deadline = start.checked_add(command.timeout);
        let exit = loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    break match status.code() {
                        Some(code) => ExitKind::Exited(code),
                        None => ExitKind::Signaled,
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Lost track of {} (PID {}): {}", command.program, pid, e);
                    let _ = process_guard::kill_process_tree(&mut child, self.kill_grace);
                    break ExitKind::Signaled;
                }
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                warn!(
                    "{} exceeded {}s timeout, terminating process tree",
                    command,
                    command.timeout.as_secs()
                );
                if let Err(e) = process_guard::kill_process_tree(&mut child, self.kill_grace) {
                    warn!("Failed to reap timed-out PID {}: {}", pid, e);
                }
                break ExitKind::TimedOut;
            }
            let remaining = deadline.map_or(self.poll_interval, |deadline| deadline - now);
            std::thread::sleep(self.poll_interval.min(remaining));
        };

        process_guard::with_registry(|registry| registry.unregister(pid));

        for _ in 0..2 {
            if done_rx.recv_timeout(READER_DRAIN_TIMEOUT).is_err() {
                debug!("Output reader for PID {} still attached, not waiting", pid);
                break;
            }
        }

        let tail_text = match tail.lock() {
            Ok(guard) => guard.to_text(),
            Err(poisoned) => poisoned.into_inner().to_text(),
        };

        let success = match exit {
            ExitKind::Exited(code) => command.is_success(code),
            _ => false,
        };

        let result = RunResult {
            exit,
            success,
            tail: tail_text,
            duration: start.elapsed(),
        };

        debug!(
            "exec finished: {} -> {:?} success={} in {}ms",
            command,
            result.exit,
            result.success,
            result.duration.as_millis()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RunResult::exited(0, true, "").status(), OutcomeStatus::Success);
        assert_eq!(RunResult::exited(1, false, "boom").status(), OutcomeStatus::Failed);
        assert_eq!(RunResult::timed_out("").status(), OutcomeStatus::TimedOut);
        assert_eq!(
            RunResult::spawn_failed("no such file").status(),
            OutcomeStatus::Failed
        );
    }

    #[test]
    fn test_predicate_can_accept_nonzero() {
        let result = RunResult::exited(42, true, "");
        assert_eq!(result.status(), OutcomeStatus::Success);
        assert_eq!(result.exit_code(), Some(42));
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let executor = ProcessExecutor::default();
        let cmd = PackageCommand::new("devstrap-definitely-missing-binary")
            .timeout(Duration::from_secs(1));
        let result = executor.run(&cmd);
        assert_eq!(result.exit, ExitKind::SpawnFailed);
        assert!(result.tail.contains("devstrap-definitely-missing-binary"));
    }

    #[cfg(unix)]
    #[test]
    fn test_huge_timeout_does_not_overflow_deadline() {
        let executor = ProcessExecutor::default();
        let cmd = PackageCommand::new("true").timeout(Duration::from_secs(u64::MAX));
        let result = executor.run(&cmd);
        assert_eq!(result.exit, ExitKind::Exited(0));
        assert!(result.success);
    }
}
