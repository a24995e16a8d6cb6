//! Process lifecycle management for package-manager child processes
//!
//! Installers routinely spawn helpers of their own (an msi host, `node-gyp`,
//! post-install scripts). Killing only the direct child on timeout would leave
//! those running and holding the backend's lock.
//!
//! - On unix, children are spawned in their own process group and timeouts
//!   signal the whole group: SIGTERM, then SIGKILL after a grace period
//! - On Windows, children get their own console process group and timeouts
//!   end the whole tree with `taskkill /T /F` (winget's msi hosts, the
//!   `node.exe` behind `npm.cmd`)
//! - Every live child PID is tracked in a global registry so SIGINT, SIGTERM
//!   and SIGHUP on devstrap itself tear down in-flight installers

use std::collections::HashSet;
use std::io;
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Grace period between SIGTERM and SIGKILL for a timed-out command
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Global registry of child process IDs
static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry tracking all spawned child processes
#[derive(Debug, Default)]
pub struct ChildRegistry {
    /// Process group leaders currently running
    pids: HashSet<u32>,
    /// Set once shutdown cleanup ran, later calls are no-ops
    cleanup_initiated: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::debug!("Registered child process PID {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!("Unregistered child process PID {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate every tracked process group (shutdown path).
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            tracing::debug!("Cleanup already initiated, skipping");
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            return;
        }

        tracing::info!("Terminating {} child process(es)...", self.pids.len());

        let pids: Vec<u32> = self.pids.iter().copied().collect();
        for &pid in &pids {
            signal_tree(pid, TreeSignal::Terminate);
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if pids.iter().all(|&pid| !is_process_alive(pid)) {
                tracing::info!("All child processes terminated gracefully");
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &pids {
            if is_process_alive(pid) {
                tracing::warn!("Process group {} did not terminate, sending SIGKILL", pid);
                signal_tree(pid, TreeSignal::Kill);
            }
        }

        self.pids.clear();
    }
}

/// Run `f` with the global registry locked, ignoring a poisoned lock.
pub fn with_registry(f: impl FnOnce(&mut ChildRegistry)) {
    let registry = ChildRegistry::global();
    let mut guard = match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut guard);
}

#[derive(Debug, Clone, Copy)]
enum TreeSignal {
    Terminate,
    Kill,
}

/// Signal the process group led by `pid`, falling back to the single process.
///
/// Only for a leader that has not been reaped yet, so its PID cannot have
/// been reused.
#[cfg(unix)]
fn signal_tree(pid: u32, which: TreeSignal) {
    if !signal_group(pid, which) {
        let sig = unix_signal(which);
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), sig) {
            tracing::debug!("Failed to send {:?} to PID {}: {}", sig, pid, e);
        }
    }
}

/// Signal the process group led by `pid` and nothing else.
///
/// Safe after the leader was reaped: a group id stays reserved while any
/// member is alive, and an empty group just yields ESRCH.
#[cfg(unix)]
fn signal_group(pid: u32, which: TreeSignal) -> bool {
    let sig = unix_signal(which);
    match signal::kill(Pid::from_raw(-(pid as i32)), sig) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Failed to send {:?} to process group {}: {}", sig, pid, e);
            false
        }
    }
}

#[cfg(unix)]
fn unix_signal(which: TreeSignal) -> Signal {
    match which {
        TreeSignal::Terminate => Signal::SIGTERM,
        TreeSignal::Kill => Signal::SIGKILL,
    }
}

/// End `pid` and all of its descendants.
///
/// Console installers have no graceful stop signal, so both steps force.
#[cfg(not(unix))]
fn signal_tree(pid: u32, which: TreeSignal) {
    use std::process::{Command, Stdio};

    match Command::new("taskkill")
        .args(taskkill_args(pid))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => {
            tracing::debug!("taskkill ended process tree {} ({:?})", pid, which);
        }
        Ok(status) => tracing::debug!("taskkill for {} exited with {}", pid, status),
        Err(e) => tracing::warn!("Failed to run taskkill for process tree {}: {}", pid, e),
    }
}

/// Reaped leaders are not signalled again: their PID may already be reused,
/// and `taskkill /T` took the descendants down with the leader.
#[cfg(not(unix))]
fn signal_group(_pid: u32, _which: TreeSignal) -> bool {
    false
}

#[cfg(any(not(unix), test))]
fn taskkill_args(pid: u32) -> [String; 4] {
    ["/T".into(), "/F".into(), "/PID".into(), pid.to_string()]
}

/// Check if a process is still alive (not dead or zombie)
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/<pid>/stat is the state; Z and X are not running.
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    false
}

/// Terminate a running child together with everything it spawned, then reap it.
///
/// Sends SIGTERM to the child's process group, waits up to `grace` for the
/// child to exit, then sends SIGKILL to the group. Once the child is reaped
/// only the group is signalled, never the bare PID.
pub fn kill_process_tree(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    let pid = child.id();
    signal_tree(pid, TreeSignal::Terminate);

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            // The leader is gone; make sure stragglers in its group are too.
            signal_group(pid, TreeSignal::Kill);
            return Ok(status);
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    tracing::warn!("Process group {} ignored SIGTERM, sending SIGKILL", pid);
    signal_tree(pid, TreeSignal::Kill);
    // Covers platforms without group signalling and a leader that escaped its group.
    let _ = child.kill();
    child.wait()
}

/// Initialize global signal handlers for graceful shutdown
/// Handles SIGINT (Ctrl+C), SIGTERM, and SIGHUP
#[cfg(unix)]
pub fn init_signal_handlers() -> Result<(), io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            let signal_name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "UNKNOWN",
            };

            tracing::warn!("Received {}, stopping in-flight installers", signal_name);
            with_registry(|registry| registry.terminate_all(Duration::from_secs(3)));

            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
pub fn init_signal_handlers() -> Result<(), io::Error> {
    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Configure the command to run as leader of its own process group
    fn in_new_process_group(&mut self) -> &mut Self;
}

#[cfg(unix)]
impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(io::Error::other)?;

                // Installer dies with us if devstrap is killed outright.
                #[cfg(target_os = "linux")]
                if nix::libc::prctl(nix::libc::PR_SET_PDEATHSIG, nix::libc::SIGTERM) == -1 {
                    return Err(io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}

#[cfg(windows)]
impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::windows::process::CommandExt;
        // CREATE_NEW_PROCESS_GROUP: our Ctrl+C is not delivered to the installer.
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        self.creation_flags(CREATE_NEW_PROCESS_GROUP)
    }
}

#[cfg(not(any(unix, windows)))]
impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        self
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_registry_register_unregister() {
        let mut registry = ChildRegistry::default();

        registry.register(1234);
        registry.register(5678);
        assert_eq!(registry.count(), 2);

        registry.unregister(1234);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_kill_process_tree_stops_sleeper() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 60"])
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn sleep");

        let start = Instant::now();
        let status = kill_process_tree(&mut child, Duration::from_millis(500)).unwrap();
        assert!(!status.success());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_kill_process_tree_escalates_when_term_is_ignored() {
        let mut child = Command::new("sh")
            .args(["-c", "trap '' TERM; sleep 60"])
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn trapping shell");

        // Let the trap install before signalling.
        std::thread::sleep(Duration::from_millis(100));
        let status = kill_process_tree(&mut child, Duration::from_millis(300)).unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_terminate_all_handles_already_dead_process() {
        let mut child = Command::new("sh")
            .args(["-c", "exit 0"])
            .spawn()
            .expect("Failed to spawn sh");
        let pid = child.id();
        let _ = child.wait();

        let mut registry = ChildRegistry::default();
        registry.register(pid);
        registry.terminate_all(Duration::from_millis(100));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_cleanup_initiated_flag_prevents_double_cleanup() {
        let mut registry = ChildRegistry::default();
        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.cleanup_initiated);

        registry.register(999_999);
        registry.terminate_all(Duration::from_millis(10));
        // Second call returned early and left the registry untouched.
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_reaped_leader_kills_group_stragglers() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("straggler.pid");
        // The leader exits on SIGTERM; the background job ignores it.
        let script = format!(
            "(trap '' TERM; sleep 60) & echo $! > {}; wait",
            pid_file.display()
        );
        let mut child = Command::new("sh")
            .args(["-c", &script])
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn shell");

        let deadline = Instant::now() + Duration::from_secs(3);
        while !pid_file.exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        std::thread::sleep(Duration::from_millis(100));
        let straggler: u32 = std::fs::read_to_string(&pid_file)
            .expect("pid file written")
            .trim()
            .parse()
            .expect("pid file holds a number");

        kill_process_tree(&mut child, Duration::from_secs(2)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(3);
        while is_process_alive(straggler) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(!is_process_alive(straggler));
    }

    #[test]
    fn test_empty_group_is_not_signalled_by_pid() {
        let mut child = Command::new("sh")
            .args(["-c", "exit 0"])
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn sh");
        let pid = child.id();
        child.wait().unwrap();

        // Group is gone, and no fallback to the (possibly reused) bare PID.
        assert!(!signal_group(pid, TreeSignal::Kill));
    }

    #[test]
    fn test_taskkill_targets_whole_tree() {
        assert_eq!(taskkill_args(4242), ["/T", "/F", "/PID", "4242"]);
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(999_999));
    }
}
