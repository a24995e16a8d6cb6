//! Backend wire contracts
//!
//! Each backend is a black box reached through a handful of subcommands. This
//! module knows their argument vectors, which exit codes mean success, and how
//! to pull version strings out of their text output. Nothing else in the crate
//! builds a backend command line.

use crate::command::{PackageCommand, exit_zero};
use crate::executor::CommandRunner;
use crate::types::{Backend, InstalledState};
use std::time::Duration;
use tracing::{debug, info, warn};

/// winget: APPINSTALLER_CLI_ERROR_PACKAGE_ALREADY_INSTALLED
pub const WINGET_ALREADY_INSTALLED: i32 = 0x8A15_0061_u32 as i32;
/// winget: APPINSTALLER_CLI_ERROR_UPDATE_NOT_APPLICABLE
pub const WINGET_UPDATE_NOT_APPLICABLE: i32 = 0x8A15_002B_u32 as i32;

/// Oldest Node.js major version the npm catalog is known to work with
pub const MIN_NODE_MAJOR: u32 = 16;

const WINGET_AGREEMENTS: [&str; 2] = ["--accept-source-agreements", "--accept-package-agreements"];

fn winget_success(code: i32) -> bool {
    code == 0 || code == WINGET_ALREADY_INSTALLED || code == WINGET_UPDATE_NOT_APPLICABLE
}

impl Backend {
    /// Executable names to try, in order
    pub fn candidate_programs(self) -> &'static [&'static str] {
        match self {
            Self::SystemPackageManager => &["winget"],
            Self::NodePackageManager if cfg!(windows) => &["npm", "npm.cmd"],
            Self::NodePackageManager => &["npm"],
        }
    }
}

/// A backend whose executable was found on this host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBackend {
    pub backend: Backend,
    /// Executable that answered `--version`
    pub program: String,
    pub version: String,
}

impl ResolvedBackend {
    pub fn new(backend: Backend, program: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            backend,
            program: program.into(),
            version: version.into(),
        }
    }

    fn command(&self) -> PackageCommand {
        PackageCommand::new(&self.program)
    }

    /// Installed-state query
    pub fn probe_command(&self, id: &str, timeout: Duration) -> PackageCommand {
        let cmd = match self.backend {
            Backend::SystemPackageManager => self
                .command()
                .args(["list", "--id", id, "--exact", "--accept-source-agreements"]),
            Backend::NodePackageManager => self.command().args(["list", "-g", "--depth=0", id]),
        };
        cmd.timeout(timeout)
    }

    /// Latest-available-version query
    pub fn latest_command(&self, id: &str, timeout: Duration) -> PackageCommand {
        let cmd = match self.backend {
            Backend::SystemPackageManager => self
                .command()
                .args(["show", "--id", id, "--exact", "--accept-source-agreements"]),
            Backend::NodePackageManager => self.command().args(["view", id, "version"]),
        };
        cmd.timeout(timeout)
    }

    pub fn install_command(&self, id: &str, timeout: Duration) -> PackageCommand {
        let cmd = match self.backend {
            Backend::SystemPackageManager => self
                .command()
                .args(["install", "--id", id, "--exact"])
                .args(WINGET_AGREEMENTS)
                .arg("--silent")
                .success_when(winget_success),
            Backend::NodePackageManager => self
                .command()
                .args(["install", "-g", id])
                .success_when(exit_zero),
        };
        cmd.timeout(timeout)
    }

    pub fn update_command(&self, id: &str, timeout: Duration) -> PackageCommand {
        let cmd = match self.backend {
            Backend::SystemPackageManager => self
                .command()
                .args(["upgrade", "--id", id, "--exact"])
                .args(WINGET_AGREEMENTS)
                .arg("--silent")
                .success_when(winget_success),
            Backend::NodePackageManager => self
                .command()
                .args(["update", "-g", id])
                .success_when(exit_zero),
        };
        cmd.timeout(timeout)
    }

    /// Refresh package sources/cache before the backend's first package
    pub fn refresh_command(&self, timeout: Duration) -> PackageCommand {
        let cmd = match self.backend {
            Backend::SystemPackageManager => self.command().args(["source", "update"]),
            Backend::NodePackageManager => self.command().args(["cache", "verify"]),
        };
        cmd.timeout(timeout)
    }
}

/// Interpret installed-state query output.
///
/// `None` means the output did not say either way.
pub fn parse_installed(backend: Backend, id: &str, output: &str) -> Option<InstalledState> {
    match backend {
        Backend::SystemPackageManager => parse_winget_list(id, output),
        Backend::NodePackageManager => parse_npm_list(id, output),
    }
}

/// Interpret latest-version query output.
pub fn parse_latest(backend: Backend, output: &str) -> Option<String> {
    match backend {
        Backend::SystemPackageManager => output.lines().find_map(|line| {
            let value = line.trim().strip_prefix("Version:")?.trim();
            (!value.is_empty()).then(|| value.to_string())
        }),
        Backend::NodePackageManager => output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("npm "))
            .last()
            .filter(|line| line.starts_with(|c: char| c.is_ascii_digit()))
            .map(str::to_string),
    }
}

/// `winget list` prints a table: Name, Id, Version, [Available], Source.
fn parse_winget_list(id: &str, output: &str) -> Option<InstalledState> {
    if output.contains("No installed package found") {
        return Some(InstalledState::NotInstalled);
    }

    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(pos) = tokens.iter().position(|t| t.eq_ignore_ascii_case(id)) else {
            continue;
        };
        let mut rest = tokens[pos + 1..].iter().copied();
        let version = match rest.next() {
            // "< 1.2.3" / "> 1.2.3" ranges for apps with fuzzy registry versions
            Some("<") | Some(">") => rest.next(),
            other => other,
        };
        return match version {
            Some(v) if !v.eq_ignore_ascii_case("unknown") => {
                Some(InstalledState::InstalledVersion(v.to_string()))
            }
            _ => None,
        };
    }
    None
}

/// `npm list -g --depth=0 <pkg>` prints a tree with `<pkg>@<version>` or `(empty)`.
fn parse_npm_list(id: &str, output: &str) -> Option<InstalledState> {
    let prefix = format!("{}@", id);
    for token in output.split_whitespace() {
        if let Some(version) = token.strip_prefix(&prefix) {
            if !version.is_empty() {
                return Some(InstalledState::InstalledVersion(version.to_string()));
            }
        }
    }
    if output.contains("(empty)") {
        return Some(InstalledState::NotInstalled);
    }
    None
}

/// Extract the major version from `node --version` output such as `v18.19.0`.
pub fn parse_node_major(output: &str) -> Option<u32> {
    output
        .trim()
        .trim_start_matches('v')
        .split('.')
        .next()?
        .parse()
        .ok()
}

/// Finds backend executables on the host
pub trait BackendLocator {
    fn locate(&self, backend: Backend) -> Option<ResolvedBackend>;
}

/// Locator that asks each candidate executable for `--version`
pub struct SystemLocator<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    timeout: Duration,
}

impl<'a, R: CommandRunner + ?Sized> SystemLocator<'a, R> {
    pub fn new(runner: &'a R, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    fn check_node_runtime(&self) {
        let cmd = PackageCommand::new("node").arg("--version").timeout(self.timeout);
        let result = self.runner.run(&cmd);
        if !result.success {
            warn!("Node.js runtime not found; npm installs will likely fail");
            return;
        }
        match parse_node_major(&result.tail) {
            Some(major) if major < MIN_NODE_MAJOR => warn!(
                "Node.js {} is quite old, v{}+ is recommended for best compatibility",
                result.tail.trim(),
                MIN_NODE_MAJOR + 2
            ),
            Some(_) => info!("Node.js version: {}", result.tail.trim()),
            None => debug!("Could not parse Node.js version from {:?}", result.tail),
        }
    }
}

impl<R: CommandRunner + ?Sized> BackendLocator for SystemLocator<'_, R> {
    fn locate(&self, backend: Backend) -> Option<ResolvedBackend> {
        for program in backend.candidate_programs() {
            let cmd = PackageCommand::new(*program)
                .arg("--version")
                .timeout(self.timeout);
            let result = self.runner.run(&cmd);
            if !result.success {
                debug!("{} --version did not succeed: {:?}", program, result.exit);
                continue;
            }

            let version = result
                .tail
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("unknown")
                .to_string();
            info!("{} version: {}", program, version);

            if backend == Backend::NodePackageManager {
                self.check_node_runtime();
            }
            return Some(ResolvedBackend::new(backend, *program, version));
        }
        None
    }
}
