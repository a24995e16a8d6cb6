//! Installation state prober
//!
//! Probing is a cheap, read-only metadata query and must never abort a run.
//! Whatever goes wrong (spawn failure, non-zero exit, timeout, unparsable
//! output) the caller gets `InstalledState::Unknown` or `None`.

use crate::backend::{self, ResolvedBackend};
use crate::catalog::PackageDescriptor;
use crate::command::DEFAULT_PROBE_TIMEOUT;
use crate::executor::{CommandRunner, ExitKind};
use crate::types::InstalledState;
use std::time::Duration;
use tracing::{debug, warn};

/// Reports the installed and latest versions of a package
pub trait StateProber {
    fn probe(&self, backend: &ResolvedBackend, package: &PackageDescriptor) -> InstalledState;

    /// Newest version the backend's registry offers
    fn latest(&self, backend: &ResolvedBackend, package: &PackageDescriptor) -> Option<String>;
}

/// Prober that runs the backend's own query commands
pub struct BackendProber<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    timeout: Duration,
}

impl<'a, R: CommandRunner + ?Sized> BackendProber<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self {
            runner,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<R: CommandRunner + ?Sized> StateProber for BackendProber<'_, R> {
    fn probe(&self, backend: &ResolvedBackend, package: &PackageDescriptor) -> InstalledState {
        let cmd = backend.probe_command(&package.id, self.timeout);
        let result = self.runner.run(&cmd);

        if matches!(result.exit, ExitKind::TimedOut | ExitKind::SpawnFailed) {
            warn!(
                "Probe for {} failed ({:?}), treating state as unknown",
                package.name, result.exit
            );
            return InstalledState::Unknown;
        }

        // "not installed" markers are authoritative even on a non-zero exit;
        // both backends exit non-zero when the package is absent.
        let parsed = backend::parse_installed(backend.backend, &package.id, &result.tail);
        match (parsed, result.success) {
            (Some(InstalledState::NotInstalled), _) => InstalledState::NotInstalled,
            (Some(state), true) => state,
            (_, false) => {
                warn!(
                    "Probe for {} exited with {:?}, treating state as unknown",
                    package.name, result.exit
                );
                InstalledState::Unknown
            }
            (None, true) => {
                warn!(
                    "Could not parse installed version of {} from probe output",
                    package.name
                );
                debug!("Unparsed probe output: {:?}", result.tail);
                InstalledState::Unknown
            }
        }
    }

    fn latest(&self, backend: &ResolvedBackend, package: &PackageDescriptor) -> Option<String> {
        let cmd = backend.latest_command(&package.id, self.timeout);
        let result = self.runner.run(&cmd);
        if !result.success {
            warn!(
                "Latest-version query for {} failed ({:?})",
                package.name, result.exit
            );
            return None;
        }
        let latest = backend::parse_latest(backend.backend, &result.tail);
        if latest.is_none() {
            debug!("No version found in output for {}: {:?}", package.name, result.tail);
        }
        latest
    }
}
