//! Orchestrator loop
//!
//! Processes the selected packages strictly one after another:
//! probe → decide → (prompt) → execute → record. A package's failure is
//! captured in its outcome and never stops the loop. The only early abort is a
//! configuration error: none of the needed backends exists on the host.

use crate::backend::{BackendLocator, ResolvedBackend};
use crate::catalog::PackageDescriptor;
use crate::command::{DEFAULT_INSTALL_TIMEOUT, PackageCommand};
use crate::comparator::{self, Verdict};
use crate::error::{DevstrapError, Result};
use crate::executor::{CommandRunner, ExitKind, RunResult};
use crate::package_state::{PackageProgress, PackageStage};
use crate::prober::StateProber;
use crate::prompter::Prompter;
use crate::report::{ExecutionOutcome, RunSummary};
use crate::types::{Backend, Decision, InstalledState, OutcomeStatus};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default pause before the first retry; later retries wait proportionally longer.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(2000);

/// Knobs for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Treat every package as `Unknown` without probing
    pub skip_search: bool,
    /// Apply available updates without asking
    pub always_update: bool,
    /// Refresh each backend's sources before its first package
    pub refresh: bool,
    /// Ask the prompter before starting each backend's phase
    pub confirm_phases: bool,
    pub install_timeout: Duration,
    /// Extra attempts after a failed install/update (timeouts are never retried)
    pub retries: u32,
    pub retry_backoff: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            skip_search: false,
            always_update: false,
            refresh: true,
            confirm_phases: false,
            install_timeout: DEFAULT_INSTALL_TIMEOUT,
            retries: 0,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Drives every selected package to a recorded outcome
pub struct Orchestrator<'a> {
    runner: &'a dyn CommandRunner,
    prober: &'a dyn StateProber,
    locator: &'a dyn BackendLocator,
    prompter: &'a mut dyn Prompter,
    options: RunOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        prober: &'a dyn StateProber,
        locator: &'a dyn BackendLocator,
        prompter: &'a mut dyn Prompter,
        options: RunOptions,
    ) -> Self {
        Self {
            runner,
            prober,
            locator,
            prompter,
            options,
        }
    }

    /// Process `packages` in order and return one outcome per package.
    pub fn run(&mut self, packages: &[&PackageDescriptor]) -> Result<RunSummary> {
        let backends = self.resolve_backends(packages)?;
        let mut refreshed: HashSet<Backend> = HashSet::new();
        let mut phases: HashMap<Backend, bool> = HashMap::new();
        let mut summary = RunSummary::new();
        let total = packages.len();

        info!("Processing {} package(s)", total);
        for (index, package) in packages.iter().enumerate() {
            let resolved = backends.get(&package.backend).and_then(Option::as_ref);
            let accepted = match resolved {
                Some(resolved) => *phases
                    .entry(resolved.backend)
                    .or_insert_with(|| self.confirm_phase(resolved.backend, packages)),
                None => true,
            };
            println!("\n[{}/{}] Processing {}", index + 1, total, package.name);
            if let Some(resolved) = resolved.filter(|_| accepted) {
                if self.options.refresh && refreshed.insert(resolved.backend) {
                    self.refresh(resolved);
                }
            }

            let outcome = if accepted {
                self.process(package, resolved)
            } else {
                declined_phase(package)
            };
            print_outcome(&outcome);
            summary.push(outcome);
        }

        debug!("Recorded {} outcome(s)", summary.len());
        Ok(summary)
    }

    /// Locate each needed backend once.
    ///
    /// Missing backends are reported here, once, instead of per package.
    fn resolve_backends(
        &self,
        packages: &[&PackageDescriptor],
    ) -> Result<HashMap<Backend, Option<ResolvedBackend>>> {
        let mut needed: Vec<Backend> = Vec::new();
        for package in packages {
            if !needed.contains(&package.backend) {
                needed.push(package.backend);
            }
        }

        let mut resolved = HashMap::with_capacity(needed.len());
        for backend in &needed {
            let found = self.locator.locate(*backend);
            match &found {
                Some(rb) => info!("Using {} ({}) for {}", rb.program, rb.version, backend.label()),
                None => {
                    let affected = packages.iter().filter(|p| p.backend == *backend).count();
                    warn!(
                        "{} is not available on this host; {} package(s) will be skipped",
                        backend, affected
                    );
                    println!(
                        "⚠️  {} not found, skipping {} package(s) for {}",
                        backend,
                        affected,
                        backend.label()
                    );
                }
            }
            resolved.insert(*backend, found);
        }

        if !needed.is_empty() && resolved.values().all(Option::is_none) {
            let needed = needed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(DevstrapError::NoBackendAvailable { needed });
        }
        Ok(resolved)
    }

    fn confirm_phase(&mut self, backend: Backend, packages: &[&PackageDescriptor]) -> bool {
        if !self.options.confirm_phases {
            return true;
        }
        let count = packages.iter().filter(|p| p.backend == backend).count();
        let accepted = self.prompter.confirm_phase(backend, count);
        if !accepted {
            info!("{} declined, skipping {} package(s)", backend.label(), count);
        }
        accepted
    }

    fn refresh(&self, backend: &ResolvedBackend) {
        println!("🔄 Updating {} sources...", backend.backend);
        let cmd = backend.refresh_command(self.options.install_timeout);
        let result = self.runner.run(&cmd);
        if result.success {
            info!("{} sources refreshed", backend.backend);
        } else {
            warn!(
                "Could not refresh {} sources ({:?}), continuing anyway",
                backend.backend, result.exit
            );
        }
    }

    fn process(
        &mut self,
        package: &PackageDescriptor,
        backend: Option<&ResolvedBackend>,
    ) -> ExecutionOutcome {
        let mut progress = PackageProgress::new(&package.id);

        let Some(backend) = backend else {
            progress.advance_to(PackageStage::Probed);
            progress.advance_to(PackageStage::Decided);
            progress.advance_to(PackageStage::Executed);
            progress.advance_to(PackageStage::Recorded);
            return ExecutionOutcome::skipped(
                package,
                OutcomeStatus::SkippedNotFound,
                format!("{} not available", package.backend),
            );
        };

        let (state, latest) = self.probe(backend, package);
        progress.advance_to(PackageStage::Probed);

        let verdict = comparator::decide(&state, latest.as_deref());
        debug!("{}: {} -> {:?} ({})", package.id, state, verdict.decision, verdict.reason);
        let decision = self.resolve_decision(package, &state, latest.as_deref(), &verdict);
        progress.advance_to(PackageStage::Decided);

        let command = match decision {
            Decision::Install => backend.install_command(&package.id, self.options.install_timeout),
            Decision::Update => backend.update_command(&package.id, self.options.install_timeout),
            Decision::Skip => {
                progress.advance_to(PackageStage::Executed);
                progress.advance_to(PackageStage::Recorded);
                // needs_action with a Skip decision means the prompt declined it
                return if verdict.needs_action {
                    ExecutionOutcome::skipped(package, OutcomeStatus::SkippedByUser, "update declined")
                } else {
                    ExecutionOutcome::skipped(package, OutcomeStatus::UpToDate, verdict.reason)
                };
            }
        };

        let (result, attempts, total_duration) = self.execute(package, &command);
        progress.advance_to(PackageStage::Executed);

        let status = result.status();
        let diagnostic_tail = if status == OutcomeStatus::Success {
            String::new()
        } else {
            result.tail.clone()
        };
        let reason = match status {
            OutcomeStatus::TimedOut => format!(
                "no result within {}s, process tree terminated",
                command.timeout.as_secs()
            ),
            OutcomeStatus::Failed => match result.exit {
                ExitKind::SpawnFailed => format!("could not start {}", command.program),
                _ => format!("{} failed", command.subcommand().unwrap_or("command")),
            },
            _ => verdict.reason,
        };

        progress.advance_to(PackageStage::Recorded);
        ExecutionOutcome {
            package: package.clone(),
            decision,
            status,
            duration_ms: u64::try_from(total_duration.as_millis()).unwrap_or(u64::MAX),
            diagnostic_tail,
            reason,
            attempts,
            exit_code: result.exit_code(),
        }
    }

    fn probe(
        &self,
        backend: &ResolvedBackend,
        package: &PackageDescriptor,
    ) -> (InstalledState, Option<String>) {
        if self.options.skip_search {
            debug!("Skipping state probe for {}", package.id);
            return (InstalledState::Unknown, None);
        }

        let state = self.prober.probe(backend, package);
        let latest = match state {
            InstalledState::InstalledVersion(_) => self.prober.latest(backend, package),
            _ => None,
        };
        (state, latest)
    }

    /// Comparator verdict, confirmed by the prompter when it is an update.
    fn resolve_decision(
        &mut self,
        package: &PackageDescriptor,
        state: &InstalledState,
        latest: Option<&str>,
        verdict: &Verdict,
    ) -> Decision {
        if verdict.decision != Decision::Update || self.options.always_update {
            return verdict.decision;
        }

        let from = match state {
            InstalledState::InstalledVersion(v) => v.as_str(),
            _ => "unknown",
        };
        let to = latest.unwrap_or("unknown");
        match self.prompter.ask(package, from, to) {
            Decision::Skip => Decision::Skip,
            // An "install" answer to an update question still means upgrade.
            _ => Decision::Update,
        }
    }

    /// Run `command`, retrying failures up to the configured count.
    fn execute(
        &self,
        package: &PackageDescriptor,
        command: &PackageCommand,
    ) -> (RunResult, u32, Duration) {
        let mut attempt = 1;
        let mut total = Duration::ZERO;
        loop {
            let result = self.runner.run(command);
            total += result.duration;

            let retryable = !result.success && result.exit != ExitKind::TimedOut;
            if !retryable || attempt > self.options.retries {
                return (result, attempt, total);
            }

            let backoff = self.options.retry_backoff.saturating_mul(attempt);
            warn!(
                "{} attempt {} failed ({:?}), retrying in {}ms",
                package.name,
                attempt,
                result.exit,
                backoff.as_millis()
            );
            std::thread::sleep(backoff);
            attempt += 1;
        }
    }
}

fn declined_phase(package: &PackageDescriptor) -> ExecutionOutcome {
    let mut progress = PackageProgress::new(&package.id);
    progress.advance_to(PackageStage::Probed);
    progress.advance_to(PackageStage::Decided);
    progress.advance_to(PackageStage::Executed);
    progress.advance_to(PackageStage::Recorded);
    ExecutionOutcome::skipped(package, OutcomeStatus::SkippedByUser, "phase declined")
}

fn print_outcome(outcome: &ExecutionOutcome) {
    let name = &outcome.package.name;
    match outcome.status {
        OutcomeStatus::Success => match outcome.decision {
            Decision::Update => println!("✅ {} updated successfully", name),
            _ => println!("✅ {} installed successfully", name),
        },
        OutcomeStatus::Failed => println!("❌ {}: {}", name, outcome.reason),
        OutcomeStatus::TimedOut => println!("⏱️  {}: {}", name, outcome.reason),
        OutcomeStatus::UpToDate => println!("✓ {} ({})", name, outcome.reason),
        OutcomeStatus::SkippedByUser => println!("⏭️  Skipped {}", name),
        OutcomeStatus::SkippedNotFound => debug!("{} skipped, backend missing", name),
    }
}
