//! Run summary and final report
//!
//! `RunSummary` is built incrementally by the orchestrator, one outcome per
//! package in catalog order, and lives only for one invocation.

use crate::catalog::PackageDescriptor;
use crate::error::Result;
use crate::types::{Decision, OutcomeStatus};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// All required packages satisfied
pub const EXIT_SUCCESS: u8 = 0;
/// At least one required package failed or timed out
pub const EXIT_REQUIRED_FAILED: u8 = 1;

/// Lines of diagnostic output shown per failure in the text report
const REPORT_TAIL_LINES: usize = 20;

/// What happened to one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub package: PackageDescriptor,
    pub decision: Decision,
    pub status: OutcomeStatus,
    pub duration_ms: u64,
    /// Last output of the failing command; empty unless the command failed
    pub diagnostic_tail: String,
    pub reason: String,
    /// Command invocations made (0 when nothing ran)
    pub attempts: u32,
    pub exit_code: Option<i32>,
}

impl ExecutionOutcome {
    /// Outcome for a package where no command ran
    pub fn skipped(package: &PackageDescriptor, status: OutcomeStatus, reason: impl Into<String>) -> Self {
        Self {
            package: package.clone(),
            decision: Decision::Skip,
            status,
            duration_ms: 0,
            diagnostic_tail: String::new(),
            reason: reason.into(),
            attempts: 0,
            exit_code: None,
        }
    }

    fn status_icon(&self) -> &'static str {
        match self.status {
            OutcomeStatus::Success => "✅",
            OutcomeStatus::Failed => "❌",
            OutcomeStatus::TimedOut => "⏱️ ",
            OutcomeStatus::UpToDate => "✓ ",
            OutcomeStatus::SkippedByUser => "⏭️ ",
            OutcomeStatus::SkippedNotFound => "⚠️ ",
        }
    }
}

/// Derived totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SummaryCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
}

/// Ordered outcomes of one run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    outcomes: Vec<ExecutionOutcome>,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    all_required_succeeded: bool,
    exit_code: u8,
    counts: SummaryCounts,
    outcomes: &'a [ExecutionOutcome],
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: ExecutionOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[ExecutionOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn counts(&self) -> SummaryCounts {
        let mut counts = SummaryCounts::default();
        for outcome in &self.outcomes {
            match outcome.status {
                OutcomeStatus::Success => counts.succeeded += 1,
                OutcomeStatus::Failed => counts.failed += 1,
                OutcomeStatus::TimedOut => counts.timed_out += 1,
                OutcomeStatus::UpToDate
                | OutcomeStatus::SkippedByUser
                | OutcomeStatus::SkippedNotFound => counts.skipped += 1,
            }
        }
        counts
    }

    /// No required package ended in `Failed` or `TimedOut`
    pub fn all_required_succeeded(&self) -> bool {
        !self
            .outcomes
            .iter()
            .any(|o| o.package.required && o.status.is_failure())
    }

    pub fn exit_code(&self) -> u8 {
        if self.all_required_succeeded() {
            EXIT_SUCCESS
        } else {
            EXIT_REQUIRED_FAILED
        }
    }

    /// Human-readable report: every package, totals, then failure diagnostics.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);
        let _ = writeln!(out, "\n{}", rule);
        let _ = writeln!(out, "📋 Installation Summary");
        let _ = writeln!(out, "{}", rule);

        for outcome in &self.outcomes {
            let required = if outcome.package.required { " [required]" } else { "" };
            let _ = write!(
                out,
                "{} {:<32} {:<18}",
                outcome.status_icon(),
                outcome.package.name,
                outcome.status.to_string()
            );
            if outcome.attempts > 0 {
                let _ = write!(out, " {:>7.1}s", outcome.duration_ms as f64 / 1000.0);
            }
            let _ = writeln!(out, "{}", required);
            if !outcome.reason.is_empty() && outcome.status != OutcomeStatus::Success {
                let _ = writeln!(out, "      {}", outcome.reason);
            }
        }

        let counts = self.counts();
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(
            out,
            "Total: {}  ✅ succeeded: {}  ❌ failed: {}  ⏱️  timed out: {}  ⏭️  skipped: {}",
            self.len(),
            counts.succeeded,
            counts.failed,
            counts.timed_out,
            counts.skipped
        );

        let failures: Vec<&ExecutionOutcome> = self
            .outcomes
            .iter()
            .filter(|o| o.status.is_failure())
            .collect();
        if !failures.is_empty() {
            let _ = writeln!(out, "\n--- Failures ---");
            for outcome in failures {
                let code = outcome
                    .exit_code
                    .map(|c| format!("exit code {}", c))
                    .unwrap_or_else(|| outcome.status.to_string());
                let _ = writeln!(
                    out,
                    "\n{} {} ({}, {}):",
                    outcome.status_icon(),
                    outcome.package.name,
                    outcome.package.id,
                    code
                );
                for line in last_lines(&outcome.diagnostic_tail, REPORT_TAIL_LINES) {
                    let _ = writeln!(out, "   │ {}", line);
                }
            }
        }

        let _ = writeln!(out, "{}", rule);
        if self.all_required_succeeded() {
            let _ = writeln!(out, "✅ All required packages are installed");
        } else {
            let _ = writeln!(out, "❌ One or more required packages failed");
        }
        out
    }

    /// Write the summary as JSON for automation.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let document = ReportDocument {
            all_required_succeeded: self.all_required_succeeded(),
            exit_code: self.exit_code(),
            counts: self.counts(),
            outcomes: &self.outcomes,
        };
        let json = serde_json::to_string_pretty(&document)?;
        std::fs::write(path, json)?;
        info!("Wrote JSON report to {}", path.display());
        Ok(())
    }
}

fn last_lines(text: &str, n: usize) -> impl Iterator<Item = &str> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines.into_iter().skip(start)
}
