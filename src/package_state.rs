//! Per-package processing state machine
//!
//! Every package walks the same forward-only path:
//!
//! ```text
//! Pending → Probed → Decided → Executed → Recorded
//! ```
//!
//! Skipped packages still pass through `Executed` (with no subprocess) so
//! that every package reaches `Recorded` exactly once.

use std::fmt;
use thiserror::Error;

/// Processing stages in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PackageStage {
    /// Descriptor read from the catalog
    Pending = 0,
    /// Installed state known (possibly `Unknown`)
    Probed = 1,
    /// Install/Update/Skip chosen
    Decided = 2,
    /// Command ran, or was deliberately not run
    Executed = 3,
    /// Outcome appended to the run summary (terminal)
    Recorded = 4,
}

impl PackageStage {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Recorded)
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Probed),
            Self::Probed => Some(Self::Decided),
            Self::Decided => Some(Self::Executed),
            Self::Executed => Some(Self::Recorded),
            Self::Recorded => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Probed => "probed",
            Self::Decided => "decided",
            Self::Executed => "executed",
            Self::Recorded => "recorded",
        }
    }
}

impl fmt::Display for PackageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors that can occur during stage transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageTransitionError {
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage { from: PackageStage, to: PackageStage },

    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition { from: PackageStage, to: PackageStage },

    #[error("Package is already {stage}")]
    AlreadyAtStage { stage: PackageStage },

    #[error("Package outcome is already recorded")]
    FromTerminalState,
}

/// Tracks one package's progress through the stages
#[derive(Debug, Clone)]
pub struct PackageProgress {
    package_id: String,
    current: PackageStage,
}

impl PackageProgress {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            current: PackageStage::Pending,
        }
    }

    #[inline]
    pub fn current_stage(&self) -> PackageStage {
        self.current
    }

    /// Move to `target`, which must be the immediate next stage.
    pub fn transition_to(&mut self, target: PackageStage) -> Result<(), StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState);
        }
        if target == self.current {
            return Err(StageTransitionError::AlreadyAtStage { stage: target });
        }
        if target < self.current {
            return Err(StageTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(StageTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        tracing::trace!("{}: {} -> {}", self.package_id, self.current, target);
        self.current = target;
        Ok(())
    }

    /// Transition that logs instead of failing; misuse is a bug in the loop,
    /// not something a package outcome should carry.
    pub fn advance_to(&mut self, target: PackageStage) {
        if let Err(e) = self.transition_to(target) {
            tracing::error!("{}: invalid stage transition: {}", self.package_id, e);
        }
    }
}
