//! Core value types shared by the catalog, prober, orchestrator and reporter.
//!
//! Backend, decision and status values are proper enums instead of strings so
//! that every `match` over them is exhaustive.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumIter, EnumString};

/// External package manager that owns a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum Backend {
    /// System-level package manager (winget)
    #[serde(rename = "system", alias = "winget")]
    #[strum(to_string = "winget", serialize = "system")]
    SystemPackageManager,
    /// Language-runtime package manager (npm, global installs)
    #[serde(rename = "node", alias = "npm")]
    #[strum(to_string = "npm", serialize = "node")]
    NodePackageManager,
}

impl Backend {
    /// Human-readable phase label used in headers and warnings
    pub const fn label(self) -> &'static str {
        match self {
            Self::SystemPackageManager => "System applications (winget)",
            Self::NodePackageManager => "CLI tools & utilities (npm)",
        }
    }
}

/// Installed state of a package as reported by its backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstalledState {
    NotInstalled,
    InstalledVersion(String),
    /// The probe failed, timed out, or its output could not be parsed
    Unknown,
}

impl fmt::Display for InstalledState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInstalled => f.write_str("not installed"),
            Self::InstalledVersion(v) => write!(f, "installed {}", v),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Action resolved for one package in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
    Install,
    Update,
    Skip,
}

/// Final status of one package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    #[strum(serialize = "success")]
    Success,
    #[strum(serialize = "failed")]
    Failed,
    #[strum(serialize = "timed out")]
    TimedOut,
    /// Installed version already matches the latest one
    #[strum(serialize = "up to date")]
    UpToDate,
    #[strum(serialize = "skipped by user")]
    SkippedByUser,
    /// The package's backend is not present on this host
    #[strum(serialize = "backend not found")]
    SkippedNotFound,
}

impl OutcomeStatus {
    /// Statuses that leave a required package unsatisfied
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }

    /// Statuses that count towards the "skipped" total
    pub const fn is_skip(self) -> bool {
        matches!(
            self,
            Self::UpToDate | Self::SkippedByUser | Self::SkippedNotFound
        )
    }
}
