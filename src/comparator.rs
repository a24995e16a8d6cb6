//! Version comparator
//!
//! Backends report concrete version strings, so "update available" is plain
//! inequality after normalisation. No semver range logic.

use crate::types::{Decision, InstalledState};

pub const REASON_NOT_INSTALLED: &str = "not installed";
pub const REASON_UP_TO_DATE: &str = "up to date";
pub const REASON_LATEST_UNKNOWN: &str = "installed (latest version unknown)";
pub const REASON_STATE_UNKNOWN: &str = "installed state unknown, attempting install";

/// Comparator result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub needs_action: bool,
    pub decision: Decision,
    pub reason: String,
}

impl Verdict {
    fn act(decision: Decision, reason: impl Into<String>) -> Self {
        Self {
            needs_action: true,
            decision,
            reason: reason.into(),
        }
    }

    fn skip(reason: impl Into<String>) -> Self {
        Self {
            needs_action: false,
            decision: Decision::Skip,
            reason: reason.into(),
        }
    }
}

/// Trimmed, case-folded form used for equality
pub fn normalize_version(version: &str) -> String {
    version.trim().to_lowercase()
}

pub fn versions_equal(a: &str, b: &str) -> bool {
    normalize_version(a) == normalize_version(b)
}

/// Decide what to do with a package given its probed state.
pub fn decide(state: &InstalledState, latest: Option<&str>) -> Verdict {
    match (state, latest) {
        (InstalledState::NotInstalled, _) => Verdict::act(Decision::Install, REASON_NOT_INSTALLED),
        (InstalledState::Unknown, _) => Verdict::act(Decision::Install, REASON_STATE_UNKNOWN),
        (InstalledState::InstalledVersion(installed), Some(latest)) => {
            if versions_equal(installed, latest) {
                Verdict::skip(REASON_UP_TO_DATE)
            } else {
                Verdict::act(
                    Decision::Update,
                    format!("update available: {} -> {}", installed.trim(), latest.trim()),
                )
            }
        }
        (InstalledState::InstalledVersion(_), None) => Verdict::skip(REASON_LATEST_UNKNOWN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed(v: &str) -> InstalledState {
        InstalledState::InstalledVersion(v.to_string())
    }

    #[test]
    fn test_not_installed_means_install() {
        let verdict = decide(&InstalledState::NotInstalled, None);
        assert!(verdict.needs_action);
        assert_eq!(verdict.decision, Decision::Install);
    }

    #[test]
    fn test_unknown_means_install_attempt() {
        let verdict = decide(&InstalledState::Unknown, Some("1.0"));
        assert!(verdict.needs_action);
        assert_eq!(verdict.decision, Decision::Install);
    }

    #[test]
    fn test_equal_versions_skip() {
        let verdict = decide(&installed("24.0"), Some("24.0"));
        assert!(!verdict.needs_action);
        assert_eq!(verdict.decision, Decision::Skip);
        assert_eq!(verdict.reason, REASON_UP_TO_DATE);
    }

    #[test]
    fn test_normalized_equality() {
        assert!(!decide(&installed(" 1.2.3-RC1\n"), Some("1.2.3-rc1")).needs_action);
    }

    #[test]
    fn test_different_versions_update() {
        let verdict = decide(&installed("1.94.2"), Some("1.95.3"));
        assert_eq!(verdict.decision, Decision::Update);
        assert!(verdict.reason.contains("1.94.2 -> 1.95.3"));
    }

    #[test]
    fn test_no_semver_ordering() {
        // A registry reporting an older version still counts as "different".
        assert_eq!(decide(&installed("2.0"), Some("1.9")).decision, Decision::Update);
    }

    #[test]
    fn test_latest_unknown_skips() {
        let verdict = decide(&installed("1.0"), None);
        assert!(!verdict.needs_action);
        assert_eq!(verdict.reason, REASON_LATEST_UNKNOWN);
    }
}
