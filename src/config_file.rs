//! Configuration file handling.
//!
//! A run is configured from three layers: built-in defaults, an optional JSON
//! file, then command-line flags. This module owns the first two.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::catalog::{Catalog, PackageDescriptor};
use crate::command::{DEFAULT_INSTALL_TIMEOUT, DEFAULT_PROBE_TIMEOUT};
use crate::orchestrator::DEFAULT_RETRY_BACKOFF;
use crate::output_tail::DEFAULT_TAIL_BYTES;

/// Smallest diagnostic tail worth keeping
pub const MIN_TAIL_BYTES: usize = 1024;

/// Longest accepted install or probe timeout (one day)
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Longest accepted pause before the first retry (ten minutes)
pub const MAX_RETRY_BACKOFF_MS: u64 = 10 * 60 * 1000;

/// Most extra attempts accepted per package
pub const MAX_RETRIES: u32 = 10;

/// Provisioning configuration that can be loaded from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub install_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub output_tail_bytes: usize,
    /// Extra attempts after a failed install/update
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub always_update: bool,
    /// Replaces the built-in catalog when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<PackageDescriptor>>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            install_timeout_secs: DEFAULT_INSTALL_TIMEOUT.as_secs(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
            output_tail_bytes: DEFAULT_TAIL_BYTES,
            retries: 0,
            retry_backoff_ms: u64::try_from(DEFAULT_RETRY_BACKOFF.as_millis()).unwrap_or(2000),
            always_update: false,
            packages: None,
        }
    }
}

impl ProvisionConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.install_timeout_secs == 0 {
            anyhow::bail!("install_timeout_secs must be greater than zero");
        }
        if self.probe_timeout_secs == 0 {
            anyhow::bail!("probe_timeout_secs must be greater than zero");
        }
        if self.install_timeout_secs > MAX_TIMEOUT_SECS {
            anyhow::bail!(
                "install_timeout_secs must be at most {} (got {})",
                MAX_TIMEOUT_SECS,
                self.install_timeout_secs
            );
        }
        if self.probe_timeout_secs > self.install_timeout_secs {
            anyhow::bail!(
                "probe_timeout_secs ({}) must not exceed install_timeout_secs ({})",
                self.probe_timeout_secs,
                self.install_timeout_secs
            );
        }
        if self.retries > MAX_RETRIES {
            anyhow::bail!("retries must be at most {} (got {})", MAX_RETRIES, self.retries);
        }
        if self.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            anyhow::bail!(
                "retry_backoff_ms must be at most {} (got {})",
                MAX_RETRY_BACKOFF_MS,
                self.retry_backoff_ms
            );
        }
        if self.output_tail_bytes < MIN_TAIL_BYTES {
            anyhow::bail!(
                "output_tail_bytes must be at least {} (got {})",
                MIN_TAIL_BYTES,
                self.output_tail_bytes
            );
        }
        if let Some(packages) = &self.packages {
            if packages.is_empty() {
                anyhow::bail!("packages must not be empty when present");
            }
        }
        Ok(())
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// The configured package list, or the built-in one
    pub fn catalog(&self) -> crate::error::Result<Catalog> {
        match &self.packages {
            Some(packages) => Catalog::new(packages.clone()),
            None => Catalog::builtin(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DevstrapError;
    use crate::types::Backend;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(json.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ProvisionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.install_timeout(), Duration::from_secs(300));
        assert_eq!(config.probe_timeout(), Duration::from_secs(30));
        assert_eq!(config.retries, 0);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(r#"{ "install_timeout_secs": 600, "retries": 1 }"#);
        let config = ProvisionConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.install_timeout_secs, 600);
        assert_eq!(config.retries, 1);
        assert_eq!(config.probe_timeout_secs, 30);
        assert!(config.packages.is_none());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ProvisionConfig::load_from_file(Path::new("/nonexistent/devstrap.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_json() {
        let file = write_config("{ invalid json }");
        assert!(ProvisionConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_timeouts() {
        let config = ProvisionConfig {
            install_timeout_secs: 0,
            ..ProvisionConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ProvisionConfig {
            probe_timeout_secs: 600,
            install_timeout_secs: 300,
            ..ProvisionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
    }

    #[test]
    fn test_validation_rejects_unbounded_waits() {
        let config = ProvisionConfig {
            install_timeout_secs: u64::MAX,
            ..ProvisionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("install_timeout_secs must be at most"));

        let config = ProvisionConfig {
            install_timeout_secs: MAX_TIMEOUT_SECS,
            probe_timeout_secs: MAX_TIMEOUT_SECS,
            ..ProvisionConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = ProvisionConfig {
            retry_backoff_ms: u64::MAX,
            ..ProvisionConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ProvisionConfig {
            retries: u32::MAX,
            ..ProvisionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_tiny_tail() {
        let config = ProvisionConfig {
            output_tail_bytes: 16,
            ..ProvisionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_catalog() {
        let file = write_config(
            r#"{
                "packages": [
                    { "name": "Git", "id": "Git.Git", "category": "Tools", "backend": "winget", "required": true },
                    { "name": "ESLint", "id": "eslint", "category": "Lint", "backend": "npm" }
                ]
            }"#,
        );
        let config = ProvisionConfig::load_from_file(file.path()).unwrap();
        config.validate().unwrap();
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.len(), 2);
        let all = catalog.list(None);
        assert!(all[0].required);
        assert!(!all[1].required);
        assert_eq!(all[1].backend, Backend::NodePackageManager);
    }

    #[test]
    fn test_duplicate_ids_fail_catalog() {
        let config = ProvisionConfig {
            packages: Some(vec![
                PackageDescriptor::new("A", "eslint", "Lint", Backend::NodePackageManager),
                PackageDescriptor::new("B", "eslint", "Lint", Backend::NodePackageManager),
            ]),
            ..ProvisionConfig::default()
        };
        assert!(matches!(
            config.catalog(),
            Err(DevstrapError::DuplicateId { .. })
        ));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devstrap.json");
        let config = ProvisionConfig {
            retries: 2,
            always_update: true,
            ..ProvisionConfig::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(ProvisionConfig::load_from_file(&path).unwrap(), config);
    }
}
