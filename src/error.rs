//! Error handling module for devstrap
//!
//! Only configuration problems are errors in the `Result` sense. Everything that
//! goes wrong while processing a single package is captured into that package's
//! outcome instead and never travels through this type.

use crate::types::Backend;
use thiserror::Error;

/// Exit code for runs aborted by a configuration problem.
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// Main error type for devstrap
#[derive(Error, Debug)]
pub enum DevstrapError {
    /// IO errors (config file, report file, terminal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The same backend identifier appears twice in the catalog
    #[error("Configuration error: duplicate id '{id}' for backend {backend}")]
    DuplicateId { backend: Backend, id: String },

    /// None of the backends the catalog needs exists on this host
    #[error("Configuration error: no usable package manager found (needed: {needed})")]
    NoBackendAvailable { needed: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for devstrap operations
pub type Result<T> = std::result::Result<T, DevstrapError>;

impl DevstrapError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Process exit code for an error that aborted the run.
    ///
    /// Every variant prevents processing, so all of them map to the
    /// configuration exit code.
    pub fn exit_code(&self) -> u8 {
        EXIT_CONFIG_ERROR
    }
}
