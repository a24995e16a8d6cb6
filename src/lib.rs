//! devstrap library
//!
//! Package installation orchestrator: probes installed state, decides between
//! install, update and skip, runs the package manager under a timeout and
//! summarises the outcome of every package.

pub mod backend;
pub mod catalog;
pub mod cli;
pub mod command;
pub mod comparator;
pub mod config_file;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod output_tail;
pub mod package_state;
pub mod prober;
pub mod process_guard;
pub mod prompter;
pub mod report;
pub mod types;

// Re-export main types for convenience
pub use backend::{BackendLocator, ResolvedBackend, SystemLocator};
pub use catalog::{Catalog, CatalogFilter, PackageDescriptor};
pub use command::PackageCommand;
pub use config_file::ProvisionConfig;
pub use error::DevstrapError;
pub use executor::{CommandRunner, ExitKind, ProcessExecutor, RunResult};
pub use orchestrator::{Orchestrator, RunOptions};
pub use package_state::{PackageProgress, PackageStage, StageTransitionError};
pub use prober::{BackendProber, StateProber};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use prompter::{HeadlessPrompter, InteractivePrompter, Prompter, ScriptedPrompter};
pub use report::{ExecutionOutcome, RunSummary, SummaryCounts};
pub use types::{Backend, Decision, InstalledState, OutcomeStatus};
