//! devstrap - Main entry point
//!
//! Provisions a developer workstation by driving winget and npm over a fixed
//! package catalog.

use std::process::ExitCode;
use tracing::{debug, error, info, warn};

use devstrap::backend::SystemLocator;
use devstrap::catalog::Catalog;
use devstrap::cli::Cli;
use devstrap::config_file::ProvisionConfig;
use devstrap::error::{DevstrapError, Result};
use devstrap::executor::ProcessExecutor;
use devstrap::orchestrator::{Orchestrator, RunOptions};
use devstrap::prober::BackendProber;
use devstrap::process_guard;
use devstrap::prompter::session_prompter;
use devstrap::report::EXIT_SUCCESS;

/// Initialize the logger with appropriate settings
fn init_logger(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    // RUST_LOG wins over -v
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    info!("devstrap {} starting up", env!("CARGO_PKG_VERSION"));

    // Installers still running when we are interrupted get their whole group killed
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{}", e);
            eprintln!("❌ {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Defaults, then the config file, then command-line overrides
fn load_config(cli: &Cli) -> Result<ProvisionConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {:?}", path);
            ProvisionConfig::load_from_file(path)
                .map_err(|e| DevstrapError::config(format!("{:#}", e)))?
        }
        None => ProvisionConfig::default(),
    };

    if let Some(secs) = cli.install_timeout {
        config.install_timeout_secs = secs;
    }
    if let Some(secs) = cli.probe_timeout {
        config.probe_timeout_secs = secs;
    }
    if let Some(retries) = cli.retries {
        config.retries = retries;
    }
    config.always_update |= cli.always_update;

    config
        .validate()
        .map_err(|e| DevstrapError::config(format!("{:#}", e)))?;
    Ok(config)
}

fn run(cli: &Cli) -> Result<u8> {
    let config = load_config(cli)?;
    let catalog = config.catalog()?;
    debug!("Catalog loaded with {} packages", catalog.len());

    if cli.show_categories {
        print_categories(&catalog);
        return Ok(EXIT_SUCCESS);
    }

    let packages = catalog.select(&cli.filter());
    if packages.is_empty() {
        warn!("No packages match the selected categories/backends");
        println!("Nothing to do: no packages match the selection.");
        return Ok(EXIT_SUCCESS);
    }

    println!("🚀 Provisioning {} package(s)...", packages.len());

    let executor = ProcessExecutor::new(config.output_tail_bytes);
    let locator = SystemLocator::new(&executor, config.probe_timeout());
    let prober = BackendProber::new(&executor).with_timeout(config.probe_timeout());
    let mut prompter = session_prompter(cli.non_interactive);

    let options = RunOptions {
        skip_search: cli.skip_search,
        always_update: config.always_update,
        refresh: !cli.no_refresh,
        // --yes answers the phase questions too
        confirm_phases: !config.always_update,
        install_timeout: config.install_timeout(),
        retries: config.retries,
        retry_backoff: config.retry_backoff(),
    };

    let summary =
        Orchestrator::new(&executor, &prober, &locator, prompter.as_mut(), options).run(&packages)?;

    print!("{}", summary.render());

    if let Some(path) = &cli.report {
        // The run already happened; a report write failure must not change its exit code
        if let Err(e) = summary.write_json(path) {
            warn!("Failed to write JSON report to {:?}: {}", path, e);
            eprintln!("⚠️  Could not write report to {}: {}", path.display(), e);
        }
    }

    info!(
        "Run finished: all required packages satisfied = {}",
        summary.all_required_succeeded()
    );
    Ok(summary.exit_code())
}

fn print_categories(catalog: &Catalog) {
    println!("📦 Available package categories:\n");
    for (category, packages) in catalog.grouped() {
        println!("{} ({} packages)", category, packages.len());
        for pkg in packages {
            let required = if pkg.required { " *" } else { "" };
            if pkg.description.is_empty() {
                println!("   • {} [{}]{}", pkg.name, pkg.backend, required);
            } else {
                println!(
                    "   • {} [{}]{} - {}",
                    pkg.name, pkg.backend, required, pkg.description
                );
            }
        }
        println!();
    }
    println!("* required: failures change the exit code");
}
