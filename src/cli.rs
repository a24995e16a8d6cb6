use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::catalog::CatalogFilter;
use crate::types::Backend;

/// devstrap - provision a developer workstation with winget and npm
#[derive(Parser, Debug)]
#[command(name = "devstrap")]
#[command(about = "Install or update a catalog of developer tools through winget and npm")]
#[command(version)]
pub struct Cli {
    /// Skip installed-state checks and run install for every package (faster, less precise)
    #[arg(long)]
    pub skip_search: bool,

    /// Print the package catalog grouped by category and exit
    #[arg(long, visible_alias = "list")]
    pub show_categories: bool,

    /// Only process packages in this category (repeatable, case-insensitive)
    #[arg(short, long = "category", value_name = "NAME", action = ArgAction::Append)]
    pub categories: Vec<String>,

    /// Skip all winget (system) packages
    #[arg(long)]
    pub skip_system: bool,

    /// Skip all npm (Node.js) packages
    #[arg(long)]
    pub skip_node: bool,

    /// Apply available updates without asking
    #[arg(short = 'y', long = "yes")]
    pub always_update: bool,

    /// Never prompt; available updates are skipped unless --yes is given
    #[arg(long)]
    pub non_interactive: bool,

    /// Do not refresh package sources before installing
    #[arg(long)]
    pub no_refresh: bool,

    /// JSON configuration file (timeouts, retries, custom package list)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Install/update timeout in seconds (overrides the config file)
    #[arg(long, value_name = "SECS")]
    pub install_timeout: Option<u64>,

    /// Installed-state probe timeout in seconds (overrides the config file)
    #[arg(long, value_name = "SECS")]
    pub probe_timeout: Option<u64>,

    /// Extra attempts after a failed install/update (overrides the config file)
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Also write the run summary as JSON to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Catalog selection implied by the flags
    pub fn filter(&self) -> CatalogFilter {
        let mut excluded_backends = Vec::new();
        if self.skip_system {
            excluded_backends.push(Backend::SystemPackageManager);
        }
        if self.skip_node {
            excluded_backends.push(Backend::NodePackageManager);
        }
        CatalogFilter {
            categories: self.categories.clone(),
            excluded_backends,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::try_parse_from(["devstrap"]).unwrap();
        assert!(!cli.skip_search);
        assert!(!cli.show_categories);
        assert!(cli.categories.is_empty());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_list_alias() {
        let cli = Cli::try_parse_from(["devstrap", "--list"]).unwrap();
        assert!(cli.show_categories);
    }

    #[test]
    fn test_cli_repeated_categories() {
        let cli = Cli::try_parse_from([
            "devstrap",
            "-c",
            "Browsers",
            "--category",
            "Code Quality",
        ])
        .unwrap();
        assert_eq!(cli.categories, vec!["Browsers", "Code Quality"]);
    }

    #[test]
    fn test_cli_filter_from_skip_flags() {
        let cli = Cli::try_parse_from(["devstrap", "--skip-node"]).unwrap();
        let filter = cli.filter();
        assert_eq!(filter.excluded_backends, vec![Backend::NodePackageManager]);
        assert!(filter.categories.is_empty());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "devstrap",
            "--install-timeout",
            "600",
            "--retries",
            "1",
            "-y",
            "--report",
            "/tmp/report.json",
        ])
        .unwrap();
        assert_eq!(cli.install_timeout, Some(600));
        assert_eq!(cli.retries, Some(1));
        assert!(cli.always_update);
        assert_eq!(cli.report.unwrap().to_str().unwrap(), "/tmp/report.json");
    }

    #[test]
    fn test_cli_rejects_bad_timeout() {
        assert!(Cli::try_parse_from(["devstrap", "--install-timeout", "soon"]).is_err());
    }
}
