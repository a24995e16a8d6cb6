//! Package catalog
//!
//! The catalog is an immutable, ordered list of package descriptors built once
//! at startup. Filtering never mutates it; it only produces borrowed subsets
//! that preserve the original order.

use crate::error::{DevstrapError, Result};
use crate::types::Backend;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One managed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Display name
    pub name: String,
    /// Backend-specific identifier (winget id or npm package name)
    pub id: String,
    pub category: String,
    /// Failures of required packages change the exit code
    #[serde(default)]
    pub required: bool,
    pub backend: Backend,
    #[serde(default)]
    pub description: String,
}

impl PackageDescriptor {
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        category: impl Into<String>,
        backend: Backend,
    ) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            category: category.into(),
            required: false,
            backend,
            description: String::new(),
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Subset selection applied before a run
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    /// Categories to keep (case-insensitive). Empty keeps everything.
    pub categories: Vec<String>,
    /// Backends whose packages are dropped entirely
    pub excluded_backends: Vec<Backend>,
}

/// Immutable, validated package catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    packages: Vec<PackageDescriptor>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids within a backend and blank fields.
    pub fn new(packages: Vec<PackageDescriptor>) -> Result<Self> {
        let mut seen: HashSet<(Backend, String)> = HashSet::with_capacity(packages.len());
        for pkg in &packages {
            if pkg.id.trim().is_empty() {
                return Err(DevstrapError::config(format!(
                    "package '{}' has an empty id",
                    pkg.name
                )));
            }
            if pkg.name.trim().is_empty() {
                return Err(DevstrapError::config(format!(
                    "package with id '{}' has an empty name",
                    pkg.id
                )));
            }
            if !seen.insert((pkg.backend, pkg.id.clone())) {
                return Err(DevstrapError::DuplicateId {
                    backend: pkg.backend,
                    id: pkg.id.clone(),
                });
            }
        }
        Ok(Self { packages })
    }

    /// The built-in workstation catalog
    pub fn builtin() -> Result<Self> {
        Self::new(builtin_packages())
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// All packages, optionally restricted to the given categories, in catalog order.
    pub fn list(&self, categories: Option<&[String]>) -> Vec<&PackageDescriptor> {
        self.packages
            .iter()
            .filter(|pkg| match categories {
                Some(wanted) if !wanted.is_empty() => wanted
                    .iter()
                    .any(|c| c.trim().eq_ignore_ascii_case(pkg.category.trim())),
                _ => true,
            })
            .collect()
    }

    /// Apply a full filter (categories, then backend exclusions).
    pub fn select(&self, filter: &CatalogFilter) -> Vec<&PackageDescriptor> {
        self.list(Some(&filter.categories))
            .into_iter()
            .filter(|pkg| !filter.excluded_backends.contains(&pkg.backend))
            .collect()
    }

    /// Packages grouped by category, categories in first-seen order.
    pub fn grouped(&self) -> Vec<(&str, Vec<&PackageDescriptor>)> {
        let mut groups: Vec<(&str, Vec<&PackageDescriptor>)> = Vec::new();
        for pkg in &self.packages {
            match groups.iter_mut().find(|(name, _)| *name == pkg.category) {
                Some((_, members)) => members.push(pkg),
                None => groups.push((pkg.category.as_str(), vec![pkg])),
            }
        }
        groups
    }

    /// Distinct category names in first-seen order
    pub fn categories(&self) -> Vec<&str> {
        self.grouped().into_iter().map(|(name, _)| name).collect()
    }
}

/// (name, id, description, category, required)
type Entry = (&'static str, &'static str, &'static str, &'static str, bool);

const SYSTEM_PACKAGES: &[Entry] = &[
    ("Visual Studio Code", "Microsoft.VisualStudioCode", "Code editor", "Code Editors & IDEs", true),
    ("Git", "Microsoft.Git", "Version control system", "Code Editors & IDEs", true),
    ("Python 3.12", "Python.Python.3.12", "Python programming language", "Development Runtimes", true),
    ("Node.js", "OpenJS.NodeJS", "JavaScript runtime", "Development Runtimes", true),
    ("Docker Desktop", "Docker.DockerDesktop", "Containerization platform", "Development Runtimes", true),
    ("Google Chrome", "Google.Chrome", "Web browser", "Browsers", false),
    ("Brave Browser", "Brave.Brave", "Privacy-focused browser", "Browsers", false),
    ("VirtualBox", "Oracle.VirtualBox", "Virtual machine software", "Virtualization", false),
    ("Claude Desktop", "Anthropic.Claude", "AI assistant desktop app", "AI Tools", false),
    ("PowerToys", "Microsoft.PowerToys", "Windows system utilities", "System Utilities", false),
    ("Windows Terminal", "Microsoft.WindowsTerminal", "Modern terminal", "System Utilities", false),
    ("7-Zip", "7zip.7zip", "File archiver", "System Utilities", false),
    ("Postman", "Postman.Postman", "API development tool", "Additional Dev Tools", false),
    ("Discord", "Discord.Discord", "Communication platform", "Communication", false),
    ("Slack", "SlackTechnologies.Slack", "Team communication", "Communication", false),
    ("Telegram Desktop", "Telegram.TelegramDesktop", "Messaging client", "Communication", false),
    ("Notion", "Notion.Notion", "Note-taking and organization", "Additional Dev Tools", false),
    ("OBS Studio", "OBSProject.OBSStudio", "Screen recording/streaming", "Media", false),
    ("VLC media player", "VideoLAN.VLC", "Media player", "Media", false),
];

const NODE_PACKAGES: &[Entry] = &[
    ("Gemini CLI", "@google-ai/generativelanguage", "Google Gemini AI CLI tool", "AI Tools", false),
    ("OpenAI CLI", "openai", "OpenAI API CLI tool", "AI Tools", false),
    ("TypeScript", "typescript", "TypeScript compiler and language server", "Languages", true),
    ("React CLI", "create-react-app", "Create React applications", "Frameworks", false),
    ("Next.js CLI", "create-next-app", "Create Next.js applications", "Frameworks", false),
    ("Vue CLI", "@vue/cli", "Vue.js development tools", "Frameworks", false),
    ("Angular CLI", "@angular/cli", "Angular development CLI", "Frameworks", false),
    ("Nodemon", "nodemon", "Auto-restart Node.js applications", "Development", false),
    ("Live Server", "live-server", "Development server with live reload", "Development", false),
    ("HTTP Server", "http-server", "Simple HTTP server", "Development", false),
    ("JSON Server", "json-server", "Mock REST API server", "Development", false),
    ("Concurrently", "concurrently", "Run multiple commands concurrently", "Development", false),
    ("ESLint", "eslint", "JavaScript/TypeScript linter", "Code Quality", false),
    ("Prettier", "prettier", "Code formatter", "Code Quality", false),
    ("JSHint", "jshint", "JavaScript code quality tool", "Code Quality", false),
    ("Standard", "standard", "JavaScript Standard Style", "Code Quality", false),
    ("Webpack CLI", "webpack-cli", "Webpack bundler CLI", "Build Tools", false),
    ("Vite", "vite", "Fast build tool", "Build Tools", false),
    ("Parcel", "parcel", "Zero-config build tool", "Build Tools", false),
    ("Rollup", "rollup", "Module bundler", "Build Tools", false),
    ("Yarn", "yarn", "Fast package manager", "Package Management", false),
    ("PNPM", "pnpm", "Efficient package manager", "Package Management", false),
    ("NP", "np", "Better npm publish", "Package Management", false),
    ("Semantic Release", "semantic-release", "Automated package publishing", "Package Management", false),
    ("Jest CLI", "jest", "JavaScript testing framework", "Testing", false),
    ("Mocha", "mocha", "JavaScript test framework", "Testing", false),
    ("Cypress", "cypress", "End-to-end testing", "Testing", false),
    ("Playwright", "playwright", "Browser automation testing", "Testing", false),
    ("Lodash CLI", "lodash-cli", "Lodash utility library CLI", "Utilities", false),
    ("Chalk", "chalk", "Terminal string styling", "Utilities", false),
    ("Commander", "commander", "Command-line interface builder", "Utilities", false),
    ("Prisma CLI", "prisma", "Database toolkit", "Database", false),
    ("GraphQL CLI", "graphql-cli", "GraphQL command line tool", "API Tools", false),
    ("Vercel CLI", "vercel", "Vercel deployment CLI", "Deployment", false),
    ("Netlify CLI", "netlify-cli", "Netlify deployment CLI", "Deployment", false),
    ("Firebase CLI", "firebase-tools", "Firebase development tools", "Deployment", false),
    ("Heroku CLI", "heroku", "Heroku deployment CLI", "Deployment", false),
    ("JSDoc", "jsdoc", "JavaScript documentation generator", "Documentation", false),
    ("Storybook CLI", "@storybook/cli", "Component development environment", "Documentation", false),
    ("Lighthouse CLI", "lighthouse", "Web performance auditing", "Performance", false),
    ("Speed Test CLI", "speed-test", "Internet speed test", "Performance", false),
];

fn builtin_packages() -> Vec<PackageDescriptor> {
    let system = SYSTEM_PACKAGES
        .iter()
        .map(|entry| (entry, Backend::SystemPackageManager));
    let node = NODE_PACKAGES
        .iter()
        .map(|entry| (entry, Backend::NodePackageManager));

    system
        .chain(node)
        .map(|(&(name, id, description, category, required), backend)| {
            PackageDescriptor::new(name, id, category, backend)
                .required(required)
                .with_description(description)
        })
        .collect()
}
