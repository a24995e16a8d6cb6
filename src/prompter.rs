//! Update and phase confirmation prompts
//!
//! The orchestrator asks a `Prompter` when an installed package has a newer
//! version and always-update mode is off, and optionally once before each
//! backend's phase. Prompting must never block an unattended run: closed input
//! and non-terminal sessions resolve to `Skip`, and headless sessions accept
//! every phase.

use crate::catalog::PackageDescriptor;
use crate::types::{Backend, Decision};
use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};
use tracing::{debug, info};

/// Resolves whether an available update should be applied
pub trait Prompter {
    fn ask(&mut self, package: &PackageDescriptor, from: &str, to: &str) -> Decision;

    /// Whether to start the phase that installs `packages` packages through `backend`
    fn confirm_phase(&mut self, _backend: Backend, _packages: usize) -> bool {
        true
    }
}

/// Reads single-character answers from a line-oriented input
pub struct InteractivePrompter<R, W> {
    input: R,
    output: W,
    skip_remaining: bool,
}

impl InteractivePrompter<io::StdinLock<'static>, io::Stdout> {
    /// Prompter bound to the process's stdin/stdout
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> InteractivePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            skip_remaining: false,
        }
    }

    /// Whether the user chose "skip remaining" or input ended
    pub fn skipping_remaining(&self) -> bool {
        self.skip_remaining
    }

    fn close(&mut self, why: &str) -> Decision {
        info!("Prompt input unavailable ({}), skipping remaining updates", why);
        let _ = writeln!(self.output, "\n   Input closed, skipping remaining updates.");
        self.skip_remaining = true;
        Decision::Skip
    }
}

impl<R: BufRead, W: Write> Prompter for InteractivePrompter<R, W> {
    fn ask(&mut self, package: &PackageDescriptor, from: &str, to: &str) -> Decision {
        if self.skip_remaining {
            debug!("Skipping update prompt for {} (skip remaining)", package.name);
            return Decision::Skip;
        }

        if writeln!(
            self.output,
            "\n🔄 {} is already installed\n   Current version:   {}\n   Available version: {}",
            package.name, from, to
        )
        .is_err()
        {
            return self.close("output error");
        }

        loop {
            let prompt = format!(
                "   Update {}? [y]es / [n]o / [s]kip remaining: ",
                package.name
            );
            if self.output.write_all(prompt.as_bytes()).is_err() || self.output.flush().is_err() {
                return self.close("output error");
            }

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => return self.close("end of input"),
                Err(e) => return self.close(&e.to_string()),
                Ok(_) => {}
            }

            match line.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
                Some('y') => return Decision::Update,
                Some('n') => {
                    let _ = writeln!(self.output, "⏭️  Skipping update for {}", package.name);
                    return Decision::Skip;
                }
                Some('s') => {
                    let _ = writeln!(self.output, "⏭️  Skipping this and all remaining updates");
                    self.skip_remaining = true;
                    return Decision::Skip;
                }
                _ => {
                    let _ = writeln!(self.output, "   Please enter 'y', 'n' or 's'.");
                }
            }
        }
    }

    fn confirm_phase(&mut self, backend: Backend, packages: usize) -> bool {
        let rule = "=".repeat(60);
        let banner = format!(
            "\n{}\n📋 Ready to start {} ({} packages)\n{}",
            rule,
            backend.label(),
            packages,
            rule
        );
        if writeln!(self.output, "{}", banner).is_err() {
            self.close("output error");
            return false;
        }

        loop {
            let prompt = format!("Do you want to proceed with {}? (y/n): ", backend.label());
            if self.output.write_all(prompt.as_bytes()).is_err() || self.output.flush().is_err() {
                self.close("output error");
                return false;
            }

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => {
                    self.close("end of input");
                    return false;
                }
                Err(e) => {
                    self.close(&e.to_string());
                    return false;
                }
                Ok(_) => {}
            }

            match line.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return true,
                "n" | "no" => {
                    let _ = writeln!(self.output, "⏭️  Skipping {}", backend.label());
                    return false;
                }
                _ => {
                    let _ = writeln!(self.output, "Please enter 'y' for yes or 'n' for no.");
                }
            }
        }
    }
}

/// Prompter for unattended sessions: every update is skipped, every phase runs
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessPrompter;

impl Prompter for HeadlessPrompter {
    fn ask(&mut self, package: &PackageDescriptor, from: &str, to: &str) -> Decision {
        info!(
            "Update available for {} ({} -> {}), skipped in non-interactive mode",
            package.name, from, to
        );
        Decision::Skip
    }
}

/// Replays a fixed list of answers and records what was asked
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompter {
    answers: VecDeque<Decision>,
    asked: Vec<String>,
    declined_phases: Vec<Backend>,
    phases: Vec<Backend>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
            declined_phases: Vec::new(),
            phases: Vec::new(),
        }
    }

    /// Answer "no" when asked to start `backend`'s phase
    pub fn decline_phase(mut self, backend: Backend) -> Self {
        self.declined_phases.push(backend);
        self
    }

    /// Phases the prompter was asked to confirm, in order
    pub fn phases(&self) -> &[Backend] {
        &self.phases
    }

    /// Ids of the packages the prompter was asked about, in order
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, package: &PackageDescriptor, _from: &str, _to: &str) -> Decision {
        self.asked.push(package.id.clone());
        self.answers.pop_front().unwrap_or(Decision::Skip)
    }

    fn confirm_phase(&mut self, backend: Backend, _packages: usize) -> bool {
        self.phases.push(backend);
        !self.declined_phases.contains(&backend)
    }
}

/// Pick the prompter for this session.
///
/// Interactive only when stdin is a terminal and the caller did not force
/// unattended mode.
pub fn session_prompter(non_interactive: bool) -> Box<dyn Prompter> {
    if non_interactive || !io::stdin().is_terminal() {
        debug!("Using headless prompter");
        Box::new(HeadlessPrompter)
    } else {
        Box::new(InteractivePrompter::stdio())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pkg(id: &str) -> PackageDescriptor {
        PackageDescriptor::new(id, id, "Tools", Backend::NodePackageManager)
    }

    fn prompter(input: &str) -> InteractivePrompter<Cursor<Vec<u8>>, Vec<u8>> {
        InteractivePrompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_yes_and_no() {
        let mut p = prompter("y\nno\n");
        assert_eq!(p.ask(&pkg("a"), "1", "2"), Decision::Update);
        assert_eq!(p.ask(&pkg("b"), "1", "2"), Decision::Skip);
        assert!(!p.skipping_remaining());
    }

    #[test]
    fn test_invalid_answer_reprompts() {
        let mut p = prompter("maybe\n\nY\n");
        assert_eq!(p.ask(&pkg("a"), "1", "2"), Decision::Update);
        let shown = String::from_utf8(p.output.clone()).unwrap();
        assert_eq!(shown.matches("Update a?").count(), 3);
    }

    #[test]
    fn test_skip_remaining_short_circuits() {
        let mut p = prompter("s\ny\n");
        assert_eq!(p.ask(&pkg("a"), "1", "2"), Decision::Skip);
        assert!(p.skipping_remaining());
        // The pending "y" is never read.
        assert_eq!(p.ask(&pkg("b"), "1", "2"), Decision::Skip);
    }

    #[test]
    fn test_end_of_input_skips_without_blocking() {
        let mut p = prompter("");
        assert_eq!(p.ask(&pkg("a"), "1", "2"), Decision::Skip);
        assert!(p.skipping_remaining());
    }

    #[test]
    fn test_phase_confirmation_answers() {
        let mut p = prompter("maybe\nyes\nn\n");
        assert!(p.confirm_phase(Backend::SystemPackageManager, 12));
        assert!(!p.confirm_phase(Backend::NodePackageManager, 3));
        let shown = String::from_utf8(p.output.clone()).unwrap();
        assert!(shown.contains("Ready to start System applications (winget) (12 packages)"));
        assert!(shown.contains("Please enter 'y' for yes or 'n' for no."));
        assert!(!p.skipping_remaining());
    }

    #[test]
    fn test_phase_confirmation_declines_on_closed_input() {
        let mut p = prompter("");
        assert!(!p.confirm_phase(Backend::NodePackageManager, 1));
        assert!(p.skipping_remaining());
    }

    #[test]
    fn test_headless_accepts_every_phase() {
        let mut p = HeadlessPrompter;
        assert!(p.confirm_phase(Backend::SystemPackageManager, 40));
        assert!(p.confirm_phase(Backend::NodePackageManager, 10));
    }

    #[test]
    fn test_headless_always_skips() {
        let mut p = HeadlessPrompter;
        assert_eq!(p.ask(&pkg("a"), "1", "2"), Decision::Skip);
    }

    #[test]
    fn test_scripted_records_and_defaults_to_skip() {
        let mut p = ScriptedPrompter::new([Decision::Update]);
        assert_eq!(p.ask(&pkg("a"), "1", "2"), Decision::Update);
        assert_eq!(p.ask(&pkg("b"), "1", "2"), Decision::Skip);
        assert_eq!(p.asked(), ["a".to_string(), "b".to_string()]);
    }
}
