//! Structured backend invocation
//!
//! A `PackageCommand` is everything the executor needs to run one backend
//! subcommand: program, argument vector, wall-clock timeout and the rule that
//! decides whether an exit code counts as success. Arguments are never joined
//! into a shell string.

use std::fmt;
use std::time::Duration;

/// Default hard timeout for install/upgrade commands
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Default timeout for metadata queries (list/show/view)
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Maps an exit code to success
pub type SuccessPredicate = fn(i32) -> bool;

/// Conventional rule: zero is success
pub fn exit_zero(code: i32) -> bool {
    code == 0
}

#[derive(Debug, Clone)]
pub struct PackageCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub success: SuccessPredicate,
}

impl PackageCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_INSTALL_TIMEOUT,
            success: exit_zero,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn success_when(mut self, predicate: SuccessPredicate) -> Self {
        self.success = predicate;
        self
    }

    /// Whether `code` counts as success for this command
    pub fn is_success(&self, code: i32) -> bool {
        (self.success)(code)
    }

    /// First argument, used to identify the subcommand in logs and fakes
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

impl fmt::Display for PackageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_argument_boundaries() {
        let cmd = PackageCommand::new("npm")
            .args(["install", "-g"])
            .arg("@vue/cli")
            .timeout(Duration::from_secs(5));
        assert_eq!(cmd.args, vec!["install", "-g", "@vue/cli"]);
        assert_eq!(cmd.timeout, Duration::from_secs(5));
        assert_eq!(cmd.subcommand(), Some("install"));
        assert_eq!(cmd.to_string(), "npm install -g @vue/cli");
    }

    #[test]
    fn test_success_predicate() {
        let cmd = PackageCommand::new("tool");
        assert!(cmd.is_success(0));
        assert!(!cmd.is_success(1));

        let lenient = cmd.success_when(|code| code == 0 || code == 3);
        assert!(lenient.is_success(3));
        assert!(!lenient.is_success(4));
    }
}
