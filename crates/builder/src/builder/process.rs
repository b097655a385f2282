//! External process execution.
//!
//! Every git and build invocation goes through a [`CommandRunner`] with an
//! explicit working directory. The process-wide current directory is never
//! changed.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One external command: program, arguments and the directory it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Shell-like rendering for log lines.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// What a finished command left behind.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// stdout followed by stderr, lossily decoded.
    pub log: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands to completion.
pub trait CommandRunner {
    /// Run `spec` and capture its output. `Err` means the program could not
    /// be started at all.
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput>;
}

/// Runs commands on the host.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        tracing::debug!(cwd = %spec.cwd.display(), "running {}", spec.display());

        let output = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .output()?;

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            code: output.status.code(),
            log,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_display() {
        let spec = CommandSpec::new("git", Path::new("/work"))
            .arg("clone")
            .args(["https://example.invalid/repo", "repo"]);
        assert_eq!(spec.display(), "git clone https://example.invalid/repo repo");
        assert_eq!(spec.cwd, PathBuf::from("/work"));
    }

    #[test]
    fn test_system_runner_uses_explicit_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = SystemRunner
            .run(&CommandSpec::new("pwd", dir.path()))
            .unwrap();
        assert!(out.success());
        let reported = std::fs::canonicalize(out.log.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_system_runner_reports_failure_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = SystemRunner
            .run(&CommandSpec::new("sh", dir.path()).args(["-c", "echo oops >&2; exit 4"]))
            .unwrap();
        assert_eq!(out.code, Some(4));
        assert!(out.log.contains("oops"));
    }
}
