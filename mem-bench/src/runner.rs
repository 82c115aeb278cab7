//! Child process execution
//!
//! The driver describes every process it needs as an [`Invocation`] and hands
//! it to a [`CommandRunner`]. [`ProcessRunner`] spawns real processes; tests
//! substitute a recording fake.

use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;

/// A process to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory; inherited when `None`
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Redirect standard output to this file instead of capturing it
    pub stdout_to: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            stdout_to: None,
        }
    }

    /// Builder method: append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Builder method: set the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Builder method: add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Builder method: write standard output to a file
    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_to = Some(path.into());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}=\"{}\" ", key, value)?;
        }
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        if let Some(path) = &self.stdout_to {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}

/// Errors from running a child process
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open output file {path:?}: {source}")]
    Redirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with code {code}: {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Captured output of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs processes to completion
pub trait CommandRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<CommandOutput, CommandError>;
}

/// Spawns real child processes
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        log::debug!("Running: {}", invocation);
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &invocation.env {
            command.env(key, value);
        }
        if let Some(path) = &invocation.stdout_to {
            let file = File::create(path).map_err(|source| CommandError::Redirect {
                path: path.clone(),
                source,
            })?;
            command.stdout(Stdio::from(file));
        }

        let output = command.output().map_err(|source| CommandError::Spawn {
            program: invocation.program.display().to_string(),
            source,
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(CommandError::Failed {
                command: invocation.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display() {
        let invocation = Invocation::new("lifetime-analysis")
            .args(["--trace", "out/mem-trace"])
            .env("OPTS", "-ea")
            .stdout_to("out/enhanced-trace");
        assert_eq!(
            invocation.to_string(),
            "OPTS=\"-ea\" lifetime-analysis --trace out/mem-trace > out/enhanced-trace"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_captures_stdout() {
        let output = ProcessRunner
            .run(&Invocation::new("sh").args(["-c", "echo hello"]))
            .unwrap();
        assert_eq!(output.stdout, "hello\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_reports_failure() {
        let err = ProcessRunner
            .run(&Invocation::new("sh").args(["-c", "echo oops >&2; exit 3"]))
            .unwrap_err();
        match err {
            CommandError::Failed { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_redirects_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let output = ProcessRunner
            .run(
                &Invocation::new("sh")
                    .args(["-c", "echo $GREETING"])
                    .env("GREETING", "hi")
                    .stdout_to(&out),
            )
            .unwrap();
        assert!(output.stdout.is_empty());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hi\n");
    }
}
