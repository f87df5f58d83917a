//! Subprocess execution
//!
//! All local commands run through [`CommandSpec`], which carries the
//! program and arguments as discrete elements end-to-end. No shell string
//! evaluation (`sh -c`, `cmd /C`) happens anywhere: shell metacharacters in
//! arguments are passed through literally, which removes the injection
//! class entirely.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as TokioCommand;

use crate::error::CommandError;

/// Specification for a command to execute as an argument vector.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    /// The program to execute.
    pub program: OsString,
    /// Arguments as discrete elements (never a shell string).
    pub args: Vec<OsString>,
    /// Optional working directory.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Build a spec from a configured argument vector. Returns `None` for
    /// an empty vector.
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program).args(args.iter().map(OsString::from)))
    }

    /// Space-joined representation for log lines only; never executed.
    #[must_use]
    pub fn display_line(&self) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Convert into a `tokio::process::Command` using argv-style APIs only.
    #[must_use]
    pub fn to_tokio_command(&self) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

/// Captured output of a completed process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code; `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ProcessOutput {
    #[must_use]
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: Option<i32>, timed_out: bool) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            timed_out,
        }
    }

    #[must_use]
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    #[must_use]
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Whether the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Trait for process execution.
///
/// Implementations MUST use argv-style APIs only — no shell string
/// evaluation. stdout/stderr are captured, never streamed.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Execute a command with the given timeout.
    ///
    /// A non-zero exit code is a successful execution from this trait's
    /// point of view; it is reported in `ProcessOutput::exit_code`.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` when the process cannot be spawned, waited
    /// on, or does not finish within `timeout`.
    async fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, CommandError>;
}

/// Production runner on top of `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

impl TokioRunner {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioRunner {
    async fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, CommandError> {
        if cmd.program.is_empty() {
            return Err(CommandError::EmptyCommand);
        }

        let mut command = cmd.to_tokio_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| CommandError::Spawn {
            program: cmd.program.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ProcessOutput::new(
                output.stdout,
                output.stderr,
                output.status.code(),
                false,
            )),
            Ok(Err(e)) => Err(CommandError::Wait {
                reason: e.to_string(),
            }),
            Err(_) => Err(CommandError::Timeout {
                timeout_seconds: timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_builder() {
        let cmd = CommandSpec::new("pytest")
            .arg("--maxfail=1")
            .args(["--disable-warnings", "-q"])
            .cwd("/workspace");

        assert_eq!(cmd.program, OsString::from("pytest"));
        assert_eq!(cmd.args.len(), 3);
        assert_eq!(cmd.cwd, Some(PathBuf::from("/workspace")));
    }

    #[test]
    fn test_command_spec_from_argv() {
        let argv = vec!["tar".to_string(), "-czf".to_string(), "out.tar.gz".to_string()];
        let cmd = CommandSpec::from_argv(&argv).unwrap();
        assert_eq!(cmd.program, OsString::from("tar"));
        assert_eq!(cmd.args, vec![OsString::from("-czf"), OsString::from("out.tar.gz")]);

        assert!(CommandSpec::from_argv(&[]).is_none());
    }

    #[test]
    fn test_command_spec_shell_metacharacters_preserved() {
        // Arguments cross the boundary as discrete elements; metacharacters
        // must never be expanded.
        let cmd = CommandSpec::new("echo")
            .arg("$(whoami)")
            .arg("a;b")
            .arg("x|y");
        assert_eq!(cmd.args[0], OsString::from("$(whoami)"));
        assert_eq!(cmd.args[1], OsString::from("a;b"));
        assert_eq!(cmd.args[2], OsString::from("x|y"));
    }

    #[test]
    fn test_display_line() {
        let cmd = CommandSpec::new("cargo").args(["test", "--quiet"]);
        assert_eq!(cmd.display_line(), "cargo test --quiet");
    }

    #[test]
    fn test_process_output_success() {
        assert!(ProcessOutput::new(Vec::new(), Vec::new(), Some(0), false).success());
        assert!(!ProcessOutput::new(Vec::new(), Vec::new(), Some(1), false).success());
        assert!(!ProcessOutput::new(Vec::new(), Vec::new(), None, false).success());
        assert!(!ProcessOutput::new(Vec::new(), Vec::new(), Some(0), true).success());
    }

    #[tokio::test]
    async fn test_tokio_runner_captures_stdout() {
        let runner = TokioRunner::new();
        let cmd = CommandSpec::new("echo").arg("hello world");

        let output = runner.run(&cmd, Duration::from_secs(10)).await.unwrap();
        assert!(output.success());
        assert!(output.stdout_string().contains("hello world"));
    }

    #[tokio::test]
    async fn test_tokio_runner_propagates_exit_code() {
        let runner = TokioRunner::new();
        #[cfg(unix)]
        let cmd = CommandSpec::new("sh").args(["-c", "exit 42"]);
        #[cfg(windows)]
        let cmd = CommandSpec::new("cmd").args(["/C", "exit 42"]);

        let output = runner.run(&cmd, Duration::from_secs(10)).await.unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, Some(42));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_captures_stderr() {
        let runner = TokioRunner::new();
        let cmd = CommandSpec::new("sh").args(["-c", "echo 'error message' >&2"]);

        let output = runner.run(&cmd, Duration::from_secs(10)).await.unwrap();
        assert!(output.stderr_string().contains("error message"));
    }

    #[tokio::test]
    async fn test_tokio_runner_missing_executable() {
        let runner = TokioRunner::new();
        let cmd = CommandSpec::new("this_command_definitely_does_not_exist_12345");

        match runner.run(&cmd, Duration::from_secs(10)).await {
            Err(CommandError::Spawn { program, .. }) => {
                assert!(program.contains("does_not_exist"));
            }
            other => panic!("expected Spawn error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tokio_runner_empty_command() {
        let runner = TokioRunner::new();
        let cmd = CommandSpec::default();

        match runner.run(&cmd, Duration::from_secs(1)).await {
            Err(CommandError::EmptyCommand) => {}
            other => panic!("expected EmptyCommand, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_timeout() {
        let runner = TokioRunner::new();
        let cmd = CommandSpec::new("sleep").arg("5");

        match runner.run(&cmd, Duration::from_millis(100)).await {
            Err(CommandError::Timeout { timeout_seconds }) => {
                assert_eq!(timeout_seconds, 0);
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}
