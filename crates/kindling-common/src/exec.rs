//! External command execution
//!
//! All interaction with `kind`, `docker`, `kubectl`, `helm` and the host goes
//! through [`CommandRunner`]. The real implementation spawns processes with
//! tokio; tests substitute `MockCommandRunner`.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// A single external command call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Program to execute, resolved through `PATH`
    pub program: String,
    /// Arguments, passed verbatim (no shell)
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Payload written to the child's standard input
    pub stdin: Option<String>,
}

impl Invocation {
    /// Start building an invocation of `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Pipe `payload` into the child's standard input
    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Arguments joined with spaces, for logs and error messages
    pub fn args_line(&self) -> String {
        self.args.join(" ")
    }

    /// True if the arguments start with `prefix`
    pub fn starts_with(&self, program: &str, prefix: &[&str]) -> bool {
        self.program == program
            && self.args.len() >= prefix.len()
            && self.args.iter().zip(prefix).all(|(a, p)| a == p)
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited with status zero
    pub success: bool,
    /// Exit code, if any
    pub code: Option<i32>,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl CommandOutput {
    /// A successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with exit code 1 and the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Executes external commands
///
/// Implementations must not interpret a non-zero exit as an error; that is
/// decided by the helpers below.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion and capture its output
    async fn output(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runs commands as tokio child processes
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    /// Create a new runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn output(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(program = %invocation.program, args = %invocation.args_line(), "running");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let spawn_err = |source| Error::Spawn {
            program: invocation.program.clone(),
            source,
        };

        let mut child = command.spawn().map_err(spawn_err)?;

        // Feed stdin while the child runs so a full stdout pipe cannot stall
        // the write. A child that exits without reading its input closes the
        // pipe early; its exit status and stderr are what matter then.
        let stdin_pipe = child.stdin.take();
        let feed = async {
            if let (Some(payload), Some(mut stdin)) = (invocation.stdin.as_deref(), stdin_pipe) {
                match stdin.write_all(payload.as_bytes()).await {
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!(program = %invocation.program, "child closed stdin early");
                    }
                    other => other?,
                }
                // Dropping closes the pipe so the child sees EOF
                drop(stdin);
            }
            Ok::<(), std::io::Error>(())
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        fed?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a command and fail unless it exits successfully. Returns stdout.
pub async fn run_checked<R: CommandRunner + ?Sized>(
    runner: &R,
    invocation: Invocation,
) -> Result<String> {
    let output = runner.output(&invocation).await?;
    if !output.success {
        let args = invocation.args_line();
        return Err(Error::CommandFailed {
            program: invocation.program,
            args,
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// Run a command as an existence check: `Ok(true)` on exit status zero.
pub async fn probe<R: CommandRunner + ?Sized>(runner: &R, invocation: Invocation) -> Result<bool> {
    Ok(runner.output(&invocation).await?.success)
}

/// Run a command whose failure is expected and harmless (deleting something
/// that may not exist). Spawn errors still propagate.
pub async fn run_best_effort<R: CommandRunner + ?Sized>(
    runner: &R,
    invocation: Invocation,
) -> Result<()> {
    let output = runner.output(&invocation).await?;
    if !output.success {
        debug!(
            program = %invocation.program,
            args = %invocation.args_line(),
            stderr = %output.stderr.trim(),
            "ignoring failure"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_builder_collects_everything() {
        let inv = Invocation::new("kind")
            .args(["create", "cluster"])
            .arg("--name")
            .arg("dev")
            .env("KIND_EXPERIMENTAL_DOCKER_NETWORK", "kind")
            .stdin("kind: Cluster");

        assert_eq!(inv.program, "kind");
        assert_eq!(inv.args_line(), "create cluster --name dev");
        assert_eq!(inv.env.len(), 1);
        assert_eq!(inv.stdin.as_deref(), Some("kind: Cluster"));
    }

    #[test]
    fn starts_with_matches_program_and_prefix() {
        let inv = Invocation::new("docker").args(["network", "ls"]);
        assert!(inv.starts_with("docker", &["network"]));
        assert!(inv.starts_with("docker", &["network", "ls"]));
        assert!(!inv.starts_with("docker", &["network", "ls", "-q"]));
        assert!(!inv.starts_with("kubectl", &["network"]));
    }

    #[tokio::test]
    async fn run_checked_returns_stdout_on_success() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .times(1)
            .returning(|_| Ok(CommandOutput::ok("hello\n")));

        let out = run_checked(&runner, Invocation::new("echo").arg("hello"))
            .await
            .unwrap();
        assert_eq!(out, "hello\n");
    }

    #[tokio::test]
    async fn run_checked_maps_failure_to_command_failed() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .returning(|_| Ok(CommandOutput::failed("  boom \n")));

        let err = run_checked(&runner, Invocation::new("helm").arg("version"))
            .await
            .unwrap_err();
        match err {
            Error::CommandFailed {
                program,
                args,
                stderr,
                code,
            } => {
                assert_eq!(program, "helm");
                assert_eq!(args, "version");
                assert_eq!(stderr, "boom");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn probe_and_best_effort_swallow_exit_status() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .times(2)
            .returning(|_| Ok(CommandOutput::failed("not found")));

        assert!(!probe(&runner, Invocation::new("docker")).await.unwrap());
        assert!(run_best_effort(&runner, Invocation::new("kubectl"))
            .await
            .is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stderr_survives_child_ignoring_stdin() {
        let runner = TokioCommandRunner::new();
        let invocation = Invocation::new("sh")
            .args(["-c", "echo 'sudo: a password is required' >&2; exit 1"])
            .stdin("x".repeat(1 << 20));

        let err = run_checked(&runner, invocation).await.unwrap_err();
        match err {
            Error::CommandFailed {
                program,
                code,
                stderr,
                ..
            } => {
                assert_eq!(program, "sh");
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "sudo: a password is required");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdin_reaches_the_child() {
        let runner = TokioCommandRunner::new();
        let out = run_checked(&runner, Invocation::new("cat").stdin("kind: Cluster\n"))
            .await
            .unwrap();
        assert_eq!(out, "kind: Cluster\n");
    }

    #[tokio::test]
    async fn tokio_runner_reports_spawn_errors() {
        let runner = TokioCommandRunner::new();
        let err = runner
            .output(&Invocation::new("kindling-definitely-not-a-real-binary"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
