//! # Command Runner
//!
//! Runs external tools as subprocesses. Failures are reported as data: a
//! non-zero exit, a launch failure or a timeout all produce a non-success
//! [`CommandResult`] instead of an error.
//!
//! Long-running children (the mirror server supervisor) are started through
//! [`CommandRunner::spawn`] and handed back as a [`SupervisorProcess`].

use std::io;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code was 0.
    pub success: bool,
    /// Captured standard output.
    pub output: String,
    /// Captured standard error, or the launch failure description.
    pub error: String,
}

impl CommandResult {
    /// A successful result with the given stdout.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
        }
    }

    /// A non-success result with the given error text.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
        }
    }

    /// Builds a result from a finished process.
    pub fn from_output(output: Output) -> Self {
        Self {
            success: output.status.success(),
            output: String::from_utf8_lossy(&output.stdout).into_owned(),
            error: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

/// Handle to a long-running child process.
#[async_trait]
pub trait SupervisorProcess: Send + Sync {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Whether the process has already exited.
    fn has_exited(&mut self) -> bool;

    /// Kills the process and waits for it to exit.
    async fn kill(&mut self) -> io::Result<()>;
}

/// Executes external tools.
///
/// [`ProcessRunner`] is the production implementation; tests substitute a
/// scripted runner.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` to completion, capturing both output streams.
    async fn run(&self, program: &Path, args: &[String]) -> CommandResult;

    /// Starts `program` with `args` as a long-running child.
    async fn spawn(&self, program: &Path, args: &[String]) -> io::Result<Box<dyn SupervisorProcess>>;
}

/// Runs commands with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &Path, args: &[String]) -> CommandResult {
        log::debug!("running {} {}", program.display(), args.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = command.output();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(output) => output,
                Err(_) => {
                    return CommandResult::failed(format!(
                        "{} timed out after {}ms",
                        program.display(),
                        limit.as_millis()
                    ));
                }
            },
            None => output.await,
        };

        match output {
            Ok(output) => CommandResult::from_output(output),
            Err(e) => CommandResult::failed(format!(
                "failed to launch {}: {}",
                program.display(),
                e
            )),
        }
    }

    async fn spawn(&self, program: &Path, args: &[String]) -> io::Result<Box<dyn SupervisorProcess>> {
        log::debug!("spawning {} {}", program.display(), args.join(" "));

        // Output is discarded so an unread pipe can never stall the child.
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        Ok(Box::new(ChildSupervisor { child }))
    }
}

/// [`SupervisorProcess`] backed by a `tokio::process::Child`.
#[derive(Debug)]
pub struct ChildSupervisor {
    child: Child,
}

#[async_trait]
impl SupervisorProcess for ChildSupervisor {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}
