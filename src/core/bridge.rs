//! # Bridge Tool
//!
//! Builds `adb` invocations on top of a [`CommandRunner`].
//!
//! Device-scoped commands take the form `adb -s <serial> <subcommand> [args]`,
//! global ones `adb <subcommand> [args]`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::command::{CommandResult, CommandRunner, SupervisorProcess};
use crate::error::{CaptureError, CaptureResult};

/// Marker `adb version` prints on its first line.
const VERSION_BANNER: &str = "Android Debug Bridge";

/// Shared handle to the bridge tool.
#[derive(Clone)]
pub struct Bridge {
    runner: Arc<dyn CommandRunner>,
    tool: PathBuf,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").field("tool", &self.tool).finish()
    }
}

impl Bridge {
    pub fn new(runner: Arc<dyn CommandRunner>, tool: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            tool: tool.into(),
        }
    }

    /// Path of the bridge executable.
    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Runs a global command such as `devices` or `version`.
    pub async fn global(&self, args: &[&str]) -> CommandResult {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        self.runner.run(&self.tool, &args).await
    }

    /// Runs a command scoped to one device.
    pub async fn device(&self, serial: &str, args: &[&str]) -> CommandResult {
        self.runner.run(&self.tool, &device_args(serial, args)).await
    }

    /// Starts a long-running device command, e.g. the mirror server shell.
    pub async fn spawn_device(
        &self,
        serial: &str,
        args: &[&str],
    ) -> io::Result<Box<dyn SupervisorProcess>> {
        self.runner.spawn(&self.tool, &device_args(serial, args)).await
    }

    /// Serials of devices in the `device` state.
    ///
    /// A non-success `devices` command is logged and yields an empty list.
    pub async fn list_devices(&self) -> Vec<String> {
        let result = self.global(&["devices"]).await;
        if !result.is_success() {
            log::warn!("adb devices failed: {}", result.error.trim());
            return Vec::new();
        }
        parse_device_list(&result.output)
    }

    /// Whether `adb version` runs and identifies itself.
    pub async fn is_available(&self) -> bool {
        let result = self.global(&["version"]).await;
        result.is_success() && result.output.contains(VERSION_BANNER)
    }

    /// Runs a device command and turns non-success into [`CaptureError::Command`].
    pub async fn device_checked(&self, serial: &str, args: &[&str]) -> CaptureResult<CommandResult> {
        let result = self.device(serial, args).await;
        if result.is_success() {
            Ok(result)
        } else {
            Err(CaptureError::command(args.join(" "), result.error.trim())
                .with_metadata("serial", serial))
        }
    }
}

fn device_args(serial: &str, args: &[&str]) -> Vec<String> {
    let mut full = Vec::with_capacity(args.len() + 2);
    full.push("-s".to_string());
    full.push(serial.to_string());
    full.extend(args.iter().map(|arg| arg.to_string()));
    full
}

/// Parses `adb devices` output into serials whose state is `device`.
///
/// The header line is skipped; `offline`, `unauthorized` and malformed lines
/// are ignored.
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.trim().split('\t');
            let serial = parts.next()?.trim();
            let state = parts.next()?.trim();
            (state == "device" && !serial.is_empty()).then(|| serial.to_string())
        })
        .collect()
}
