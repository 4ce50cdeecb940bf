//! # Configuration Module
//!
//! Paths to the external tools and the fixed constants of the mirror session.
//!
//! ## Configuration Parameters
//!
//! | Parameter | Default | Description |
//! |-----------|---------|-------------|
//! | `adb_path` | `adb` | Bridge tool executable |
//! | `server_path` | `scrcpy-server` | Local mirror server payload pushed to the device |
//! | `port` | `27183` | Local TCP port forwarded to the device socket |
//! | `socket_name` | `scrcpy` | Device-side abstract socket name |
//! | `remote_server_path` | `/data/local/tmp/scrcpy-server.jar` | Payload location on the device |
//! | `server_class` | `com.genymobile.scrcpy.Server` | Main class launched via `app_process` |
//! | `server_version` | `2.0` | Version argument expected by the payload |
//! | `device_screenshot_path` | `/sdcard/temp_screenshot.png` | Screencap render target |
//! | `settle_delay` | 2s | Wait after launching the server before connecting |
//! | `connect_timeout` | 5s | Bound on the TCP connect to the forwarded port |
//! | `frame_read_timeout` | 2s | Bound on a single frame read |
//! | `command_timeout` | 30s | Bound on each bridge command |
//!
//! ## Path Resolution
//!
//! [`CaptureConfig::resolve`] prefers explicit paths. Otherwise it looks next to
//! the running executable, then on `PATH` for the bridge tool. The server payload
//! has no `PATH` fallback and is a required file.
//!
//! ```rust,no_run
//! use android_screen_capture::config::CaptureConfig;
//!
//! let config = CaptureConfig::resolve(None, None)?;
//! config.validate()?;
//! # Ok::<(), android_screen_capture::CaptureError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CaptureError, CaptureResult};

/// Default local port for the mirror video socket.
pub const DEFAULT_PORT: u16 = 27183;

#[cfg(windows)]
const ADB_EXECUTABLE: &str = "adb.exe";
#[cfg(not(windows))]
const ADB_EXECUTABLE: &str = "adb";

const SERVER_FILE_NAMES: [&str; 2] = ["scrcpy-server", "scrcpy-server.jar"];

/// Configuration for talking to one or more Android devices.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Bridge tool executable (absolute path or a name resolved on `PATH`).
    pub adb_path: PathBuf,

    /// Mirror server payload on the host.
    pub server_path: PathBuf,

    /// Local TCP port forwarded to `socket_name` on the device.
    ///
    /// Shared by every session of a device; only one mirror session per
    /// device can be active at a time.
    pub port: u16,

    /// Device-side abstract socket the mirror server listens on.
    pub socket_name: String,

    /// Where the payload is pushed on the device.
    pub remote_server_path: String,

    /// Main class launched through `app_process`.
    pub server_class: String,

    /// Version string the payload checks against its own build.
    pub server_version: String,

    /// Device-side file the screencap fallback renders into.
    pub device_screenshot_path: String,

    /// Time given to the remote server to bind its socket after launch.
    pub settle_delay: Duration,

    /// Upper bound on the TCP connect to the forwarded port.
    pub connect_timeout: Duration,

    /// Upper bound on a single frame read from the video stream.
    pub frame_read_timeout: Duration,

    /// Upper bound on each bridge command; `None` waits indefinitely.
    pub command_timeout: Option<Duration>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from(ADB_EXECUTABLE),
            server_path: PathBuf::from(SERVER_FILE_NAMES[0]),
            port: DEFAULT_PORT,
            socket_name: "scrcpy".to_string(),
            remote_server_path: "/data/local/tmp/scrcpy-server.jar".to_string(),
            server_class: "com.genymobile.scrcpy.Server".to_string(),
            server_version: "2.0".to_string(),
            device_screenshot_path: "/sdcard/temp_screenshot.png".to_string(),
            settle_delay: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
            frame_read_timeout: Duration::from_secs(2),
            command_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl CaptureConfig {
    /// Creates a configuration with explicit tool paths and default constants.
    pub fn new(adb_path: impl Into<PathBuf>, server_path: impl Into<PathBuf>) -> Self {
        Self {
            adb_path: adb_path.into(),
            server_path: server_path.into(),
            ..Self::default()
        }
    }

    /// Resolves tool paths relative to the running executable's directory.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Config`] when no server payload is given and none
    /// is found next to the executable.
    pub fn resolve(adb_path: Option<PathBuf>, server_path: Option<PathBuf>) -> CaptureResult<Self> {
        let base_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::resolve_in(&base_dir, adb_path, server_path)
    }

    /// Same as [`resolve`](Self::resolve) with an explicit search directory.
    pub fn resolve_in(
        base_dir: &Path,
        adb_path: Option<PathBuf>,
        server_path: Option<PathBuf>,
    ) -> CaptureResult<Self> {
        let adb_path = match adb_path {
            Some(path) => path,
            None => locate_bridge_tool(base_dir),
        };
        let server_path = match server_path {
            Some(path) => path,
            None => locate_server(base_dir)?,
        };
        log::debug!(
            "resolved adb={} server={}",
            adb_path.display(),
            server_path.display()
        );
        Ok(Self::new(adb_path, server_path))
    }

    /// Sets the forwarded port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the post-launch settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the connect and frame-read timeouts.
    pub fn with_stream_timeouts(mut self, connect: Duration, frame_read: Duration) -> Self {
        self.connect_timeout = connect;
        self.frame_read_timeout = frame_read;
        self
    }

    /// Sets the per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> CaptureResult<()> {
        if self.port == 0 {
            return Err(CaptureError::validation("port", "must be greater than 0", "0"));
        }
        for (field, value) in [
            ("socket_name", &self.socket_name),
            ("server_class", &self.server_class),
            ("server_version", &self.server_version),
        ] {
            if value.trim().is_empty() {
                return Err(CaptureError::validation(field, "must not be empty", value.as_str()));
            }
        }
        for (field, value) in [
            ("remote_server_path", &self.remote_server_path),
            ("device_screenshot_path", &self.device_screenshot_path),
        ] {
            if !value.starts_with('/') {
                return Err(CaptureError::validation(
                    field,
                    "must be an absolute device path",
                    value.as_str(),
                ));
            }
        }
        for (field, value) in [
            ("connect_timeout", Some(self.connect_timeout)),
            ("frame_read_timeout", Some(self.frame_read_timeout)),
            ("command_timeout", self.command_timeout),
        ] {
            if value == Some(Duration::ZERO) {
                return Err(CaptureError::validation(field, "must be greater than 0", "0s"));
            }
        }
        Ok(())
    }
}

fn locate_bridge_tool(base_dir: &Path) -> PathBuf {
    let local = base_dir.join(ADB_EXECUTABLE);
    if local.is_file() {
        return local;
    }
    which::which("adb").unwrap_or_else(|_| PathBuf::from(ADB_EXECUTABLE))
}

fn locate_server(base_dir: &Path) -> CaptureResult<PathBuf> {
    SERVER_FILE_NAMES
        .iter()
        .map(|name| base_dir.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            CaptureError::config(
                "server_path",
                base_dir.display().to_string(),
                "scrcpy-server file not found",
            )
            .with_recovery_suggestion(
                "Place scrcpy-server in the application directory or pass its path explicitly",
            )
        })
}
