//! # Mirror Server Controller
//!
//! Lifecycle of the scrcpy server on the device.
//!
//! ```text
//! start:  push payload ─▶ forward tcp:<port> ─▶ launch app_process ─▶ settle delay
//!           (fail fast at each step)
//! stop:   close stream ─▶ kill supervisor ─▶ forward --remove
//!           (every step runs, every failure is logged and ignored)
//! ```

use std::time::Duration;

use crate::config::CaptureConfig;
use crate::core::bridge::Bridge;
use crate::core::command::SupervisorProcess;
use crate::mirror::stream::VideoStream;

/// Launch options that put the server in capture-only mode: no control
/// channel, no clipboard sync, no frame metadata.
const CAPTURE_ONLY_OPTIONS: [&str; 12] = [
    "info=-",
    "tunnel_forward=true",
    "control=false",
    "cleanup=false",
    "power_off_on_close=false",
    "clipboard_autosync=false",
    "downsize_on_error=false",
    "send_frame_meta=false",
    "send_dummy_byte=false",
    "send_device_meta=false",
    "send_codec_meta=false",
    "raw_video_stream=false",
];

/// The local supervisor process running the remote server shell.
///
/// Existence of a handle implies the payload was pushed and the port forward
/// was created.
pub struct ServerHandle {
    supervisor: Box<dyn SupervisorProcess>,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("pid", &self.supervisor.id())
            .finish()
    }
}

impl ServerHandle {
    pub fn pid(&self) -> Option<u32> {
        self.supervisor.id()
    }
}

/// Starts and stops the mirror server for one device at a time.
#[derive(Debug, Clone)]
pub struct MirrorServer {
    bridge: Bridge,
    server_path: String,
    remote_server_path: String,
    server_class: String,
    server_version: String,
    socket_name: String,
    port: u16,
    settle_delay: Duration,
}

impl MirrorServer {
    pub fn new(bridge: Bridge, config: &CaptureConfig) -> Self {
        Self {
            bridge,
            server_path: config.server_path.to_string_lossy().into_owned(),
            remote_server_path: config.remote_server_path.clone(),
            server_class: config.server_class.clone(),
            server_version: config.server_version.clone(),
            socket_name: config.socket_name.clone(),
            port: config.port,
            settle_delay: config.settle_delay,
        }
    }

    /// Local port the video stream is forwarded to.
    pub fn port(&self) -> u16 {
        self.port
    }

    fn local_spec(&self) -> String {
        format!("tcp:{}", self.port)
    }

    /// Arguments passed after `-s <serial>` to launch the server.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            "shell".to_string(),
            format!("CLASSPATH={}", self.remote_server_path),
            "app_process".to_string(),
            "/".to_string(),
            self.server_class.clone(),
            self.server_version.clone(),
        ];
        args.extend(CAPTURE_ONLY_OPTIONS.iter().map(|opt| opt.to_string()));
        args
    }

    /// Pushes the payload, forwards the port, launches the server and waits
    /// for it to settle.
    ///
    /// Returns `None` as soon as a step fails. The caller still owns teardown:
    /// a failed launch can leave the forward in place, and [`stop`](Self::stop)
    /// removes it unconditionally.
    pub async fn start(&self, serial: &str) -> Option<ServerHandle> {
        let handle = self.launch(serial).await?;
        self.settle().await;
        Some(handle)
    }

    /// [`start`](Self::start) without the settle delay, so the caller holds
    /// the handle while waiting.
    pub async fn launch(&self, serial: &str) -> Option<ServerHandle> {
        let push = self
            .bridge
            .device(serial, &["push", &self.server_path, &self.remote_server_path])
            .await;
        if !push.is_success() {
            log::warn!("[{}] pushing mirror server failed: {}", serial, push.error.trim());
            return None;
        }

        let local = self.local_spec();
        let remote = format!("localabstract:{}", self.socket_name);
        let forward = self.bridge.device(serial, &["forward", &local, &remote]).await;
        if !forward.is_success() {
            log::warn!("[{}] port forward {} failed: {}", serial, local, forward.error.trim());
            return None;
        }

        let args = self.launch_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let supervisor = match self.bridge.spawn_device(serial, &args).await {
            Ok(supervisor) => supervisor,
            Err(e) => {
                log::warn!("[{}] launching mirror server failed: {}", serial, e);
                return None;
            }
        };
        log::info!("[{}] mirror server launched (pid {:?})", serial, supervisor.id());
        Some(ServerHandle { supervisor })
    }

    /// Waits for a freshly launched server to bind its socket.
    pub async fn settle(&self) {
        log::debug!("settling mirror server for {}ms", self.settle_delay.as_millis());
        tokio::time::sleep(self.settle_delay).await;
    }

    /// Releases every mirror resource for `serial`, whichever were acquired.
    ///
    /// Idempotent and infallible: the forward removal is always attempted, and
    /// failures are logged and ignored.
    pub async fn stop(
        &self,
        serial: &str,
        server: Option<ServerHandle>,
        stream: Option<VideoStream>,
    ) {
        if let Some(stream) = stream {
            stream.close().await;
        }

        if let Some(mut server) = server {
            if server.supervisor.has_exited() {
                log::debug!("[{}] mirror server already exited", serial);
            } else if let Err(e) = server.supervisor.kill().await {
                log::warn!("[{}] ignoring mirror server kill error: {}", serial, e);
            }
        }

        let local = self.local_spec();
        let remove = self.bridge.device(serial, &["forward", "--remove", &local]).await;
        if !remove.is_success() {
            // Removing a forward that was never created fails; that is fine.
            log::debug!("[{}] forward --remove {}: {}", serial, local, remove.error.trim());
        }
        log::info!("[{}] mirror server stopped", serial);
    }

    /// Runs [`stop`](Self::stop) on the current Tokio runtime without waiting.
    ///
    /// For destructors, which cannot await. Outside a runtime only the
    /// supervisor's `kill_on_drop` applies and the forward stays in place.
    pub fn stop_detached(
        &self,
        serial: &str,
        server: Option<ServerHandle>,
        stream: Option<VideoStream>,
    ) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::debug!("[{}] scheduling mirror teardown", serial);
                let mirror = self.clone();
                let serial = serial.to_string();
                handle.spawn(async move {
                    mirror.stop(&serial, server, stream).await;
                });
            }
            Err(_) => {
                log::warn!(
                    "[{}] mirror teardown outside a runtime; port forward left in place",
                    serial
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::{CommandResult, CommandRunner};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, _program: &Path, args: &[String]) -> CommandResult {
            self.calls.lock().unwrap().push(args.to_vec());
            CommandResult::failed("error: no devices/emulators found")
        }

        async fn spawn(
            &self,
            _program: &Path,
            _args: &[String],
        ) -> std::io::Result<Box<dyn SupervisorProcess>> {
            Err(std::io::Error::other("not expected"))
        }
    }

    fn server(runner: Arc<RecordingRunner>) -> MirrorServer {
        let config = CaptureConfig::new("adb", "/opt/scrcpy/scrcpy-server")
            .with_settle_delay(Duration::ZERO);
        MirrorServer::new(Bridge::new(runner, "adb"), &config)
    }

    #[test]
    fn test_launch_args_are_capture_only() {
        let server = server(Arc::new(RecordingRunner::default()));
        let args = server.launch_args();

        assert_eq!(
            &args[..6],
            &[
                "shell",
                "CLASSPATH=/data/local/tmp/scrcpy-server.jar",
                "app_process",
                "/",
                "com.genymobile.scrcpy.Server",
                "2.0"
            ]
        );
        for option in ["control=false", "clipboard_autosync=false", "send_frame_meta=false"] {
            assert!(args.iter().any(|arg| arg == option), "missing {option}");
        }
    }

    #[tokio::test]
    async fn test_push_failure_skips_forward() {
        let runner = Arc::new(RecordingRunner::default());
        let handle = server(runner.clone()).start("ABC123").await;

        assert!(handle.is_none());
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][2], "push");
    }

    #[tokio::test]
    async fn test_stop_without_resources_still_removes_forward() {
        let runner = Arc::new(RecordingRunner::default());
        server(runner.clone()).stop("ABC123", None, None).await;

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[vec!["-s", "ABC123", "forward", "--remove", "tcp:27183"]]);
    }
}
