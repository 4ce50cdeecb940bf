//! # Android Device
//!
//! Capture orchestration for a single device serial.
//!
//! ## Modes
//!
//! - **One-shot** ([`AndroidDevice::capture_screenshot`]): start server, connect,
//!   read one frame, then always tear down. If no frame was produced, fall back
//!   to screencap.
//! - **Persistent** ([`AndroidDevice::connect_persistent`] +
//!   [`AndroidDevice::capture_from_connected`]): the session stays open across
//!   captures. A no-frame read falls back to screencap and keeps the session; a
//!   transport failure tears the session down first.
//!
//! ## Concurrency
//!
//! Methods take `&mut self`, so calls for one serial are serialized by the
//! borrow checker (or by the `Mutex` handed out by
//! [`DeviceManager`](crate::manager::DeviceManager)). Devices share no state.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use android_screen_capture::{AndroidDevice, CaptureConfig, ProcessRunner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(CaptureConfig::resolve(None, None)?);
//! let runner = Arc::new(ProcessRunner::new(config.command_timeout));
//! let mut device = AndroidDevice::new("emulator-5554", runner, config);
//!
//! let image = device.capture_screenshot().await?;
//! println!("{}x{}", image.width(), image.height());
//!
//! if device.connect_persistent().await {
//!     for _ in 0..3 {
//!         device.capture_from_connected().await?;
//!     }
//!     device.disconnect().await;
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use tokio::task::spawn_blocking;

use crate::capture::{encode, screencap};
use crate::config::CaptureConfig;
use crate::core::bridge::Bridge;
use crate::core::command::CommandRunner;
use crate::error::{CaptureError, CaptureResult};
use crate::mirror::MirrorServer;
use crate::session::{ConnectionPhase, ConnectionState, MirrorGuard};

/// One Android device, identified by serial.
#[derive(Debug)]
pub struct AndroidDevice {
    serial: String,
    name: Option<String>,
    bridge: Bridge,
    server: MirrorServer,
    config: Arc<CaptureConfig>,
    state: ConnectionState,
}

impl AndroidDevice {
    pub fn new(
        serial: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        config: Arc<CaptureConfig>,
    ) -> Self {
        let bridge = Bridge::new(runner, config.adb_path.clone());
        Self::with_bridge(serial, bridge, config)
    }

    pub(crate) fn with_bridge(
        serial: impl Into<String>,
        bridge: Bridge,
        config: Arc<CaptureConfig>,
    ) -> Self {
        let server = MirrorServer::new(bridge.clone(), &config);
        Self {
            serial: serial.into(),
            name: None,
            bridge,
            server,
            config,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Product model, cached after the first successful lookup.
    ///
    /// Falls back to the serial (uncached) when the lookup fails.
    pub async fn name(&mut self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let result = self
            .bridge
            .device(&self.serial, &["shell", "getprop", "ro.product.model"])
            .await;
        let model = result.output.trim();
        if result.is_success() && !model.is_empty() {
            self.name = Some(model.to_string());
            return model.to_string();
        }
        self.serial.clone()
    }

    /// Whether the bridge reports this device in the `device` state.
    pub async fn is_online(&self) -> bool {
        let result = self.bridge.device(&self.serial, &["get-state"]).await;
        result.is_success() && result.output.trim() == "device"
    }

    /// Whether a persistent mirror session is open.
    pub fn is_mirror_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn connection_phase(&self) -> ConnectionPhase {
        self.state.phase()
    }

    /// Captures one screenshot, owning the whole mirror lifecycle.
    ///
    /// With a persistent session open this reuses it instead, since the port
    /// and supervisor are per-device singletons.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Pipeline`] when neither the mirror stream nor the
    /// screencap fallback produced an image.
    pub async fn capture_screenshot(&mut self) -> CaptureResult<DynamicImage> {
        if self.state.is_connected() {
            log::debug!("[{}] persistent session open, capturing through it", self.serial);
            return self.capture_from_connected().await;
        }

        if let Some(image) = self.capture_via_mirror().await {
            return Ok(image);
        }
        self.fallback().await
    }

    /// Runs the mirror pipeline once. Teardown always follows, whatever step
    /// stopped the pipeline, including cancellation of this future.
    async fn capture_via_mirror(&mut self) -> Option<DynamicImage> {
        let mut guard = MirrorGuard::new(&self.serial, &self.server, &mut self.state);
        let frame = Self::mirror_frame(&mut guard, &self.config).await;
        guard.release().await;
        frame
    }

    async fn mirror_frame(guard: &mut MirrorGuard<'_>, config: &CaptureConfig) -> Option<DynamicImage> {
        if !guard.start().await || !guard.connect(config.connect_timeout).await {
            return None;
        }
        let serial = guard.serial().to_string();
        match guard.stream_mut()?.read_frame(config.frame_read_timeout).await {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("[{}] mirror frame read failed: {}", serial, e);
                None
            }
        }
    }

    async fn fallback(&self) -> CaptureResult<DynamicImage> {
        screencap::pull_screenshot(&self.bridge, &self.serial, &self.config.device_screenshot_path)
            .await
            .map_err(|cause| {
                log::warn!("[{}] all capture strategies failed", self.serial);
                CaptureError::pipeline_from(&self.serial, cause)
                    .with_operation("capture_screenshot")
                    .with_recovery_suggestion(
                        "Unlock the device and check that `adb devices` lists it as 'device'",
                    )
            })
    }

    /// Captures a screenshot and writes it to `path`.
    ///
    /// The encoder is chosen by extension (see [`encode::output_format_for`]).
    pub async fn capture_screenshot_to_file(&mut self, path: impl AsRef<Path>) -> CaptureResult<PathBuf> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty() {
            return Err(CaptureError::validation("file_path", "must not be empty", ""));
        }

        let image = self.capture_screenshot().await?;
        let target = path.clone();
        spawn_blocking(move || encode::save_image(&image, &target)).await??;
        log::info!("[{}] screenshot saved to {}", self.serial, path.display());
        Ok(path)
    }

    /// Opens a persistent mirror session.
    ///
    /// Any existing session is torn down first. Returns `false` if a setup step
    /// failed; everything acquired so far is released and the state is
    /// `Disconnected`. The same holds if this future is cancelled part way.
    pub async fn connect_persistent(&mut self) -> bool {
        if self.state.phase() != ConnectionPhase::Disconnected {
            self.disconnect().await;
        }

        let mut guard = MirrorGuard::new(&self.serial, &self.server, &mut self.state);
        if !guard.start().await || !guard.connect(self.config.connect_timeout).await {
            guard.release().await;
            return false;
        }
        let connected = guard.commit();
        if connected {
            log::info!("[{}] persistent mirror session connected", self.serial);
        }
        connected
    }

    /// Closes the persistent session, from any state.
    ///
    /// Always ends `Disconnected` and never fails; the port forward removal
    /// is attempted even with no session open.
    pub async fn disconnect(&mut self) {
        MirrorGuard::from_session(&self.serial, &self.server, &mut self.state)
            .release()
            .await;
    }

    /// Captures a screenshot through the open persistent session.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::State`] when no session is open; call
    ///   [`connect_persistent`](Self::connect_persistent) first.
    /// - [`CaptureError::Pipeline`] when the stream yields no frame and the
    ///   screencap fallback fails.
    pub async fn capture_from_connected(&mut self) -> CaptureResult<DynamicImage> {
        let timeout = self.config.frame_read_timeout;
        let read = match &mut self.state {
            ConnectionState::Connected(session) => session.stream.read_frame(timeout).await,
            other => {
                return Err(CaptureError::state(
                    other.phase().to_string(),
                    "capture_from_connected",
                    format!(
                        "device {} is not connected to the mirror server; call connect_persistent() first",
                        self.serial
                    ),
                )
                .with_metadata("serial", self.serial.clone())
                .with_recovery_suggestion("Call connect_persistent() before capture_from_connected()"));
            }
        };

        match read {
            Ok(Some(image)) => return Ok(image),
            Ok(None) => {
                log::debug!("[{}] no mirror frame, keeping session and falling back", self.serial);
            }
            Err(e) => {
                log::warn!(
                    "[{}] mirror transport failed ({}), closing session",
                    self.serial,
                    e
                );
                self.disconnect().await;
            }
        }

        self.fallback().await
    }
}

impl Drop for AndroidDevice {
    fn drop(&mut self) {
        let Some(session) = self.state.take_session() else {
            return;
        };
        log::debug!("[{}] dropped while connected", self.serial);
        let (server, stream) = session.into_parts();
        self.server.stop_detached(&self.serial, Some(server), Some(stream));
    }
}
