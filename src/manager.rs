//! # Device Manager
//!
//! Entry point for callers: enumerates devices and hands out one shared
//! [`AndroidDevice`] per serial.
//!
//! Handles are `Arc<Mutex<AndroidDevice>>`, so concurrent callers on the same
//! serial are serialized while different serials proceed independently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::CaptureConfig;
use crate::core::bridge::Bridge;
use crate::core::command::{CommandRunner, ProcessRunner};
use crate::device::AndroidDevice;
use crate::error::CaptureResult;

/// Shared, per-serial device handle.
pub type DeviceHandle = Arc<Mutex<AndroidDevice>>;

/// Tracks devices reachable through one bridge tool.
#[derive(Debug)]
pub struct DeviceManager {
    bridge: Bridge,
    config: Arc<CaptureConfig>,
    devices: HashMap<String, DeviceHandle>,
}

impl DeviceManager {
    /// Creates a manager that runs real subprocesses.
    pub fn new(config: CaptureConfig) -> Self {
        let runner = Arc::new(ProcessRunner::new(config.command_timeout));
        Self::with_runner(config, runner)
    }

    /// Creates a manager on top of a custom [`CommandRunner`].
    pub fn with_runner(config: CaptureConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let bridge = Bridge::new(runner, config.adb_path.clone());
        Self {
            bridge,
            config: Arc::new(config),
            devices: HashMap::new(),
        }
    }

    /// Resolves tool paths (see [`CaptureConfig::resolve`]) and creates a manager.
    pub fn from_paths(adb_path: Option<PathBuf>, server_path: Option<PathBuf>) -> CaptureResult<Self> {
        let config = CaptureConfig::resolve(adb_path, server_path)?;
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Serials of connected, authorized devices.
    ///
    /// Empty when none are attached or the bridge tool fails.
    pub async fn connected_devices(&self) -> Vec<String> {
        let devices = self.bridge.list_devices().await;
        log::debug!("connected devices: {:?}", devices);
        devices
    }

    /// Returns the handle for `serial`, creating it on first use.
    ///
    /// A blank serial returns `None`.
    pub fn get_device(&mut self, serial: &str) -> Option<DeviceHandle> {
        let serial = serial.trim();
        if serial.is_empty() {
            return None;
        }
        let handle = self.devices.entry(serial.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(AndroidDevice::with_bridge(
                serial,
                self.bridge.clone(),
                self.config.clone(),
            )))
        });
        Some(handle.clone())
    }

    /// Whether the bridge tool runs and identifies itself.
    pub async fn is_bridge_available(&self) -> bool {
        self.bridge.is_available().await
    }

    /// Whether the mirror server payload exists on disk.
    pub fn is_server_available(&self) -> bool {
        self.config.server_path.is_file()
    }

    pub fn adb_path(&self) -> &Path {
        &self.config.adb_path
    }

    pub fn server_path(&self) -> &Path {
        &self.config.server_path
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}
