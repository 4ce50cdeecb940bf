//! # Android Screen Capture Library
//!
//! Screenshots from Android devices, driven through `adb` and the scrcpy
//! server.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `core`: Subprocess runner and the `adb` wrapper
//! - `mirror`: scrcpy server lifecycle and the forwarded video socket
//! - `session`: Per-device connection state
//! - `device`: Capture orchestration for one serial
//! - `capture`: Screencap fallback and image file output
//! - `manager`: Device enumeration and per-serial handles
//! - `config`: Tool paths, constants and timeouts
//!
//! ## Capture strategies
//!
//! 1. **Mirror stream**: push and launch the scrcpy server, forward its socket,
//!    read a frame. Frame decoding is not implemented yet, so this path always
//!    reports no frame.
//! 2. **Screencap**: render a PNG on the device, pull it, decode it.
//!
//! Mirror teardown is unconditional; the fallback runs whenever the mirror
//! path yields nothing.
//!
//! ## Example
//!
//! ```rust,no_run
//! use android_screen_capture::DeviceManager;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut manager = DeviceManager::from_paths(None, None)?;
//!     for serial in manager.connected_devices().await {
//!         if let Some(device) = manager.get_device(&serial) {
//!             let path = device
//!                 .lock()
//!                 .await
//!                 .capture_screenshot_to_file(format!("{serial}.png"))
//!                 .await?;
//!             println!("saved {}", path.display());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};

use image::DynamicImage;

pub mod capture;
pub mod config;
pub mod core;
pub mod device;
pub mod error;
pub mod manager;
pub mod mirror;
pub mod session;

/// Re-export error types for convenience
pub use error::{CaptureError, CaptureResult, HasRecoverySuggestion, Retryable};

pub use config::CaptureConfig;
pub use crate::core::{CommandResult, CommandRunner, ProcessRunner, SupervisorProcess};
pub use device::AndroidDevice;
pub use manager::{DeviceHandle, DeviceManager};
pub use session::{ConnectionPhase, ConnectionState};

/// Creates a [`DeviceManager`], resolving tool paths when not given.
pub fn create_device_manager(
    adb_path: Option<PathBuf>,
    server_path: Option<PathBuf>,
) -> CaptureResult<DeviceManager> {
    DeviceManager::from_paths(adb_path, server_path)
}

/// Captures from the first connected device.
///
/// `Ok(None)` when no device is connected.
pub async fn capture_from_first_device(
    manager: &mut DeviceManager,
) -> CaptureResult<Option<DynamicImage>> {
    let devices = manager.connected_devices().await;
    let Some(serial) = devices.first() else {
        log::info!("no connected devices");
        return Ok(None);
    };
    capture_from_device(manager, serial).await
}

/// Captures from the device with `serial`.
///
/// `Ok(None)` for a blank serial.
pub async fn capture_from_device(
    manager: &mut DeviceManager,
    serial: &str,
) -> CaptureResult<Option<DynamicImage>> {
    let Some(device) = manager.get_device(serial) else {
        return Ok(None);
    };
    let image = device.lock().await.capture_screenshot().await?;
    Ok(Some(image))
}

/// Captures from the first connected device and saves to `path`.
///
/// Returns the written path, or `None` when no device is connected.
pub async fn save_from_first_device(
    manager: &mut DeviceManager,
    path: impl AsRef<Path>,
) -> CaptureResult<Option<PathBuf>> {
    let devices = manager.connected_devices().await;
    let Some(serial) = devices.first() else {
        log::info!("no connected devices");
        return Ok(None);
    };
    let Some(device) = manager.get_device(serial) else {
        return Ok(None);
    };
    let saved = device.lock().await.capture_screenshot_to_file(path).await?;
    Ok(Some(saved))
}
