// # Screencap Fallback
//
// Captures a screenshot without the mirror server:
//
// ```text
// shell screencap -p <device png> ─▶ pull <device png> <local temp> ─▶ shell rm <device png>
//                                                   │
//                                                   ▼
//                                       decode ─▶ delete local temp
// ```
//
// The local temp file is a `tempfile::TempPath`, so it is deleted on every
// exit path, including a failed decode.

use std::path::PathBuf;

use image::{DynamicImage, ImageReader};
use tokio::task::spawn_blocking;

use crate::core::bridge::Bridge;
use crate::error::{CaptureError, CaptureResult};

/// Captures via `screencap` and `pull`.
///
/// Any failure is logged and yields `None`; this is the last-resort path.
pub async fn capture_via_file_pull(
    bridge: &Bridge,
    serial: &str,
    device_path: &str,
) -> Option<DynamicImage> {
    match pull_screenshot(bridge, serial, device_path).await {
        Ok(image) => {
            log::info!(
                "[{}] captured {}x{} via screencap",
                serial,
                image.width(),
                image.height()
            );
            Some(image)
        }
        Err(e) => {
            log::warn!("[{}] screencap fallback failed: {}", serial, e);
            None
        }
    }
}

/// Same as [`capture_via_file_pull`] but keeps the failure cause.
pub async fn pull_screenshot(
    bridge: &Bridge,
    serial: &str,
    device_path: &str,
) -> CaptureResult<DynamicImage> {
    let local = tempfile::Builder::new()
        .prefix("screenshot_")
        .suffix(".png")
        .tempfile()
        .map_err(|e| CaptureError::io("create screenshot temp file", e))?
        .into_temp_path();
    let local_path = local.to_string_lossy().into_owned();

    bridge
        .device_checked(serial, &["shell", "screencap", "-p", device_path])
        .await?;
    bridge
        .device_checked(serial, &["pull", device_path, &local_path])
        .await?;

    let cleanup = bridge.device(serial, &["shell", "rm", device_path]).await;
    if !cleanup.is_success() {
        log::debug!(
            "[{}] ignoring failure to remove {}: {}",
            serial,
            device_path,
            cleanup.error.trim()
        );
    }

    let path = local.to_path_buf();
    let image = spawn_blocking(move || decode_png(path)).await??;

    if let Err(e) = local.close() {
        log::debug!("ignoring failure to remove {}: {}", local_path, e);
    }
    Ok(image)
}

fn decode_png(path: PathBuf) -> CaptureResult<DynamicImage> {
    let reader = ImageReader::open(&path)
        .map_err(|e| CaptureError::io_at("open pulled screenshot", path.display().to_string(), e))?
        .with_guessed_format()
        .map_err(|e| CaptureError::io_at("read pulled screenshot", path.display().to_string(), e))?;
    Ok(reader.decode()?)
}
