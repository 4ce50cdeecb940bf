use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use android_screen_capture::{
    AndroidDevice, CaptureConfig, CaptureError, CaptureResult, DeviceManager,
    HasRecoverySuggestion, Retryable,
};
use image::DynamicImage;

/// Android screenshots over adb:
/// - scrcpy mirror session when a frame is available
/// - `screencap` + `pull` fallback otherwise
#[derive(Parser, Debug)]
#[command(name = "droidcap")]
#[command(about = "📱 Capture screenshots from Android devices over adb")]
struct Args {
    /// Path to the adb executable
    #[arg(long, global = true, env = "DROIDCAP_ADB",
          help = "adb executable (default: next to droidcap, then PATH)")]
    adb: Option<PathBuf>,

    /// Path to the scrcpy-server payload
    #[arg(long, global = true, env = "DROIDCAP_SERVER",
          help = "scrcpy-server file (default: next to droidcap)")]
    server: Option<PathBuf>,

    /// Local port forwarded to the mirror server
    #[arg(long, global = true, default_value_t = android_screen_capture::config::DEFAULT_PORT)]
    port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List connected devices
    Devices {
        /// Print JSON instead of one serial per line
        #[arg(long)]
        json: bool,
    },
    /// Check that adb and scrcpy-server are usable
    Check,
    /// Capture one screenshot
    Capture {
        /// Output image path; the extension picks the format (png, jpg, bmp, gif)
        #[arg(default_value = "screenshot.png")]
        output: PathBuf,

        /// Device serial (default: first connected device)
        #[arg(short, long)]
        serial: Option<String>,
    },
    /// Keep a mirror session open and capture repeatedly
    Watch {
        /// Directory for numbered screenshots
        #[arg(default_value = "screenshots")]
        output_dir: PathBuf,

        /// Device serial (default: first connected device)
        #[arg(short, long)]
        serial: Option<String>,

        /// Number of screenshots to take
        #[arg(short, long, default_value_t = 5)]
        count: u32,

        /// Pause between screenshots
        #[arg(short, long, default_value = "1s",
              help = "Pause between captures: 500ms, 2s, 1m")]
        interval: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // Listing and checking work without the server payload.
    let config = match CaptureConfig::resolve(args.adb.clone(), args.server.clone()) {
        Ok(config) => config,
        Err(e) if matches!(args.command, Commands::Devices { .. } | Commands::Check) => {
            log::warn!("{}", e);
            let server = args.server.unwrap_or_else(|| CaptureConfig::default().server_path);
            CaptureConfig::resolve(args.adb, Some(server))?
        }
        Err(e) => return Err(e.into()),
    }
    .with_port(args.port);
    config.validate()?;
    let mut manager = DeviceManager::new(config);

    match args.command {
        Commands::Devices { json } => list_devices(&manager, json).await,
        Commands::Check => check(&manager).await,
        Commands::Capture { output, serial } => {
            let serial = pick_serial(&manager, serial).await?;
            let device = manager
                .get_device(&serial)
                .ok_or_else(|| anyhow!("Invalid device serial: {:?}", serial))?;
            let mut device = device.lock().await;
            let saved = capture_to_file(&mut device, &output)
                .await
                .map_err(report)?;
            println!("Saved {}", saved.display());
            Ok(())
        }
        Commands::Watch {
            output_dir,
            serial,
            count,
            interval,
        } => {
            let interval = parse_interval(&interval)?;
            let serial = pick_serial(&manager, serial).await?;
            watch(&mut manager, &serial, &output_dir, count, interval).await
        }
    }
}

async fn list_devices(manager: &DeviceManager, json: bool) -> Result<()> {
    let devices = manager.connected_devices().await;
    if json {
        println!("{}", serde_json::json!({ "devices": devices }));
    } else if devices.is_empty() {
        println!("No devices connected");
    } else {
        for serial in devices {
            println!("{}", serial);
        }
    }
    Ok(())
}

async fn check(manager: &DeviceManager) -> Result<()> {
    let adb_ok = manager.is_bridge_available().await;
    let server_ok = manager.is_server_available();
    println!(
        "adb:           {} ({})",
        if adb_ok { "ok" } else { "unavailable" },
        manager.adb_path().display()
    );
    println!(
        "scrcpy-server: {} ({})",
        if server_ok { "ok" } else { "missing" },
        manager.server_path().display()
    );
    if adb_ok && server_ok {
        Ok(())
    } else {
        Err(anyhow!("Required tools are not available"))
    }
}

async fn pick_serial(manager: &DeviceManager, serial: Option<String>) -> Result<String> {
    if let Some(serial) = serial {
        return Ok(serial);
    }
    manager
        .connected_devices()
        .await
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No devices connected"))
}

async fn watch(
    manager: &mut DeviceManager,
    serial: &str,
    output_dir: &Path,
    count: u32,
    interval: Duration,
) -> Result<()> {
    let device = manager
        .get_device(serial)
        .ok_or_else(|| anyhow!("Invalid device serial: {:?}", serial))?;
    let mut device = device.lock().await;

    println!("Device: {} ({})", device.name().await, serial);
    if !device.connect_persistent().await {
        println!("Mirror session unavailable, every capture will use screencap");
    }

    let mut result = Ok(());
    for index in 0..count {
        let path = output_dir.join(format!("{}_{:04}.png", serial.replace(':', "_"), index));
        match capture_frame(&mut device).await {
            Ok(image) => {
                let target = path.clone();
                tokio::task::spawn_blocking(move || {
                    android_screen_capture::capture::save_image(&image, &target)
                })
                .await
                .context("image encoder task panicked")??;
                println!("Saved {}", path.display());
            }
            Err(e) => {
                result = Err(report(e));
                break;
            }
        }
        if index + 1 < count {
            tokio::time::sleep(interval).await;
        }
    }

    device.disconnect().await;
    result
}

/// Delay before retry number `attempt + 1`, or `None` when `error` should be
/// reported instead.
fn next_retry(error: &CaptureError, attempt: usize) -> Option<Duration> {
    if !error.is_retryable() || attempt >= error.max_retries().unwrap_or(0) {
        return None;
    }
    Some(Duration::from_millis(error.retry_delay_ms().unwrap_or(0)))
}

async fn capture_to_file(device: &mut AndroidDevice, output: &Path) -> CaptureResult<PathBuf> {
    let mut attempt = 0;
    loop {
        match device.capture_screenshot_to_file(output).await {
            Ok(saved) => return Ok(saved),
            Err(e) => match next_retry(&e, attempt) {
                Some(delay) => {
                    println!("⚠️  {} (retrying in {}ms)", e, delay.as_millis());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}

/// One capture through the persistent session when it is open.
async fn capture_frame(device: &mut AndroidDevice) -> CaptureResult<DynamicImage> {
    let mut attempt = 0;
    loop {
        let captured = if device.is_mirror_connected() {
            device.capture_from_connected().await
        } else {
            device.capture_screenshot().await
        };
        match captured {
            Ok(image) => return Ok(image),
            Err(e) => match next_retry(&e, attempt) {
                Some(delay) => {
                    println!("⚠️  {} (retrying in {}ms)", e, delay.as_millis());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}

/// Prints the recovery hint, if any, and converts for `main`.
fn report(error: CaptureError) -> anyhow::Error {
    if let Some(suggestion) = error.recovery_suggestion() {
        println!("💡 {}", suggestion);
    }
    error.into()
}

/// Parse interval string like "500ms", "2s", "1m"
fn parse_interval(interval: &str) -> Result<Duration> {
    if let Ok(seconds) = interval.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let (num_str, unit) = match interval.strip_suffix("ms") {
        Some(num) => (num, "ms"),
        None => match interval.char_indices().last() {
            Some((at, _)) if at > 0 => interval.split_at(at),
            _ => return Err(anyhow!("Invalid interval format: {}", interval)),
        },
    };
    let num: u64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid number in interval: {}", num_str))?;

    match unit {
        "ms" => Ok(Duration::from_millis(num)),
        "s" => Ok(Duration::from_secs(num)),
        "m" => num
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| anyhow!("Interval too large: {}", interval)),
        _ => Err(anyhow!(
            "Invalid interval unit: {}. Use 'ms', 's' or 'm'",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_interval("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_interval("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_interval("1m").unwrap(), Duration::from_secs(60));
        assert!(parse_interval("1h").is_err());
        assert!(parse_interval("s").is_err());
        assert!(parse_interval("xs").is_err());
        assert!(parse_interval("").is_err());
    }

    #[test]
    fn test_parse_interval_rejects_odd_units_without_panicking() {
        assert!(parse_interval("5é").is_err());
        assert!(parse_interval("é").is_err());
        assert!(parse_interval("10秒").is_err());
        assert!(parse_interval(&format!("{}m", u64::MAX)).is_err());
        assert_eq!(
            parse_interval(&format!("{}m", u64::MAX / 60)).unwrap(),
            Duration::from_secs(u64::MAX / 60 * 60)
        );
    }

    #[test]
    fn test_next_retry_follows_error_kind() {
        let pipeline = CaptureError::pipeline("ABC123", "screencap failed");
        assert_eq!(next_retry(&pipeline, 0), Some(Duration::from_millis(1000)));
        assert_eq!(next_retry(&pipeline, 1), Some(Duration::from_millis(1000)));
        assert_eq!(next_retry(&pipeline, 2), None);

        let misuse = CaptureError::state("disconnected", "capture_from_connected", "connect first");
        assert_eq!(next_retry(&misuse, 0), None);

        let bad_path = CaptureError::validation("file_path", "must not be empty", "");
        assert_eq!(next_retry(&bad_path, 0), None);
    }

    #[test]
    fn test_cli_parses_watch() {
        let args = Args::try_parse_from([
            "droidcap", "watch", "out", "-s", "ABC123", "--count", "3", "--interval", "250ms",
        ])
        .unwrap();
        match args.command {
            Commands::Watch { serial, count, interval, .. } => {
                assert_eq!(serial.as_deref(), Some("ABC123"));
                assert_eq!(count, 3);
                assert_eq!(interval, "250ms");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
