//! Common test utilities for the capture library tests
//!
//! - `FakeAdb`: scripted `CommandRunner` standing in for the adb binary
//! - `FakeMirror`: local TCP listener standing in for the forwarded scrcpy socket

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use android_screen_capture::mirror::DEVICE_INFO_LEN;
use android_screen_capture::{
    AndroidDevice, CaptureConfig, CommandResult, CommandRunner, SupervisorProcess,
};
use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const SERIAL: &str = "ABC123";
pub const SHOT_WIDTH: u32 = 36;
pub const SHOT_HEIGHT: u32 = 64;

/// What the fake `pull` writes to the local destination.
#[derive(Debug, Clone, Copy)]
pub enum PullPayload {
    Png { width: u32, height: u32 },
    Garbage,
}

/// Failure switches and canned outputs for [`FakeAdb`].
#[derive(Debug, Clone)]
pub struct Script {
    pub fail_push: bool,
    pub fail_forward: bool,
    pub fail_spawn: bool,
    pub fail_screencap: bool,
    pub fail_pull: bool,
    pub fail_rm: bool,
    pub fail_devices: bool,
    pub pull_payload: PullPayload,
    pub devices_output: String,
    pub version_output: String,
    pub model: Option<String>,
    pub state: String,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            fail_push: false,
            fail_forward: false,
            fail_spawn: false,
            fail_screencap: false,
            fail_pull: false,
            fail_rm: false,
            fail_devices: false,
            pull_payload: PullPayload::Png {
                width: SHOT_WIDTH,
                height: SHOT_HEIGHT,
            },
            devices_output: format!("List of devices attached\n{}\tdevice\n", SERIAL),
            version_output: "Android Debug Bridge version 1.0.41\nVersion 34.0.5\n".to_string(),
            model: Some("Pixel 7".to_string()),
            state: "device".to_string(),
        }
    }
}

/// Scripted adb. Tracks the port forward and supervisor processes so tests can
/// assert nothing leaks.
#[derive(Default)]
pub struct FakeAdb {
    script: Mutex<Script>,
    calls: Mutex<Vec<Vec<String>>>,
    forward_active: AtomicBool,
    live_supervisors: Arc<AtomicUsize>,
    spawned: AtomicUsize,
    pulled: Mutex<Vec<PathBuf>>,
}

impl FakeAdb {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            ..Self::default()
        })
    }

    pub fn script(&self, update: impl FnOnce(&mut Script)) {
        update(&mut self.script.lock().unwrap());
    }

    /// Every invocation, including spawns, without the `-s <serial>` prefix.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls whose arguments start with `prefix`.
    pub fn count(&self, prefix: &[&str]) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.len() >= prefix.len() && call.iter().zip(prefix).all(|(a, b)| a == b))
            .count()
    }

    /// Port forwards created, excluding removals.
    pub fn forward_setups(&self) -> usize {
        self.count(&["forward"]) - self.count(&["forward", "--remove"])
    }

    pub fn forward_active(&self) -> bool {
        self.forward_active.load(Ordering::SeqCst)
    }

    pub fn live_supervisors(&self) -> usize {
        self.live_supervisors.load(Ordering::SeqCst)
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn pulled_paths(&self) -> Vec<PathBuf> {
        self.pulled.lock().unwrap().clone()
    }

    fn strip_serial(args: &[String]) -> Vec<String> {
        match args {
            [flag, _serial, rest @ ..] if flag == "-s" => rest.to_vec(),
            _ => args.to_vec(),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeAdb {
    async fn run(&self, _program: &Path, args: &[String]) -> CommandResult {
        let args = Self::strip_serial(args);
        self.calls.lock().unwrap().push(args.clone());
        let script = self.script.lock().unwrap().clone();
        let arg = |i: usize| args.get(i).map(String::as_str);

        match arg(0) {
            Some("push") if script.fail_push => {
                CommandResult::failed("adb: error: failed to copy 'scrcpy-server'")
            }
            Some("push") => CommandResult::ok("1 file pushed"),
            Some("forward") if arg(1) == Some("--remove") => {
                if self.forward_active.swap(false, Ordering::SeqCst) {
                    CommandResult::ok("")
                } else {
                    CommandResult::failed("adb: error: listener 'tcp:27183' not found")
                }
            }
            Some("forward") if script.fail_forward => {
                CommandResult::failed("adb: error: cannot bind listener")
            }
            Some("forward") => {
                self.forward_active.store(true, Ordering::SeqCst);
                CommandResult::ok("")
            }
            Some("shell") => match arg(1) {
                Some("screencap") if script.fail_screencap => {
                    CommandResult::failed("screencap: permission denied")
                }
                Some("rm") if script.fail_rm => CommandResult::failed("rm: read-only file system"),
                Some("getprop") => match &script.model {
                    Some(model) => CommandResult::ok(format!("{}\n", model)),
                    None => CommandResult::failed("error: device offline"),
                },
                _ => CommandResult::ok(""),
            },
            Some("pull") => {
                let Some(local) = arg(2).map(PathBuf::from) else {
                    return CommandResult::failed("adb: usage: pull REMOTE LOCAL");
                };
                self.pulled.lock().unwrap().push(local.clone());
                if script.fail_pull {
                    return CommandResult::failed("adb: error: remote object does not exist");
                }
                write_payload(&local, script.pull_payload);
                CommandResult::ok("1 file pulled")
            }
            Some("devices") if script.fail_devices => {
                CommandResult::failed("adb: cannot connect to daemon")
            }
            Some("devices") => CommandResult::ok(script.devices_output),
            Some("version") => CommandResult::ok(script.version_output),
            Some("get-state") => CommandResult::ok(format!("{}\n", script.state)),
            _ => CommandResult::failed(format!("unknown command: {:?}", args)),
        }
    }

    async fn spawn(&self, _program: &Path, args: &[String]) -> io::Result<Box<dyn SupervisorProcess>> {
        self.calls.lock().unwrap().push(Self::strip_serial(args));
        if self.script.lock().unwrap().fail_spawn {
            return Err(io::Error::new(io::ErrorKind::NotFound, "adb not found"));
        }
        self.spawned.fetch_add(1, Ordering::SeqCst);
        self.live_supervisors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSupervisor {
            live: self.live_supervisors.clone(),
            killed: false,
        }))
    }
}

fn write_payload(path: &Path, payload: PullPayload) {
    match payload {
        PullPayload::Png { width, height } => {
            RgbaImage::from_pixel(width, height, Rgba([20, 120, 220, 255]))
                .save_with_format(path, ImageFormat::Png)
                .unwrap();
        }
        PullPayload::Garbage => std::fs::write(path, b"definitely not an image").unwrap(),
    }
}

struct FakeSupervisor {
    live: Arc<AtomicUsize>,
    killed: bool,
}

#[async_trait]
impl SupervisorProcess for FakeSupervisor {
    fn id(&self) -> Option<u32> {
        (!self.killed).then_some(4242)
    }

    fn has_exited(&mut self) -> bool {
        self.killed
    }

    async fn kill(&mut self) -> io::Result<()> {
        if !self.killed {
            self.killed = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// How the fake mirror server treats accepted connections.
#[derive(Debug, Clone, Copy)]
pub enum MirrorBehavior {
    /// Send the device header and keep the socket open.
    SendHeader,
    /// Keep the socket open without sending anything.
    Silent,
    /// Close the socket right after accepting.
    CloseImmediately,
}

/// Local stand-in for the forwarded mirror socket.
pub struct FakeMirror {
    pub port: u16,
    task: JoinHandle<()>,
}

impl FakeMirror {
    pub async fn spawn(behavior: MirrorBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                match behavior {
                    MirrorBehavior::SendHeader => {
                        let _ = socket.write_all(&[0u8; DEVICE_INFO_LEN]).await;
                        open.push(socket);
                    }
                    MirrorBehavior::Silent => open.push(socket),
                    MirrorBehavior::CloseImmediately => drop(socket),
                }
            }
        });
        Self { port, task }
    }
}

impl Drop for FakeMirror {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub fn test_config(port: u16) -> CaptureConfig {
    CaptureConfig::new("adb", "/opt/scrcpy/scrcpy-server")
        .with_port(port)
        .with_settle_delay(Duration::ZERO)
        .with_stream_timeouts(Duration::from_millis(500), Duration::from_millis(300))
        .with_command_timeout(None)
}

pub fn device(adb: &Arc<FakeAdb>, port: u16) -> AndroidDevice {
    AndroidDevice::new(SERIAL, adb.clone(), Arc::new(test_config(port)))
}
