//! # Mirror Module
//!
//! The scrcpy server running on the device and the video socket it exposes
//! through the forwarded port.

pub mod server;
pub mod stream;

pub use server::{MirrorServer, ServerHandle};
pub use stream::{DEVICE_INFO_LEN, VideoStream};
