//! # Configuration Module
//!
//! Tool paths, mirror session constants and timeouts.

pub mod config;

pub use config::{CaptureConfig, DEFAULT_PORT};
