//! # Core Module
//!
//! Subprocess execution and the bridge tool wrapper every other component
//! builds on.

pub mod bridge;
pub mod command;

pub use bridge::{Bridge, parse_device_list};
pub use command::{CommandResult, CommandRunner, ProcessRunner, SupervisorProcess};
