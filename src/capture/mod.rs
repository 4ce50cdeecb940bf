// # Capture Module
//
// Capture strategies that do not need the mirror session, plus file output.

pub mod encode;
pub mod screencap;

pub use encode::{output_format_for, save_image};
pub use screencap::capture_via_file_pull;
