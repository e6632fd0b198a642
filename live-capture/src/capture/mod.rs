//! Capture process management.
//!
//! - [`process_runner`]: launching and supervising one OS child process
//! - [`ffmpeg`]: the ffmpeg command line for a capture attempt

pub mod ffmpeg;
pub mod process_runner;

#[cfg(test)]
pub(crate) mod testing;

pub use ffmpeg::build_capture_command;
pub use process_runner::{CaptureCommand, CaptureProcess, ProcessRunner, SystemProcessRunner};
