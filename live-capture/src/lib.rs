//! live-capture library crate.
//!
//! Supervises many concurrent capture sessions, each wrapping one external
//! ffmpeg process, with per-session retry, live telemetry and graceful
//! shutdown. Sessions publish status events on the [`bus`]; a single
//! [`supervisor::Dispatcher`] consumes them.

pub mod bus;
pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod telemetry;
pub mod utils;

pub use error::{Error, Result};
