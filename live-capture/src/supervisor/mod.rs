//! Wiring between the producers and the single consumer.
//!
//! - [`controller`]: start, restore and stop sessions
//! - [`dispatcher`]: drain the status bus and own consumer-side state
//! - [`sink`]: where dispatched events are presented

pub mod controller;
pub mod dispatcher;
pub mod sink;

pub use controller::SessionController;
pub use dispatcher::Dispatcher;
pub use sink::{LogSink, SessionView, StatusSink};
