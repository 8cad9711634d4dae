//! Capture pipeline: hands exchanges from request handlers to a single
//! background writer

mod handoff;
mod stats;
mod worker;

pub use handoff::{channel, HandOff, Inbox};
pub use stats::{CaptureSnapshot, CaptureStats};
pub use worker::CaptureWorker;
