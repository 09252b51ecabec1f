//! Message transport to whatever drives the CLI.

pub mod framing;
pub mod stdio;

pub use stdio::{LineSink, StdoutSink};
