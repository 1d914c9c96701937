//! CLI module - Command-line interface for the application.
//!
//! Provides commands for:
//! - `serve` - Serve health endpoints and collect pool metrics
//! - `health` - Print a one-shot health report
//! - `monitor` - Collect pool metrics only

pub mod args;

pub use args::{Cli, Commands};
