//! # rtcbridge Diagnostics
//!
//! Stats report rendering and structured logging setup for rtcbridge.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod stats;

// Re-export main types
pub use debug_logger::{DebugLogger, DEFAULT_LOG_FILTER};
pub use stats::{stats_entry, stats_to_json};
