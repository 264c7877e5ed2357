//! Streamlane Observability
//!
//! This crate provides sinks for lane records beyond the default
//! `tracing` sink, including:
//!
//! - [`RecordingSink`]: Keeps records in memory for inspection
//! - [`SinkSet`]: Fans records out to several sinks
//! - [`StatsSink`]: Per-lane counters
//!
//! # Recording
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamlane_core::LaneConfig;
//! use streamlane_observe::RecordingSink;
//!
//! let log = Arc::new(RecordingSink::default());
//! let config = LaneConfig::<i32>::new("Numbers").with_shared_sink(log.clone());
//! // ... run the stream ...
//! for line in log.lines() {
//!     println!("{line}");
//! }
//! ```
//!
//! # Fan-out
//!
//! ```ignore
//! use streamlane_core::{LaneFilter, TracingSink};
//! use streamlane_observe::{SinkSet, StatsSink};
//! use std::sync::Arc;
//!
//! let stats = Arc::new(StatsSink::new());
//! let sinks = SinkSet::new().with(TracingSink::new());
//! sinks.add_filtered(stats.clone(), LaneFilter::all());
//! ```

pub mod fanout;
pub mod recording;
pub mod stats;

// Re-export main types
pub use fanout::SinkSet;
pub use recording::{DEFAULT_CAPACITY, RecordingSink};
pub use stats::{LaneStats, StatsSink, StatsSnapshot};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::fanout::SinkSet;
    pub use crate::recording::RecordingSink;
    pub use crate::stats::{LaneStats, StatsSink, StatsSnapshot};
}
