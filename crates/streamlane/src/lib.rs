//! # Streamlane - Lane Instrumentation for Reactive Streams
//!
//! Streamlane attaches a named *lane* to a stream pipeline. Every subscription
//! to the instrumented stream is reported to a sink: when it begins, each value
//! it emits, and how it ends (completion, failure or cancellation). The stream
//! itself is left untouched; consumers see exactly what they saw before.
//!
//! ## Features
//!
//! - **Transparent**: Values, failures and demand pass through unmodified
//! - **Per-subscription identity**: Every subscription gets a process-wide id
//! - **Filterable**: Report lifecycle records, value records, or both
//! - **Pluggable sinks**: `tracing` by default, any closure or [`EventSink`]
//! - **Two stream models**: [`Publisher`]s and `futures` [`Stream`]s
//!
//! ## Quick Start
//!
//! ```ignore
//! use streamlane::prelude::*;
//!
//! let handle = Sequence::new(vec![1, 2, 3])
//!     .lane("Numbers")
//!     .for_each(|n| println!("got {n}"));
//! ```
//!
//! With an explicit configuration:
//!
//! ```ignore
//! use streamlane::prelude::*;
//!
//! let log = Arc::new(RecordingSink::default());
//! let subject = CurrentValueSubject::<String, String>::new(String::new());
//!
//! let _handle = subject
//!     .clone()
//!     .lane_with(
//!         LaneConfig::new("Search")
//!             .with_filter(LaneFilter::event())
//!             .with_transform(ValueTransform::display())
//!             .with_shared_sink(log.clone()),
//!     )
//!     .for_each(|_| {});
//!
//! subject.send("rust".to_string());
//! assert_eq!(log.lines().last().unwrap(), "Output, Search, rust");
//! ```
//!
//! ## Streams
//!
//! ```ignore
//! use futures_util::StreamExt;
//! use streamlane::LaneStreamExt;
//!
//! let items: Vec<i32> = futures_util::stream::iter(vec![1, 2, 3])
//!     .lane("Numbers")
//!     .collect()
//!     .await;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Your Application                     │
//! ├─────────────────────────────────────────────────────────┤
//! │                  streamlane (facade)                    │
//! │        Lane · LaneStream · PublisherExt · publishers    │
//! ├────────────────────────────┬────────────────────────────┤
//! │     streamlane-core        │    streamlane-observe      │
//! │ (records, probe, filter,   │ (recording, fan-out,       │
//! │  schedulers, tracing sink) │  statistics sinks)         │
//! └────────────────────────────┴────────────────────────────┘
//! ```
//!
//! [`Stream`]: futures_util::Stream

pub mod consumer;
pub mod ext;
pub mod lane;
pub mod publishers;
pub mod stream;

// Re-export from sub-crates
pub use streamlane_core;
pub use streamlane_observe;

pub use consumer::{Cancellable, Completion, ForEach};
pub use ext::PublisherExt;
pub use lane::Lane;
pub use publishers::{CurrentValueSubject, Fail, PassthroughSubject, Sequence, empty, just};
pub use stream::{LaneStream, LaneStreamExt};

pub use streamlane_core::{
    Demand, EndState, EventKind, EventRecord, EventSink, LaneConfig, LaneError, LaneFilter,
    LaneType, Publisher, Result, Subscriber, Subscription, SubscriptionId, TracingSink,
    ValueTransform,
};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```ignore
/// use streamlane::prelude::*;
/// ```
pub mod prelude {
    // Main types
    pub use crate::{
        Cancellable, Completion, CurrentValueSubject, Fail, Lane, LaneStream, LaneStreamExt,
        PassthroughSubject, PublisherExt, Sequence, empty, just,
    };

    // Core types
    pub use streamlane_core::{
        Demand, EndState, EventKind, EventRecord, EventSink, LaneConfig, LaneFilter, LaneType,
        Publisher, RunLoop, Scheduler, Subscriber, Subscription, SubscriptionId, TracingSink,
        ValueTransform,
    };

    // Observability types
    pub use streamlane_observe::{RecordingSink, SinkSet, StatsSink};

    // Common std types
    pub use std::sync::Arc;
}
