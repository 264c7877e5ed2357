//! Streamlane Core - Lane instrumentation for reactive streams
//!
//! This crate provides the building blocks for attaching a named *lane* to a
//! reactive stream and reporting every lifecycle moment of every subscription
//! to an [`EventSink`]. It includes:
//!
//! - [`SubscriptionId`]: Process-wide subscription identity
//! - [`EventRecord`] and [`format`]: The record shape and its formatter
//! - [`LaneConfig`] and [`LaneFilter`]: Per-attachment configuration
//! - [`SubscriptionProbe`]: The per-subscription state machine
//! - [`Scheduler`]: Where deferred cancellation checks run
//! - [`Publisher`], [`Subscriber`], [`Subscription`]: The stream protocol
//!
//! Most users want the `streamlane` facade crate, which wraps publishers and
//! `futures` streams with a lane.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamlane_core::prelude::*;
//!
//! let config = Arc::new(
//!     LaneConfig::<i32>::new("Numbers")
//!         .with_filter(LaneFilter::event())
//!         .with_sink(|record: &EventRecord| println!("{record}")),
//! );
//!
//! let probe = SubscriptionProbe::new(&config);
//! probe.begin();
//! probe.on_value(&1);
//! probe.complete();
//! // Output, Numbers, 1
//! // Completed, Numbers,
//! ```
//!
//! # Record Ordering
//!
//! For each subscription a `SubscriptionBegin` record precedes every other
//! record, and at most one terminal report (completion, error or
//! cancellation) is made. Cancellation is never reported inline: it is
//! checked on the lane's [`Scheduler`] after the current dispatch turn, so a
//! completion racing the cancel wins. Decorators open a [`DispatchTurn`]
//! around every upstream signal they deliver; the default scheduler runs
//! cancellation checks when the outermost turn on that thread closes.

pub mod config;
pub mod error;
pub mod format;
pub mod probe;
pub mod reactive;
pub mod record;
pub mod registry;
pub mod scheduler;
pub mod sink;

// Re-export main types at crate root
pub use config::{FILTER_ENV_VAR, LaneConfig, LaneFilter, LaneType, location_label};
pub use error::{LaneError, Result};
pub use format::{DEFAULT_MAX_VALUE_LEN, ValueTransform, format, short_type_name, truncate};
pub use probe::{Phase, SubscriptionProbe};
pub use reactive::{Demand, Publisher, Subscriber, Subscription};
pub use record::{EndState, EventKind, EventRecord};
pub use registry::{SubscriptionId, next_id};
#[cfg(feature = "tokio")]
pub use scheduler::TokioScheduler;
pub use scheduler::{
    DispatchTurn, RunLoop, Scheduler, SharedScheduler, Task, ThreadScheduler, TurnScheduler,
    background_scheduler, default_scheduler,
};
pub use sink::{EventSink, SharedSink, TracingSink, deliver};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```ignore
/// use streamlane_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{LaneConfig, LaneFilter, LaneType};
    pub use crate::error::{LaneError, Result};
    pub use crate::format::ValueTransform;
    pub use crate::probe::{Phase, SubscriptionProbe};
    pub use crate::reactive::{Demand, Publisher, Subscriber, Subscription};
    pub use crate::record::{EndState, EventKind, EventRecord};
    pub use crate::registry::SubscriptionId;
    pub use crate::scheduler::{DispatchTurn, RunLoop, Scheduler};
    pub use crate::sink::{EventSink, TracingSink};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_end_to_end() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let records = Arc::clone(&records);
            move |record: &EventRecord| records.lock().push(record.to_string())
        };

        let run_loop = Arc::new(RunLoop::new());
        let config = Arc::new(
            LaneConfig::<String>::new("Test Subscription")
                .with_filter(LaneFilter::event())
                .with_transform(ValueTransform::display())
                .with_sink(sink)
                .with_shared_scheduler(run_loop.clone()),
        );

        // First subscription finishes.
        let first = SubscriptionProbe::new(&config);
        first.begin();
        first.on_value(&"Hello".to_string());
        first.complete();

        // Second subscription is cancelled.
        let second = Arc::new(SubscriptionProbe::new(&config));
        second.begin();
        second.on_value(&"World".to_string());
        second.schedule_cancel();
        run_loop.run_until_idle();

        assert!(first.id() < second.id());
        assert_eq!(
            *records.lock(),
            vec![
                "Output, Test Subscription, Hello",
                "Completed, Test Subscription, ",
                "Output, Test Subscription, World",
                "Cancelled, Test Subscription, ",
            ]
        );
    }
}
