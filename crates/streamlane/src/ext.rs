//! Extension methods for attaching lanes and consuming publishers.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use streamlane_core::{Demand, LaneConfig, Publisher};

use crate::consumer::{Cancellable, Completion, ForEach};
use crate::lane::Lane;

/// Adapters available on every [`Publisher`].
pub trait PublisherExt: Publisher + Sized {
    /// Attach a lane with default settings.
    ///
    /// The source label is the caller's location.
    #[track_caller]
    fn lane(self, name: impl Into<String>) -> Lane<Self>
    where
        Self::Output: fmt::Debug + 'static,
    {
        let config = LaneConfig::new(name).with_default_source(Location::caller());
        Lane::new(self, config)
    }

    /// Attach a lane with an explicit configuration.
    ///
    /// If the configuration has no source label, the caller's location is used.
    #[track_caller]
    fn lane_with(self, config: LaneConfig<Self::Output>) -> Lane<Self>
    where
        Self::Output: 'static,
    {
        Lane::new(self, config.with_default_source(Location::caller()))
    }

    /// Subscribe with unlimited demand, handing each value to `on_value`.
    fn for_each<F>(self, on_value: F) -> Cancellable
    where
        F: Fn(Self::Output) + Send + Sync + 'static,
        Self::Output: 'static,
        Self::Failure: 'static,
    {
        self.subscribe_with(ForEach::new(on_value))
    }

    /// Subscribe requesting only `demand` values up front.
    fn for_each_with_demand<F>(self, demand: Demand, on_value: F) -> Cancellable
    where
        F: Fn(Self::Output) + Send + Sync + 'static,
        Self::Output: 'static,
        Self::Failure: 'static,
    {
        self.subscribe_with(ForEach::new(on_value).with_demand(demand))
    }

    /// Subscribe with unlimited demand, observing values and completion.
    fn sink<F, C>(self, on_value: F, on_completion: C) -> Cancellable
    where
        F: Fn(Self::Output) + Send + Sync + 'static,
        C: FnOnce(Completion<Self::Failure>) + Send + 'static,
        Self::Output: 'static,
        Self::Failure: 'static,
    {
        self.subscribe_with(ForEach::new(on_value).with_completion(on_completion))
    }

    /// Subscribe a [`ForEach`] consumer, returning its handle.
    fn subscribe_with(self, consumer: ForEach<Self::Output, Self::Failure>) -> Cancellable
    where
        Self::Output: 'static,
        Self::Failure: 'static,
    {
        let consumer = Arc::new(consumer);
        let handle = consumer.handle();
        self.subscribe(consumer);
        handle
    }
}

impl<P: Publisher> PublisherExt for P {}
