//! Lane filter and configuration types.
//!
//! A [`LaneConfig`] is built once per attachment with `with_*` methods and
//! then shared read-only by every subscription created from that
//! attachment.

use std::fmt;
use std::panic::Location;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LaneError;
use crate::format::ValueTransform;
use crate::scheduler::{self, Scheduler, SharedScheduler};
use crate::sink::{EventSink, SharedSink, TracingSink};

/// Environment variable consulted by [`LaneFilter::from_env`].
pub const FILTER_ENV_VAR: &str = "STREAMLANE_FILTER";

/// Category of records a lane can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneType {
    /// Subscription lifecycle: begin and end signposts.
    Subscription,
    /// Per-value events: values, completion, errors, cancellation.
    Event,
}

impl LaneType {
    /// Every lane type.
    pub const ALL: [LaneType; 2] = [LaneType::Subscription, LaneType::Event];

    /// Get the type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneType::Subscription => "subscription",
            LaneType::Event => "event",
        }
    }
}

impl FromStr for LaneType {
    type Err = LaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subscription" => Ok(LaneType::Subscription),
            "event" => Ok(LaneType::Event),
            _ => Err(LaneError::InvalidFilter(s.to_string())),
        }
    }
}

/// Set of [`LaneType`]s that are reported for an attachment.
///
/// Records of a disabled category are never built, so their formatting cost
/// is not paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaneFilter {
    subscription: bool,
    event: bool,
}

impl LaneFilter {
    /// Report everything.
    pub const fn all() -> Self {
        Self {
            subscription: true,
            event: true,
        }
    }

    /// Report nothing.
    pub const fn none() -> Self {
        Self {
            subscription: false,
            event: false,
        }
    }

    /// Report only subscription begin/end signposts.
    pub const fn subscription() -> Self {
        Self {
            subscription: true,
            event: false,
        }
    }

    /// Report only per-value events.
    pub const fn event() -> Self {
        Self {
            subscription: false,
            event: true,
        }
    }

    /// Check whether a category is enabled.
    pub fn contains(&self, lane_type: LaneType) -> bool {
        match lane_type {
            LaneType::Subscription => self.subscription,
            LaneType::Event => self.event,
        }
    }

    /// Enable a category.
    pub fn with(mut self, lane_type: LaneType) -> Self {
        self.set(lane_type, true);
        self
    }

    /// Disable a category.
    pub fn without(mut self, lane_type: LaneType) -> Self {
        self.set(lane_type, false);
        self
    }

    /// Check if no category is enabled.
    pub fn is_empty(&self) -> bool {
        !self.subscription && !self.event
    }

    /// Read the filter from `STREAMLANE_FILTER`.
    ///
    /// Falls back to [`LaneFilter::all`] when the variable is unset or invalid.
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(FILTER_ENV_VAR).ok().as_deref())
    }

    /// Interpret a raw environment value the way [`from_env`](Self::from_env) does.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            None => Self::all(),
            Some(raw) => raw.parse().unwrap_or_else(|e: LaneError| {
                warn!(var = FILTER_ENV_VAR, value = raw, error = %e, "Ignoring invalid lane filter");
                Self::all()
            }),
        }
    }

    fn set(&mut self, lane_type: LaneType, enabled: bool) {
        match lane_type {
            LaneType::Subscription => self.subscription = enabled,
            LaneType::Event => self.event = enabled,
        }
    }
}

impl Default for LaneFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl From<LaneType> for LaneFilter {
    fn from(lane_type: LaneType) -> Self {
        Self::none().with(lane_type)
    }
}

impl FromIterator<LaneType> for LaneFilter {
    fn from_iter<I: IntoIterator<Item = LaneType>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), LaneFilter::with)
    }
}

impl FromStr for LaneFilter {
    type Err = LaneError;

    /// Parses `all`, `none`, or a comma separated list of lane types.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::all()),
            "none" | "" => Ok(Self::none()),
            list => list.split(',').map(str::parse::<LaneType>).collect(),
        }
    }
}

impl fmt::Display for LaneFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enabled: Vec<&str> = LaneType::ALL
            .iter()
            .filter(|t| self.contains(**t))
            .map(LaneType::as_str)
            .collect();

        if enabled.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&enabled.join(","))
        }
    }
}

/// Configuration for one lane attachment.
///
/// The filter starts from [`LaneFilter::from_env`], so `STREAMLANE_FILTER`
/// sets the default for every lane that does not choose its own.
///
/// # Example
///
/// ```ignore
/// use streamlane_core::{LaneConfig, LaneFilter, ValueTransform};
///
/// let config = LaneConfig::<String>::new("Search results")
///     .with_filter(LaneFilter::event())
///     .with_transform(ValueTransform::display());
/// ```
pub struct LaneConfig<T> {
    name: Option<String>,
    filter: LaneFilter,
    source: Option<String>,
    transform: ValueTransform<T>,
    sink: SharedSink,
    scheduler: Option<SharedScheduler>,
}

impl<T: fmt::Debug + 'static> LaneConfig<T> {
    /// Create a configuration for a named lane with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::default().with_name(name)
    }
}

impl<T: fmt::Debug + 'static> Default for LaneConfig<T> {
    fn default() -> Self {
        Self::from_transform(ValueTransform::debug())
    }
}

impl<T: 'static> LaneConfig<T> {
    /// Create an unnamed configuration with an explicit value transform.
    ///
    /// Use this for output types without a `Debug` implementation.
    pub fn from_transform(transform: ValueTransform<T>) -> Self {
        Self {
            name: None,
            filter: LaneFilter::from_env(),
            source: None,
            transform,
            sink: Arc::new(TracingSink::new()),
            scheduler: None,
        }
    }

    /// Set the lane name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the filter.
    pub fn with_filter(mut self, filter: impl Into<LaneFilter>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Set the source label.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the source label from a caller location, unless one is already set.
    pub fn with_default_source(mut self, location: &Location<'_>) -> Self {
        if self.source.is_none() {
            self.source = Some(location_label(location));
        }
        self
    }

    /// Set the value transform.
    pub fn with_transform(mut self, transform: ValueTransform<T>) -> Self {
        self.transform = transform;
        self
    }

    /// Render values with a closure. No truncation is applied.
    pub fn with_transform_fn<F>(self, f: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.with_transform(ValueTransform::custom(f))
    }

    /// Set the sink records are delivered to.
    pub fn with_sink<S: EventSink + 'static>(self, sink: S) -> Self {
        self.with_shared_sink(Arc::new(sink))
    }

    /// Set a shared sink.
    pub fn with_shared_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Set the scheduler that runs deferred cancellation checks.
    pub fn with_scheduler<S: Scheduler + 'static>(self, scheduler: S) -> Self {
        self.with_shared_scheduler(Arc::new(scheduler))
    }

    /// Set a shared scheduler.
    pub fn with_shared_scheduler(mut self, scheduler: SharedScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

impl<T> LaneConfig<T> {
    /// The configured lane name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The filter.
    pub fn filter(&self) -> LaneFilter {
        self.filter
    }

    /// The source label, or an empty string.
    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or("")
    }

    /// The value transform.
    pub fn transform(&self) -> &ValueTransform<T> {
        &self.transform
    }

    /// The sink.
    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    /// The scheduler for deferred work.
    ///
    /// Without an explicit scheduler this is the turn-bound default, see
    /// [`scheduler::default_scheduler`].
    pub fn scheduler(&self) -> SharedScheduler {
        match &self.scheduler {
            Some(scheduler) => Arc::clone(scheduler),
            None => scheduler::default_scheduler(),
        }
    }
}

impl<T> Clone for LaneConfig<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            filter: self.filter,
            source: self.source.clone(),
            transform: self.transform.clone(),
            sink: Arc::clone(&self.sink),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T> fmt::Debug for LaneConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaneConfig")
            .field("name", &self.name)
            .field("filter", &self.filter)
            .field("source", &self.source)
            .field("sink", &self.sink.name())
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

/// Render a caller location as `file:line:column`, keeping only the file name.
pub fn location_label(location: &Location<'_>) -> String {
    let file = location
        .file()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(location.file());
    format!("{}:{}:{}", file, location.line(), location.column())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EventRecord;

    #[test]
    fn test_filter_presets() {
        assert!(LaneFilter::all().contains(LaneType::Subscription));
        assert!(LaneFilter::all().contains(LaneType::Event));
        assert!(LaneFilter::none().is_empty());
        assert!(!LaneFilter::event().contains(LaneType::Subscription));
        assert!(!LaneFilter::subscription().contains(LaneType::Event));
        assert_eq!(LaneFilter::default(), LaneFilter::all());
    }

    #[test]
    fn test_filter_from_lane_types() {
        assert_eq!(LaneFilter::from(LaneType::Event), LaneFilter::event());

        let both: LaneFilter = LaneType::ALL.into_iter().collect();
        assert_eq!(both, LaneFilter::all());

        let only_sub = LaneFilter::all().without(LaneType::Event);
        assert_eq!(only_sub, LaneFilter::subscription());
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("all".parse::<LaneFilter>().unwrap(), LaneFilter::all());
        assert_eq!("none".parse::<LaneFilter>().unwrap(), LaneFilter::none());
        assert_eq!("Event".parse::<LaneFilter>().unwrap(), LaneFilter::event());
        assert_eq!(
            "subscription, event".parse::<LaneFilter>().unwrap(),
            LaneFilter::all()
        );

        let err = "events,bogus".parse::<LaneFilter>().unwrap_err();
        assert!(matches!(err, LaneError::InvalidFilter(_)));
    }

    #[test]
    fn test_filter_display_round_trip() {
        for filter in [
            LaneFilter::all(),
            LaneFilter::none(),
            LaneFilter::event(),
            LaneFilter::subscription(),
        ] {
            assert_eq!(filter.to_string().parse::<LaneFilter>().unwrap(), filter);
        }
    }

    #[test]
    fn test_filter_from_env_value() {
        assert_eq!(LaneFilter::from_env_value(None), LaneFilter::all());
        assert_eq!(LaneFilter::from_env_value(Some("event")), LaneFilter::event());
        assert_eq!(LaneFilter::from_env_value(Some("garbage")), LaneFilter::all());
    }

    #[test]
    fn test_lane_config_builder() {
        let config = LaneConfig::<u32>::new("Numbers")
            .with_filter(LaneType::Subscription)
            .with_source("main.rs:10:5")
            .with_transform_fn(|n| format!("#{}", n))
            .with_sink(|_: &EventRecord| {});

        assert_eq!(config.name(), Some("Numbers"));
        assert_eq!(config.filter(), LaneFilter::subscription());
        assert_eq!(config.source(), "main.rs:10:5");
        assert_eq!(config.transform().apply(&3), "#3");
    }

    #[test]
    fn test_default_source_only_fills_gaps() {
        let here = Location::caller();

        let config = LaneConfig::<u8>::default().with_default_source(here);
        assert!(config.source().starts_with("config.rs:"));

        let config = LaneConfig::<u8>::default()
            .with_source("explicit")
            .with_default_source(here);
        assert_eq!(config.source(), "explicit");
    }

    #[test]
    fn test_non_debug_output_type() {
        struct Opaque;

        let config = LaneConfig::<Opaque>::from_transform(ValueTransform::constant("opaque"));
        assert_eq!(config.name(), None);
        assert_eq!(config.transform().apply(&Opaque), "opaque");
    }
}
