//! Event records reported to sinks.

use serde::{Deserialize, Serialize};

use crate::config::LaneType;
use crate::registry::SubscriptionId;

/// How a subscription ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndState {
    /// The upstream finished normally.
    Completed,
    /// The upstream failed with the given description.
    Error(String),
    /// The consumer cancelled before a natural end.
    Cancelled,
}

impl EndState {
    /// Get the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EndState::Completed => "completed",
            EndState::Error(_) => "error",
            EndState::Cancelled => "cancelled",
        }
    }
}

/// The lifecycle moment an [`EventRecord`] describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The subscription was established.
    SubscriptionBegin,
    /// The upstream emitted a value.
    Value,
    /// The upstream finished normally.
    Completion,
    /// The upstream failed.
    Error,
    /// The consumer cancelled.
    Cancelled,
    /// The subscription reached its terminal state.
    SubscriptionEnd(EndState),
}

impl EventKind {
    /// The filter category that controls this kind.
    pub fn lane_type(&self) -> LaneType {
        match self {
            EventKind::SubscriptionBegin | EventKind::SubscriptionEnd(_) => LaneType::Subscription,
            EventKind::Value | EventKind::Completion | EventKind::Error | EventKind::Cancelled => {
                LaneType::Event
            }
        }
    }

    /// Get the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SubscriptionBegin => "subscription_begin",
            EventKind::Value => "value",
            EventKind::Completion => "completion",
            EventKind::Error => "error",
            EventKind::Cancelled => "cancelled",
            EventKind::SubscriptionEnd(_) => "subscription_end",
        }
    }
}

/// One reportable moment of one subscription.
///
/// Records are built once by the formatter and handed to the sink by
/// reference; they are never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    subscription_id: SubscriptionId,
    lane: String,
    source: String,
    kind: EventKind,
    payload: Option<String>,
}

impl EventRecord {
    pub(crate) fn new(
        subscription_id: SubscriptionId,
        lane: String,
        source: String,
        kind: EventKind,
        payload: Option<String>,
    ) -> Self {
        Self {
            subscription_id,
            lane,
            source,
            kind,
            payload,
        }
    }

    /// The subscription this record belongs to.
    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// The lane name.
    pub fn lane(&self) -> &str {
        &self.lane
    }

    /// The caller-supplied source label.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The lifecycle moment.
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Formatted text for value and error records.
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// The end state, for `SubscriptionEnd` records.
    pub fn end_state(&self) -> Option<&EndState> {
        match &self.kind {
            EventKind::SubscriptionEnd(state) => Some(state),
            _ => None,
        }
    }

    /// Event type label: `Output`, `Completed`, `Error` or `Cancelled`.
    ///
    /// Returns `None` for lifecycle records.
    pub fn event_type(&self) -> Option<&'static str> {
        match self.kind {
            EventKind::Value => Some("Output"),
            EventKind::Completion => Some("Completed"),
            EventKind::Error => Some("Error"),
            EventKind::Cancelled => Some("Cancelled"),
            EventKind::SubscriptionBegin | EventKind::SubscriptionEnd(_) => None,
        }
    }

    /// Signpost label: `begin` or `end`.
    ///
    /// Returns `None` for event records.
    pub fn signpost_type(&self) -> Option<&'static str> {
        match self.kind {
            EventKind::SubscriptionBegin => Some("begin"),
            EventKind::SubscriptionEnd(_) => Some("end"),
            _ => None,
        }
    }

    /// One-line rendering, e.g. `Output, Lane, 42` or `Completed, Lane, `.
    pub fn output_tldr(&self) -> String {
        match (self.event_type(), &self.kind) {
            (Some(label), _) => {
                format!("{}, {}, {}", label, self.lane, self.payload().unwrap_or(""))
            }
            (None, EventKind::SubscriptionEnd(state)) => {
                format!("end, {}, {}", self.lane, state.as_str())
            }
            (None, _) => format!("begin, {}, {}", self.lane, self.source),
        }
    }
}

impl std::fmt::Display for EventRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.output_tldr())
    }
}
