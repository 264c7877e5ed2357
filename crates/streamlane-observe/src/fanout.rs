//! Fan-out delivery to several sinks.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use streamlane_core::{EventRecord, EventSink, LaneFilter, SharedSink, deliver};

/// A sink that forwards each record to every registered sink.
///
/// Each registered sink has its own filter, applied on top of the lane's.
/// Sinks are isolated from each other: one panicking sink does not keep the
/// record from the rest.
#[derive(Default)]
pub struct SinkSet {
    sinks: RwLock<Vec<(SharedSink, LaneFilter)>>,
}

impl SinkSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink, builder style.
    pub fn with<S: EventSink + 'static>(self, sink: S) -> Self {
        self.add(Arc::new(sink));
        self
    }

    /// Add a sink that receives every record.
    pub fn add(&self, sink: SharedSink) {
        self.add_filtered(sink, LaneFilter::all());
    }

    /// Add a sink that only receives records of the filtered lane types.
    pub fn add_filtered(&self, sink: SharedSink, filter: LaneFilter) {
        debug!(sink = sink.name(), filter = %filter, "Sink added");
        self.sinks.write().push((sink, filter));
    }

    /// Remove all sinks.
    pub fn clear(&self) {
        self.sinks.write().clear();
    }

    /// Get sink count.
    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }
}

impl EventSink for SinkSet {
    fn on_record(&self, record: &EventRecord) {
        let sinks = self.sinks.read();
        let lane_type = record.kind().lane_type();
        for (sink, filter) in sinks.iter() {
            if filter.contains(lane_type) {
                deliver(sink.as_ref(), record);
            }
        }
    }

    fn name(&self) -> &'static str {
        "sink_set"
    }
}

impl std::fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&'static str> = self.sinks.read().iter().map(|(s, _)| s.name()).collect();
        f.debug_struct("SinkSet").field("sinks", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingSink;
    use streamlane_core::{EventKind, SubscriptionId, format};

    fn record(kind: EventKind) -> EventRecord {
        format::<i32>(kind, SubscriptionId::next(), Some("Lane"), "test", None)
    }

    #[test]
    fn test_sink_set_multiple_sinks() {
        let set = SinkSet::new();
        let first = Arc::new(RecordingSink::default());
        let second = Arc::new(RecordingSink::default());

        set.add(Arc::clone(&first) as SharedSink);
        set.add(Arc::clone(&second) as SharedSink);
        set.on_record(&record(EventKind::Completion));

        assert_eq!(set.len(), 2);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_sink_set_per_sink_filter() {
        let set = SinkSet::new();
        let lifecycle = Arc::new(RecordingSink::default());
        set.add_filtered(Arc::clone(&lifecycle) as SharedSink, LaneFilter::subscription());

        set.on_record(&record(EventKind::SubscriptionBegin));
        set.on_record(&record(EventKind::Completion));

        assert_eq!(lifecycle.len(), 1);
        assert_eq!(lifecycle.records()[0].signpost_type(), Some("begin"));
    }

    #[test]
    fn test_sink_set_isolates_panicking_sink() {
        let survivor = Arc::new(RecordingSink::default());
        let set = SinkSet::new().with(|record: &EventRecord| {
            if record.lane() == "Lane" {
                panic!("sink exploded");
            }
        });
        set.add(Arc::clone(&survivor) as SharedSink);

        set.on_record(&record(EventKind::Cancelled));
        assert_eq!(survivor.len(), 1);

        set.clear();
        assert!(set.is_empty());
    }
}
