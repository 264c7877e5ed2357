//! In-memory record collection.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use streamlane_core::{EventRecord, EventSink, SubscriptionId};

/// Default number of records a [`RecordingSink`] keeps.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// A sink that keeps records for later inspection.
///
/// Records past the capacity are dropped. Intended for tests and debugging
/// sessions where the full record stream is asserted on.
pub struct RecordingSink {
    records: Mutex<Vec<(Instant, EventRecord)>>,
    arrived: Condvar,
    max_records: usize,
}

impl RecordingSink {
    /// Create a sink that keeps at most `max_records` records.
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            arrived: Condvar::new(),
            max_records,
        }
    }

    /// Get collected records.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records
            .lock()
            .iter()
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// Get collected records with their arrival time.
    pub fn timed_records(&self) -> Vec<(Instant, EventRecord)> {
        self.records.lock().clone()
    }

    /// Records of one subscription.
    pub fn for_subscription(&self, id: SubscriptionId) -> Vec<EventRecord> {
        self.records
            .lock()
            .iter()
            .filter(|(_, record)| record.subscription_id() == id)
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// One-line renderings of the collected records, in arrival order.
    pub fn lines(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|(_, record)| record.output_tldr())
            .collect()
    }

    /// Collected records as newline-delimited JSON.
    pub fn to_json_lines(&self) -> String {
        let records = self.records.lock();
        let mut output = String::new();
        for (_, record) in records.iter() {
            output.push_str(&serde_json::to_string(record).unwrap_or_default());
            output.push('\n');
        }
        output
    }

    /// Block until at least `count` records arrived or `timeout` elapsed.
    ///
    /// Returns `true` if the count was reached.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut records = self.records.lock();
        while records.len() < count {
            if self.arrived.wait_until(&mut records, deadline).timed_out() {
                return records.len() >= count;
            }
        }
        true
    }

    /// Clear collected records.
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Get record count.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventSink for RecordingSink {
    fn on_record(&self, record: &EventRecord) {
        let mut records = self.records.lock();
        if records.len() < self.max_records {
            records.push((Instant::now(), record.clone()));
            self.arrived.notify_all();
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

impl std::fmt::Debug for RecordingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSink")
            .field("len", &self.len())
            .field("max_records", &self.max_records)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use streamlane_core::{EventKind, format};

    fn record(kind: EventKind, id: SubscriptionId, payload: Option<&str>) -> EventRecord {
        format::<i32>(kind, id, Some("Lane"), "test", payload.map(str::to_string))
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::default();
        let id = SubscriptionId::next();

        sink.on_record(&record(EventKind::Value, id, Some("1")));
        sink.on_record(&record(EventKind::Completion, id, None));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.lines(), vec!["Output, Lane, 1", "Completed, Lane, "]);
        assert_eq!(sink.for_subscription(id).len(), 2);
        assert!(sink.for_subscription(SubscriptionId::next()).is_empty());
    }

    #[test]
    fn test_recording_sink_max_records() {
        let sink = RecordingSink::new(2);
        let id = SubscriptionId::next();

        for i in 0..5 {
            sink.on_record(&record(EventKind::Value, id, Some(&i.to_string())));
        }

        assert_eq!(sink.len(), 2);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_to_json_lines() {
        let sink = RecordingSink::default();
        let id = SubscriptionId::next();
        sink.on_record(&record(EventKind::Value, id, Some("7")));

        let json = sink.to_json_lines();
        let line = json.lines().next().unwrap();
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["lane"], "Lane");
        assert_eq!(value["payload"], "7");
        assert_eq!(value["kind"], "value");
    }

    #[test]
    fn test_wait_for_records_from_another_thread() {
        let sink = Arc::new(RecordingSink::default());
        let id = SubscriptionId::next();

        let writer = {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                sink.on_record(&record(EventKind::Cancelled, id, None));
            })
        };

        assert!(sink.wait_for(1, Duration::from_secs(5)));
        writer.join().unwrap();
        assert!(!sink.wait_for(2, Duration::from_millis(10)));
    }
}
