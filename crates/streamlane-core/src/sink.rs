//! The sink contract.
//!
//! A sink receives every record a lane produces. Delivery is synchronous and
//! fire-and-forget: there is no buffering, no retry and no timeout, so a slow
//! sink slows the pipeline it observes. A sink that panics is isolated at
//! the delivery boundary; the panic is logged and the record dropped, and the
//! stream's consumer still receives its event.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{Level, warn};

use crate::record::EventRecord;

/// Delivery target for lane records.
///
/// Called zero or more times per subscription, never concurrently for the
/// same subscription, possibly concurrently across subscriptions.
pub trait EventSink: Send + Sync {
    /// Called once per record.
    fn on_record(&self, record: &EventRecord);

    /// Sink name used in diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F> EventSink for F
where
    F: Fn(&EventRecord) + Send + Sync,
{
    fn on_record(&self, record: &EventRecord) {
        self(record)
    }

    fn name(&self) -> &'static str {
        "closure"
    }
}

/// A sink shared by every subscription of a lane.
pub type SharedSink = Arc<dyn EventSink>;

/// Deliver a record, isolating a panicking sink.
///
/// Returns `false` if the sink panicked.
pub fn deliver(sink: &dyn EventSink, record: &EventRecord) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| sink.on_record(record))) {
        Ok(()) => true,
        Err(_) => {
            warn!(
                sink = sink.name(),
                lane = record.lane(),
                subscription = %record.subscription_id(),
                kind = record.kind().as_str(),
                "Event sink panicked; record dropped"
            );
            false
        }
    }
}

/// The default sink: renders records as `tracing` events.
#[derive(Debug, Clone)]
pub struct TracingSink {
    level: Level,
}

impl TracingSink {
    /// Create a sink that logs at `DEBUG`.
    pub fn new() -> Self {
        Self {
            level: Level::DEBUG,
        }
    }

    /// Set the log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// The configured log level.
    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! lane_event {
    ($level:expr, $record:expr) => {
        tracing::event!(
            target: "streamlane",
            $level,
            lane = $record.lane(),
            subscription = %$record.subscription_id(),
            kind = $record.kind().as_str(),
            source = $record.source(),
            payload = $record.payload().unwrap_or(""),
            "{}",
            $record
        )
    };
}

impl EventSink for TracingSink {
    fn on_record(&self, record: &EventRecord) {
        if self.level == Level::ERROR {
            lane_event!(Level::ERROR, record);
        } else if self.level == Level::WARN {
            lane_event!(Level::WARN, record);
        } else if self.level == Level::INFO {
            lane_event!(Level::INFO, record);
        } else if self.level == Level::DEBUG {
            lane_event!(Level::DEBUG, record);
        } else {
            lane_event!(Level::TRACE, record);
        }
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::format;
    use crate::record::EventKind;
    use crate::registry::SubscriptionId;
    use parking_lot::Mutex;
    use std::io;

    fn value_record(payload: &str) -> EventRecord {
        format::<i32>(
            EventKind::Value,
            SubscriptionId::next(),
            Some("Lane"),
            "sink.rs",
            Some(payload.to_string()),
        )
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |record: &EventRecord| seen.lock().push(record.output_tldr())
        };

        assert!(deliver(&sink, &value_record("1")));
        assert_eq!(seen.lock().as_slice(), ["Output, Lane, 1"]);
        assert_eq!(sink.name(), "closure");
    }

    #[test]
    fn test_panicking_sink_is_isolated() {
        let sink = |record: &EventRecord| {
            if record.lane() == "Lane" {
                panic!("sink exploded");
            }
        };
        assert!(!deliver(&sink, &value_record("1")));
    }

    #[test]
    fn test_tracing_sink_writes_events() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let sink = TracingSink::new().with_level(Level::INFO);
            assert_eq!(sink.level(), Level::INFO);
            sink.on_record(&value_record("42"));
        });

        let output = String::from_utf8(buf.0.lock().clone()).unwrap();
        assert!(output.contains("INFO"));
        assert!(output.contains("Output, Lane, 42"));
        assert!(output.contains("kind="));
        assert!(output.contains("lane="));
    }
}
