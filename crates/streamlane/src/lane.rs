//! The lane decorator for publishers.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use streamlane_core::{
    Demand, DispatchTurn, LaneConfig, Publisher, Subscriber, Subscription, SubscriptionId,
    SubscriptionProbe, short_type_name,
};

/// A publisher that reports the lifecycle of every subscription to a sink.
///
/// `Lane` re-exposes the upstream's output and failure types unchanged and
/// forwards every signal unmodified. Each subscription gets its own id and
/// its own [`SubscriptionProbe`].
///
/// Subscribing, requesting and every upstream signal run inside a
/// [`DispatchTurn`], so a consumer that cancels mid-turn has its
/// cancellation checked only after the upstream is done with that turn.
pub struct Lane<P: Publisher> {
    upstream: P,
    config: Arc<LaneConfig<P::Output>>,
}

impl<P: Publisher> Lane<P> {
    /// Attach a lane to `upstream`.
    pub fn new(upstream: P, config: LaneConfig<P::Output>) -> Self {
        debug!(
            lane = config.name().unwrap_or("<unnamed>"),
            filter = %config.filter(),
            source = config.source(),
            "Lane attached"
        );
        Self {
            upstream,
            config: Arc::new(config),
        }
    }

    /// The lane configuration shared by all subscriptions.
    pub fn config(&self) -> &Arc<LaneConfig<P::Output>> {
        &self.config
    }

    /// The decorated publisher.
    pub fn upstream(&self) -> &P {
        &self.upstream
    }

    /// Detach the lane, returning the decorated publisher.
    pub fn into_inner(self) -> P {
        self.upstream
    }
}

impl<P> Publisher for Lane<P>
where
    P: Publisher,
    P::Output: 'static,
    P::Failure: fmt::Display + 'static,
{
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Self::Output, Self::Failure>>) {
        let id = SubscriptionId::next();
        let probe = Arc::new(SubscriptionProbe::with_id(&self.config, id));

        let _turn = DispatchTurn::enter();
        let inner = LaneSubscriber {
            probe,
            downstream: subscriber,
        };
        self.upstream.subscribe(Arc::new(inner));
    }
}

impl<P: Publisher> fmt::Debug for Lane<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lane")
            .field("upstream", &short_type_name::<P>())
            .field("config", &self.config)
            .finish()
    }
}

/// The subscriber a lane hands to its upstream.
struct LaneSubscriber<T, E> {
    probe: Arc<SubscriptionProbe<T>>,
    downstream: Arc<dyn Subscriber<T, E>>,
}

impl<T: 'static, E: fmt::Display + 'static> Subscriber<T, E> for LaneSubscriber<T, E> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let proxy = LaneSubscription {
            upstream: subscription,
            probe: Arc::clone(&self.probe),
            _config: self.probe.config(),
        };
        let _turn = DispatchTurn::enter();
        self.downstream.on_subscribe(Arc::new(proxy));
        self.probe.begin();
    }

    fn on_value(&self, value: T) -> Demand {
        let _turn = DispatchTurn::enter();
        if self.probe.on_value(&value) {
            self.downstream.on_value(value)
        } else {
            Demand::NONE
        }
    }

    fn on_complete(&self) {
        let _turn = DispatchTurn::enter();
        if self.probe.complete() {
            self.downstream.on_complete();
        }
    }

    fn on_error(&self, error: E) {
        let _turn = DispatchTurn::enter();
        if self.probe.fail(&error) {
            self.downstream.on_error(error);
        }
    }
}

/// The subscription a lane hands to its consumer.
///
/// Holds the lane configuration alive for as long as the consumer keeps the
/// subscription.
struct LaneSubscription<T> {
    upstream: Arc<dyn Subscription>,
    probe: Arc<SubscriptionProbe<T>>,
    _config: Option<Arc<LaneConfig<T>>>,
}

impl<T: 'static> Subscription for LaneSubscription<T> {
    fn request(&self, demand: Demand) {
        let _turn = DispatchTurn::enter();
        self.upstream.request(demand);
    }

    fn cancel(&self) {
        self.upstream.cancel();
        self.probe.schedule_cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::PublisherExt;
    use crate::publishers::{PassthroughSubject, Sequence};
    use parking_lot::Mutex;
    use std::thread;
    use std::time::Duration;
    use streamlane_core::{EventRecord, EventSink, LaneFilter, RunLoop};
    use streamlane_observe::RecordingSink;

    fn lane_config(log: &Arc<RecordingSink>, run_loop: &Arc<RunLoop>) -> LaneConfig<i32> {
        LaneConfig::new("Test Subscription")
            .with_filter(LaneFilter::all())
            .with_shared_sink(log.clone())
            .with_shared_scheduler(run_loop.clone())
    }

    #[test]
    fn test_lane_reports_begin_before_values() {
        let log = Arc::new(RecordingSink::default());
        let run_loop = Arc::new(RunLoop::new());
        let lane = Lane::new(Sequence::new(vec![1, 2]), lane_config(&log, &run_loop));

        let _handle = (&lane).for_each(|_| {});

        let kinds: Vec<String> = log
            .records()
            .iter()
            .map(|r: &EventRecord| r.kind().as_str().to_string())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "subscription_begin",
                "value",
                "value",
                "completion",
                "subscription_end"
            ]
        );
    }

    #[test]
    fn test_lane_forwards_demand_untouched() {
        let log = Arc::new(RecordingSink::default());
        let run_loop = Arc::new(RunLoop::new());
        let lane = Lane::new(
            Sequence::new(vec![1, 2, 3]),
            lane_config(&log, &run_loop).with_filter(LaneFilter::event()),
        );

        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let handle = {
            let received = Arc::clone(&received);
            (&lane).for_each_with_demand(Demand::max(2), move |v| received.lock().push(v))
        };

        assert_eq!(*received.lock(), vec![1, 2]);
        assert_eq!(
            log.lines(),
            vec!["Output, Test Subscription, 1", "Output, Test Subscription, 2"]
        );

        handle.request(Demand::max(5));
        assert_eq!(*received.lock(), vec![1, 2, 3]);
        assert_eq!(log.lines().last().map(String::as_str), Some("Completed, Test Subscription, "));
    }

    #[test]
    fn test_lane_config_outlives_publisher_while_subscribed() {
        let log = Arc::new(RecordingSink::default());
        let run_loop = Arc::new(RunLoop::new());
        let subject = PassthroughSubject::<i32, String>::new();
        let lane = Lane::new(
            subject.clone(),
            lane_config(&log, &run_loop).with_filter(LaneFilter::event()),
        );

        let handle = (&lane).for_each(|_| {});
        drop(lane);

        subject.send(5);
        drop(handle);
        run_loop.run_until_idle();

        assert_eq!(
            log.lines(),
            vec!["Output, Test Subscription, 5", "Cancelled, Test Subscription, "]
        );
    }

    struct Idle;

    impl Subscription for Idle {
        fn request(&self, _demand: Demand) {}

        fn cancel(&self) {}
    }

    /// Emits `1`, keeps working, then completes, all within one subscribe call.
    struct EmitThenComplete {
        busy_for: Duration,
    }

    impl Publisher for EmitThenComplete {
        type Output = i32;
        type Failure = String;

        fn subscribe(&self, subscriber: Arc<dyn Subscriber<i32, String>>) {
            subscriber.on_subscribe(Arc::new(Idle));
            subscriber.on_value(1);
            thread::sleep(self.busy_for);
            subscriber.on_complete();
        }
    }

    /// Cancels its subscription from inside the first `on_value`.
    #[derive(Default)]
    struct CancelOnFirstValue {
        subscription: Mutex<Option<Arc<dyn Subscription>>>,
        values: Mutex<Vec<i32>>,
    }

    impl Subscriber<i32, String> for CancelOnFirstValue {
        fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
            subscription.request(Demand::Unlimited);
            *self.subscription.lock() = Some(subscription);
        }

        fn on_value(&self, value: i32) -> Demand {
            self.values.lock().push(value);
            let subscription = self.subscription.lock().take();
            if let Some(subscription) = subscription {
                subscription.cancel();
            }
            Demand::NONE
        }

        fn on_complete(&self) {}

        fn on_error(&self, _error: String) {}
    }

    fn default_scheduled(log: &Arc<RecordingSink>) -> LaneConfig<i32> {
        LaneConfig::new("L")
            .with_filter(LaneFilter::event())
            .with_shared_sink(log.clone())
    }

    #[test]
    fn test_completion_in_same_turn_wins_over_cancel() {
        let log = Arc::new(RecordingSink::default());
        let lane = Lane::new(
            EmitThenComplete {
                busy_for: Duration::from_millis(50),
            },
            default_scheduled(&log),
        );

        let consumer = Arc::new(CancelOnFirstValue::default());
        lane.subscribe(consumer.clone());

        assert_eq!(*consumer.values.lock(), vec![1]);
        assert_eq!(log.lines(), vec!["Output, L, 1", "Completed, L, "]);

        // Nothing is left pending to report a cancellation later.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(log.lines(), vec!["Output, L, 1", "Completed, L, "]);
    }

    #[test]
    fn test_cancel_mid_turn_is_reported_when_turn_ends() {
        let log = Arc::new(RecordingSink::default());
        let subject = PassthroughSubject::<i32, String>::new();
        let lane = Lane::new(subject.clone(), default_scheduled(&log));

        let consumer = Arc::new(CancelOnFirstValue::default());
        lane.subscribe(consumer.clone());

        subject.send(1);
        assert_eq!(log.lines(), vec!["Output, L, 1", "Cancelled, L, "]);

        subject.send(2);
        subject.send_completion(crate::Completion::Finished);
        assert_eq!(*consumer.values.lock(), vec![1]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_sink_feeding_its_own_lane() {
        let subject = PassthroughSubject::<i32, String>::new();
        let log = Arc::new(RecordingSink::default());
        let sink = {
            let subject = subject.clone();
            let log = Arc::clone(&log);
            move |record: &EventRecord| {
                log.on_record(record);
                if record.payload() == Some("1") {
                    subject.send(2);
                }
            }
        };
        let lane = Lane::new(
            subject.clone(),
            LaneConfig::new("L")
                .with_filter(LaneFilter::event())
                .with_sink(sink),
        );

        let received = Arc::new(Mutex::new(Vec::new()));
        let _handle = {
            let received = Arc::clone(&received);
            (&lane).for_each(move |v| received.lock().push(v))
        };

        subject.send(1);

        let mut values = received.lock().clone();
        values.sort();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(log.lines(), vec!["Output, L, 1", "Output, L, 2"]);
    }
}
