//! Small reference publishers.
//!
//! These exist so lanes can be attached to something without pulling in a
//! full reactive library: an iterator-backed [`Sequence`], the [`Fail`]
//! publisher, and two subjects that are driven imperatively.

use std::convert::Infallible;
use std::fmt;
use std::iter::Peekable;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use streamlane_core::{Demand, Publisher, Subscriber, Subscription};

use crate::consumer::Completion;

/// A subscription with nothing to deliver.
struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, _demand: Demand) {}

    fn cancel(&self) {}
}

/// Publishes the items of an iterable, then completes.
///
/// Every subscription iterates its own clone of the items and honors demand.
/// Completion is sent as soon as the items run out, without waiting for
/// further demand.
#[derive(Debug, Clone)]
pub struct Sequence<I> {
    items: I,
}

impl<I> Sequence<I>
where
    I: IntoIterator + Clone,
{
    /// Publish `items`.
    pub fn new(items: I) -> Self {
        Self { items }
    }
}

/// Publish a single value, then complete.
pub fn just<T: Clone>(value: T) -> Sequence<Option<T>> {
    Sequence::new(Some(value))
}

/// Complete without publishing anything.
pub fn empty<T: Clone>() -> Sequence<Option<T>> {
    Sequence::new(None)
}

impl<I> Publisher for Sequence<I>
where
    I: IntoIterator + Clone,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    type Output = I::Item;
    type Failure = Infallible;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Self::Output, Self::Failure>>) {
        let subscription = Arc::new(SequenceSubscription {
            state: Mutex::new(SequenceState {
                iter: Some(self.items.clone().into_iter().peekable()),
                subscriber: Some(Arc::clone(&subscriber)),
                demand: Demand::NONE,
                draining: false,
            }),
        });
        subscriber.on_subscribe(subscription);
    }
}

struct SequenceState<It: Iterator> {
    iter: Option<Peekable<It>>,
    subscriber: Option<Arc<dyn Subscriber<It::Item, Infallible>>>,
    demand: Demand,
    draining: bool,
}

struct SequenceSubscription<It: Iterator> {
    state: Mutex<SequenceState<It>>,
}

enum Step<T> {
    Deliver(Arc<dyn Subscriber<T, Infallible>>, T),
    Finish(Arc<dyn Subscriber<T, Infallible>>),
    Idle,
}

impl<It> SequenceSubscription<It>
where
    It: Iterator,
{
    fn next_step(state: &mut SequenceState<It>) -> Step<It::Item> {
        let Some(subscriber) = state.subscriber.clone() else {
            return Step::Idle;
        };
        let Some(iter) = state.iter.as_mut() else {
            return Step::Idle;
        };
        if iter.peek().is_none() {
            state.iter = None;
            state.subscriber = None;
            return Step::Finish(subscriber);
        }
        if !state.demand.take_one() {
            return Step::Idle;
        }
        match iter.next() {
            Some(item) => Step::Deliver(subscriber, item),
            None => Step::Idle,
        }
    }
}

impl<It> Subscription for SequenceSubscription<It>
where
    It: Iterator + Send,
    It::Item: Send,
{
    fn request(&self, demand: Demand) {
        {
            let mut state = self.state.lock();
            state.demand += demand;
            // A reentrant request only adds demand; the running loop delivers.
            if state.draining {
                return;
            }
            state.draining = true;
        }

        loop {
            let step = Self::next_step(&mut self.state.lock());
            match step {
                Step::Deliver(subscriber, item) => {
                    let more = subscriber.on_value(item);
                    self.state.lock().demand += more;
                }
                Step::Finish(subscriber) => {
                    subscriber.on_complete();
                    break;
                }
                Step::Idle => break,
            }
        }

        self.state.lock().draining = false;
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        state.iter = None;
        state.subscriber = None;
    }
}

/// Fails every subscriber immediately with a clone of `error`.
pub struct Fail<T, E> {
    error: E,
    _output: PhantomData<fn() -> T>,
}

impl<T, E: Clone> Fail<T, E> {
    /// Fail with `error`.
    pub fn new(error: E) -> Self {
        Self {
            error,
            _output: PhantomData,
        }
    }
}

impl<T, E: Clone> Publisher for Fail<T, E> {
    type Output = T;
    type Failure = E;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        subscriber.on_subscribe(Arc::new(EmptySubscription));
        subscriber.on_error(self.error.clone());
    }
}

impl<T, E: fmt::Debug> fmt::Debug for Fail<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fail").field("error", &self.error).finish()
    }
}

struct HubState<T, E> {
    current: Option<T>,
    subscriptions: Vec<Arc<HubSubscription<T, E>>>,
    completion: Option<Completion<E>>,
}

/// Shared core of the subjects.
struct Hub<T, E> {
    state: Mutex<HubState<T, E>>,
}

impl<T, E> Hub<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn new(current: Option<T>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HubState {
                current,
                subscriptions: Vec::new(),
                completion: None,
            }),
        })
    }

    fn subscribe(self: &Arc<Self>, subscriber: Arc<dyn Subscriber<T, E>>, replay: bool) {
        let mut state = self.state.lock();
        if let Some(completion) = state.completion.clone() {
            drop(state);
            subscriber.on_subscribe(Arc::new(EmptySubscription));
            match completion {
                Completion::Finished => subscriber.on_complete(),
                Completion::Failure(error) => subscriber.on_error(error),
            }
            return;
        }

        let pending = if replay { state.current.clone() } else { None };
        let subscription = Arc::new(HubSubscription {
            hub: Arc::downgrade(self),
            state: Mutex::new(HubSubscriptionState {
                subscriber: Some(Arc::clone(&subscriber)),
                demand: Demand::NONE,
                pending,
            }),
        });
        state.subscriptions.push(Arc::clone(&subscription));
        drop(state);

        subscriber.on_subscribe(subscription);
    }

    fn send(&self, value: T, store: bool) {
        let subscriptions = {
            let mut state = self.state.lock();
            if state.completion.is_some() {
                return;
            }
            if store {
                state.current = Some(value.clone());
            }
            state.subscriptions.clone()
        };
        for subscription in subscriptions {
            subscription.offer(value.clone());
        }
    }

    fn finish(&self, completion: Completion<E>) {
        let subscriptions = {
            let mut state = self.state.lock();
            if state.completion.is_some() {
                return;
            }
            state.completion = Some(completion.clone());
            std::mem::take(&mut state.subscriptions)
        };
        for subscription in subscriptions {
            subscription.finish(completion.clone());
        }
    }

    fn remove(&self, target: &HubSubscription<T, E>) {
        self.state
            .lock()
            .subscriptions
            .retain(|s| !std::ptr::eq(Arc::as_ptr(s), target));
    }

    fn subscriber_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }
}

struct HubSubscriptionState<T, E> {
    subscriber: Option<Arc<dyn Subscriber<T, E>>>,
    demand: Demand,
    pending: Option<T>,
}

struct HubSubscription<T, E> {
    hub: Weak<Hub<T, E>>,
    state: Mutex<HubSubscriptionState<T, E>>,
}

impl<T, E> HubSubscription<T, E> {
    /// Deliver a value if there is demand, otherwise keep it as the latest.
    fn offer(&self, value: T) {
        let subscriber = {
            let mut state = self.state.lock();
            let Some(subscriber) = state.subscriber.clone() else {
                return;
            };
            if !state.demand.take_one() {
                state.pending = Some(value);
                return;
            }
            subscriber
        };
        let more = subscriber.on_value(value);
        self.state.lock().demand += more;
    }

    fn finish(&self, completion: Completion<E>) {
        let subscriber = {
            let mut state = self.state.lock();
            state.pending = None;
            state.subscriber.take()
        };
        if let Some(subscriber) = subscriber {
            match completion {
                Completion::Finished => subscriber.on_complete(),
                Completion::Failure(error) => subscriber.on_error(error),
            }
        }
    }
}

impl<T, E> Subscription for HubSubscription<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn request(&self, demand: Demand) {
        let delivery = {
            let mut state = self.state.lock();
            state.demand += demand;
            match (state.subscriber.clone(), state.pending.is_some()) {
                (Some(subscriber), true) if state.demand.take_one() => {
                    state.pending.take().map(|value| (subscriber, value))
                }
                _ => None,
            }
        };
        if let Some((subscriber, value)) = delivery {
            let more = subscriber.on_value(value);
            self.state.lock().demand += more;
        }
    }

    fn cancel(&self) {
        let subscriber = {
            let mut state = self.state.lock();
            state.pending = None;
            state.subscriber.take()
        };
        if subscriber.is_some() {
            if let Some(hub) = self.hub.upgrade() {
                hub.remove(self);
            }
        }
    }
}

/// A subject that holds a current value and replays it to new subscribers.
pub struct CurrentValueSubject<T, E> {
    hub: Arc<Hub<T, E>>,
}

impl<T, E> CurrentValueSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Create a subject holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            hub: Hub::new(Some(value)),
        }
    }

    /// The current value.
    pub fn value(&self) -> Option<T> {
        self.hub.state.lock().current.clone()
    }

    /// Replace the current value and publish it.
    pub fn send(&self, value: T) {
        self.hub.send(value, true);
    }

    /// Finish every subscription. Later subscribers finish immediately.
    pub fn send_completion(&self, completion: Completion<E>) {
        self.hub.finish(completion);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }
}

impl<T, E> Clone for CurrentValueSubject<T, E> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
        }
    }
}

impl<T, E> Publisher for CurrentValueSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        self.hub.subscribe(subscriber, true);
    }
}

/// A subject that publishes only values sent after subscription.
pub struct PassthroughSubject<T, E> {
    hub: Arc<Hub<T, E>>,
}

impl<T, E> PassthroughSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Create a subject.
    pub fn new() -> Self {
        Self { hub: Hub::new(None) }
    }

    /// Publish a value to current subscribers.
    pub fn send(&self, value: T) {
        self.hub.send(value, false);
    }

    /// Finish every subscription. Later subscribers finish immediately.
    pub fn send_completion(&self, completion: Completion<E>) {
        self.hub.finish(completion);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }
}

impl<T, E> Default for PassthroughSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for PassthroughSubject<T, E> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
        }
    }
}

impl<T, E> Publisher for PassthroughSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        self.hub.subscribe(subscriber, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::PublisherExt;

    fn collect<P>(publisher: P) -> (Arc<Mutex<Vec<P::Output>>>, crate::Cancellable)
    where
        P: Publisher,
        P::Output: Send + 'static,
        P::Failure: 'static,
    {
        let values = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let values = Arc::clone(&values);
            publisher.for_each(move |v| values.lock().push(v))
        };
        (values, handle)
    }

    #[test]
    fn test_sequence_delivers_then_completes() {
        let done = Arc::new(Mutex::new(false));
        let values = Arc::new(Mutex::new(Vec::new()));
        let _handle = {
            let done = Arc::clone(&done);
            let values = Arc::clone(&values);
            Sequence::new(vec![1, 2, 3]).sink(
                move |v| values.lock().push(v),
                move |_| *done.lock() = true,
            )
        };
        assert_eq!(*values.lock(), vec![1, 2, 3]);
        assert!(*done.lock());
    }

    #[test]
    fn test_sequence_is_cold() {
        let sequence = Sequence::new(vec![1, 2]);
        let (first, _a) = collect(&sequence);
        let (second, _b) = collect(&sequence);
        assert_eq!(*first.lock(), vec![1, 2]);
        assert_eq!(*second.lock(), vec![1, 2]);
    }

    #[test]
    fn test_sequence_honors_demand() {
        let values = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let values = Arc::clone(&values);
            Sequence::new(0..10).for_each_with_demand(Demand::max(3), move |v| {
                values.lock().push(v)
            })
        };
        assert_eq!(*values.lock(), vec![0, 1, 2]);

        handle.cancel();
        handle.request(Demand::Unlimited);
        assert_eq!(values.lock().len(), 3);
    }

    #[test]
    fn test_just_and_empty() {
        let (values, _handle) = collect(just("Hello"));
        assert_eq!(*values.lock(), vec!["Hello"]);

        let (values, _handle) = collect(empty::<i32>());
        assert!(values.lock().is_empty());
    }

    #[test]
    fn test_fail_publisher() {
        let failure = Arc::new(Mutex::new(None));
        let _handle = {
            let failure = Arc::clone(&failure);
            Fail::<i32, String>::new("bad".to_string()).sink(
                |_| {},
                move |completion| *failure.lock() = Some(completion),
            )
        };
        assert_eq!(
            *failure.lock(),
            Some(Completion::Failure("bad".to_string()))
        );
    }

    #[test]
    fn test_current_value_subject_replays_current_value() {
        let subject = CurrentValueSubject::<i32, String>::new(0);
        let (values, handle) = collect(subject.clone());

        subject.send(1);
        subject.send(2);
        assert_eq!(*values.lock(), vec![0, 1, 2]);
        assert_eq!(subject.value(), Some(2));
        assert_eq!(subject.subscriber_count(), 1);

        drop(handle);
        assert_eq!(subject.subscriber_count(), 0);
        subject.send(3);
        assert_eq!(*values.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_subject_completion() {
        let subject = PassthroughSubject::<i32, String>::new();
        let done = Arc::new(Mutex::new(Vec::new()));
        let _handle = {
            let done = Arc::clone(&done);
            subject.clone().sink(|_| {}, move |c| done.lock().push(c))
        };

        subject.send_completion(Completion::Finished);
        subject.send(1);
        assert_eq!(*done.lock(), vec![Completion::Finished]);
        assert_eq!(subject.subscriber_count(), 0);

        // Late subscribers are finished right away.
        let late = Arc::new(Mutex::new(Vec::new()));
        let _late_handle = {
            let late = Arc::clone(&late);
            subject.clone().sink(|_| {}, move |c| late.lock().push(c))
        };
        assert_eq!(*late.lock(), vec![Completion::Finished]);
    }

    #[test]
    fn test_subject_holds_latest_value_without_demand() {
        let subject = PassthroughSubject::<i32, String>::new();
        let values = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let values = Arc::clone(&values);
            subject
                .clone()
                .for_each_with_demand(Demand::NONE, move |v| values.lock().push(v))
        };

        subject.send(1);
        subject.send(2);
        assert!(values.lock().is_empty());

        handle.request(Demand::max(1));
        assert_eq!(*values.lock(), vec![2]);
    }
}
