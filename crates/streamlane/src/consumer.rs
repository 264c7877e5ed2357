//! Closure-driven consumers and their cancellation handles.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use streamlane_core::{Demand, Subscriber, Subscription};

/// How a publisher finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<E> {
    /// Normal completion.
    Finished,
    /// Failure.
    Failure(E),
}

impl<E> Completion<E> {
    /// Check whether this is a normal completion.
    pub fn is_finished(&self) -> bool {
        matches!(self, Completion::Finished)
    }
}

#[derive(Default)]
struct SlotState {
    subscription: Option<Arc<dyn Subscription>>,
    cancelled: bool,
    finished: bool,
}

/// Holds the subscription of one consumer until it is cancelled or finishes.
#[derive(Default)]
struct SubscriptionSlot {
    state: Mutex<SlotState>,
}

impl SubscriptionSlot {
    /// Store the subscription. Returns `false` if the slot was already
    /// cancelled, in which case the subscription is cancelled right away.
    fn attach(&self, subscription: Arc<dyn Subscription>) -> bool {
        let mut state = self.state.lock();
        if state.cancelled {
            drop(state);
            subscription.cancel();
            return false;
        }
        state.subscription = Some(subscription);
        true
    }

    fn current(&self) -> Option<Arc<dyn Subscription>> {
        self.state.lock().subscription.clone()
    }

    fn finish(&self) -> bool {
        let mut state = self.state.lock();
        let first = !state.finished && !state.cancelled;
        state.finished = true;
        state.subscription = None;
        first
    }

    fn cancel(&self) {
        let subscription = {
            let mut state = self.state.lock();
            if state.cancelled || state.finished {
                return;
            }
            state.cancelled = true;
            state.subscription.take()
        };
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    fn is_active(&self) -> bool {
        let state = self.state.lock();
        !state.cancelled && !state.finished
    }
}

type ValueFn<T> = Box<dyn Fn(T) + Send + Sync>;
type CompletionFn<E> = Box<dyn FnOnce(Completion<E>) + Send>;

/// A subscriber that hands values and completion to closures.
pub struct ForEach<T, E> {
    slot: Arc<SubscriptionSlot>,
    initial_demand: Demand,
    on_value: ValueFn<T>,
    on_completion: Mutex<Option<CompletionFn<E>>>,
}

impl<T, E> ForEach<T, E> {
    /// Consume values with unlimited demand.
    pub fn new<F>(on_value: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            slot: Arc::new(SubscriptionSlot::default()),
            initial_demand: Demand::Unlimited,
            on_value: Box::new(on_value),
            on_completion: Mutex::new(None),
        }
    }

    /// Request only `demand` values up front.
    ///
    /// More can be requested through [`Cancellable::request`].
    pub fn with_demand(mut self, demand: Demand) -> Self {
        self.initial_demand = demand;
        self
    }

    /// Be told how the publisher finished.
    pub fn with_completion<F>(self, on_completion: F) -> Self
    where
        F: FnOnce(Completion<E>) + Send + 'static,
    {
        *self.on_completion.lock() = Some(Box::new(on_completion));
        self
    }

    /// A handle that cancels this consumer's subscription when dropped.
    pub fn handle(&self) -> Cancellable {
        Cancellable {
            slot: Some(Arc::clone(&self.slot)),
        }
    }

    fn finish(&self, completion: Completion<E>) {
        if !self.slot.finish() {
            return;
        }
        let callback = self.on_completion.lock().take();
        if let Some(callback) = callback {
            callback(completion);
        }
    }
}

impl<T, E> Subscriber<T, E> for ForEach<T, E> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.slot.attach(Arc::clone(&subscription)) && !self.initial_demand.is_none() {
            subscription.request(self.initial_demand);
        }
    }

    fn on_value(&self, value: T) -> Demand {
        if self.slot.is_active() {
            (self.on_value)(value);
        }
        Demand::NONE
    }

    fn on_complete(&self) {
        self.finish(Completion::Finished);
    }

    fn on_error(&self, error: E) {
        self.finish(Completion::Failure(error));
    }
}

impl<T, E> fmt::Debug for ForEach<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForEach")
            .field("initial_demand", &self.initial_demand)
            .field("active", &self.slot.is_active())
            .finish()
    }
}

/// Cancels a consumer's subscription when dropped.
///
/// Dropping the handle after the publisher finished does nothing. Use
/// [`detach`](Self::detach) to keep the subscription running without a handle.
#[must_use = "dropping a Cancellable cancels the subscription"]
pub struct Cancellable {
    slot: Option<Arc<SubscriptionSlot>>,
}

impl Cancellable {
    /// Cancel the subscription now.
    pub fn cancel(&self) {
        if let Some(slot) = &self.slot {
            slot.cancel();
        }
    }

    /// Request more values.
    pub fn request(&self, demand: Demand) {
        let subscription = self.slot.as_ref().and_then(|slot| slot.current());
        if let Some(subscription) = subscription {
            subscription.request(demand);
        }
    }

    /// Check whether the subscription is neither cancelled nor finished.
    pub fn is_active(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| slot.is_active())
    }

    /// Let the subscription run until the publisher finishes.
    pub fn detach(mut self) {
        self.slot = None;
    }
}

impl Drop for Cancellable {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellable")
            .field("active", &self.is_active())
            .finish()
    }
}
