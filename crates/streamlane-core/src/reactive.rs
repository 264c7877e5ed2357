//! Reactive stream capability traits.
//!
//! Lanes are polymorphic over any producer/consumer pair that speaks this
//! protocol: a [`Publisher`] hands each [`Subscriber`] a [`Subscription`],
//! the subscriber signals [`Demand`] through it, and the publisher delivers
//! at most that many values followed by at most one terminal signal
//! (`on_complete` or `on_error`). Cancelling a subscription asks the
//! publisher to stop; no terminal signal is owed afterwards.

use std::ops::{Add, AddAssign};
use std::sync::Arc;

/// How many more values a subscriber is ready to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Demand {
    /// No limit.
    Unlimited,
    /// At most this many values.
    Max(usize),
}

impl Demand {
    /// No further values.
    pub const NONE: Demand = Demand::Max(0);

    /// Demand for at most `n` values.
    pub const fn max(n: usize) -> Self {
        Demand::Max(n)
    }

    /// Check whether no value may be delivered.
    pub fn is_none(&self) -> bool {
        matches!(self, Demand::Max(0))
    }

    /// Consume demand for one value. Returns `false` if there was none.
    pub fn take_one(&mut self) -> bool {
        match self {
            Demand::Unlimited => true,
            Demand::Max(0) => false,
            Demand::Max(n) => {
                *n -= 1;
                true
            }
        }
    }
}

impl Default for Demand {
    fn default() -> Self {
        Demand::NONE
    }
}

impl Add for Demand {
    type Output = Demand;

    fn add(self, rhs: Demand) -> Demand {
        match (self, rhs) {
            (Demand::Max(a), Demand::Max(b)) => Demand::Max(a.saturating_add(b)),
            _ => Demand::Unlimited,
        }
    }
}

impl AddAssign for Demand {
    fn add_assign(&mut self, rhs: Demand) {
        *self = *self + rhs;
    }
}

/// The link between one publisher and one subscriber.
pub trait Subscription: Send + Sync {
    /// Signal additional demand.
    fn request(&self, demand: Demand);

    /// Stop delivery. Idempotent.
    fn cancel(&self);
}

/// A consumer of values of type `T` that may fail with `E`.
pub trait Subscriber<T, E>: Send + Sync {
    /// The subscription was established. Called once, before any value.
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    /// A value arrived. Returns additional demand.
    fn on_value(&self, value: T) -> Demand;

    /// The publisher finished normally.
    fn on_complete(&self);

    /// The publisher failed.
    fn on_error(&self, error: E);
}

/// A producer of values.
pub trait Publisher {
    /// Value type.
    type Output;
    /// Failure type.
    type Failure;

    /// Attach a subscriber. Each call creates an independent subscription.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Self::Output, Self::Failure>>);
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Self::Output, Self::Failure>>) {
        (**self).subscribe(subscriber)
    }
}

impl<P: Publisher + ?Sized> Publisher for &P {
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Self::Output, Self::Failure>>) {
        (**self).subscribe(subscriber)
    }
}
