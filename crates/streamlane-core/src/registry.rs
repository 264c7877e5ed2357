//! Process-wide subscription identity registry.
//!
//! Every subscription to a lane-decorated stream receives an id from a single
//! atomic counter. Ids start at 1, strictly increase, and are never reused or
//! reset for the lifetime of the process.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static SUBSCRIPTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a lane subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocate the next id from the process-wide counter.
    pub fn next() -> Self {
        Self(SUBSCRIPTION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// The most recently issued id value, or 0 if none has been issued.
    pub fn current() -> u64 {
        SUBSCRIPTION_COUNTER.load(Ordering::Relaxed)
    }

    /// Get the raw id value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocate the next subscription id.
pub fn next_id() -> SubscriptionId {
    SubscriptionId::next()
}
