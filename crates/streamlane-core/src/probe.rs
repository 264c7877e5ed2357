//! Per-subscription lane state.
//!
//! A [`SubscriptionProbe`] tracks one subscription through
//! `unattached -> active -> completed | errored | cancelled` and builds the
//! records for each transition. Decorators call into it before forwarding a
//! signal and use the returned flag to decide whether to forward at all.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use crate::config::LaneConfig;
use crate::format::{format, short_type_name};
use crate::record::{EndState, EventKind, EventRecord};
use crate::registry::SubscriptionId;
use crate::sink::deliver;

const UNATTACHED: u8 = 0;
const ACTIVE: u8 = 1;
const COMPLETED: u8 = 2;
const ERRORED: u8 = 3;
const CANCELLED: u8 = 4;

/// Lifecycle phase of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Created, upstream not yet attached.
    Unattached,
    /// Begin has been reported.
    Active,
    /// Upstream finished normally.
    Completed,
    /// Upstream failed.
    Errored,
    /// The consumer cancelled.
    Cancelled,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            UNATTACHED => Phase::Unattached,
            ACTIVE => Phase::Active,
            COMPLETED => Phase::Completed,
            ERRORED => Phase::Errored,
            _ => Phase::Cancelled,
        }
    }

    /// Check whether this phase is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Errored | Phase::Cancelled)
    }
}

/// Records built but not yet handed to the sink.
#[derive(Default)]
struct Outbox {
    records: VecDeque<EventRecord>,
    delivering: bool,
}

/// State and record emission for one subscription of a lane.
///
/// The probe holds only a weak reference to its lane configuration. Once the
/// configuration is gone, transitions still happen but nothing is reported.
///
/// Transitions and record building happen under a lock; sink delivery does
/// not. Records of one subscription reach the sink one at a time and in
/// transition order, and a sink may feed the same subscription again from
/// inside `on_record`. Such nested records are delivered once the current
/// delivery returns.
pub struct SubscriptionProbe<T> {
    id: SubscriptionId,
    config: Weak<LaneConfig<T>>,
    phase: AtomicU8,
    cancel_scheduled: AtomicBool,
    outbox: Mutex<Outbox>,
}

impl<T: 'static> SubscriptionProbe<T> {
    /// Create a probe with a freshly allocated id.
    pub fn new(config: &Arc<LaneConfig<T>>) -> Self {
        Self::with_id(config, SubscriptionId::next())
    }

    /// Create a probe for an already allocated id.
    pub fn with_id(config: &Arc<LaneConfig<T>>, id: SubscriptionId) -> Self {
        Self {
            id,
            config: Arc::downgrade(config),
            phase: AtomicU8::new(UNATTACHED),
            cancel_scheduled: AtomicBool::new(false),
            outbox: Mutex::new(Outbox::default()),
        }
    }

    /// The subscription id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The lane configuration, while some owner keeps it alive.
    pub fn config(&self) -> Option<Arc<LaneConfig<T>>> {
        self.config.upgrade()
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Check whether a terminal transition has happened.
    pub fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Check whether a deferred cancellation check has been scheduled.
    pub fn is_cancel_scheduled(&self) -> bool {
        self.cancel_scheduled.load(Ordering::Acquire)
    }

    /// Report the start of the subscription. Only the first call has an effect.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn begin(&self) -> bool {
        let config = self.config.upgrade();
        let mut outbox = self.outbox.lock();
        let began = self.begin_locked(&mut outbox, config.as_deref());
        self.flush(outbox, config.as_deref());
        began
    }

    /// Report a value. Returns `true` if the value should be forwarded.
    ///
    /// Values after a completion or failure are dropped. Values after a
    /// reported cancellation are forwarded without a record.
    pub fn on_value(&self, value: &T) -> bool {
        let config = self.config.upgrade();
        // Rendered outside the lock, the transform is user code.
        let payload = match config.as_deref() {
            Some(config)
                if config.filter().contains(EventKind::Value.lane_type())
                    && !self.is_terminal() =>
            {
                Some(config.transform().apply(value))
            }
            _ => None,
        };

        let mut outbox = self.outbox.lock();
        self.begin_locked(&mut outbox, config.as_deref());

        let forward = match self.phase.load(Ordering::Acquire) {
            COMPLETED | ERRORED => {
                trace!(subscription = %self.id, "Value after termination ignored");
                false
            }
            CANCELLED => true,
            _ => {
                if let (Some(config), Some(payload)) = (config.as_deref(), payload) {
                    self.push(&mut outbox, config, EventKind::Value, Some(payload));
                }
                true
            }
        };
        self.flush(outbox, config.as_deref());
        forward
    }

    /// Report normal completion. Returns `true` if it should be forwarded.
    pub fn complete(&self) -> bool {
        let config = self.config.upgrade();
        let mut outbox = self.outbox.lock();
        self.begin_locked(&mut outbox, config.as_deref());

        let forward = match self.phase.compare_exchange(
            ACTIVE,
            COMPLETED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                trace!(subscription = %self.id, "Subscription completed");
                if let Some(config) = config.as_deref() {
                    self.push(&mut outbox, config, EventKind::Completion, None);
                    self.push(
                        &mut outbox,
                        config,
                        EventKind::SubscriptionEnd(EndState::Completed),
                        None,
                    );
                }
                true
            }
            Err(CANCELLED) => true,
            Err(_) => {
                trace!(subscription = %self.id, "Completion after termination ignored");
                false
            }
        };
        self.flush(outbox, config.as_deref());
        forward
    }

    /// Report a failure. Returns `true` if it should be forwarded.
    ///
    /// The error's `Display` text becomes the record payload.
    pub fn fail<E: fmt::Display + ?Sized>(&self, error: &E) -> bool {
        let config = self.config.upgrade();
        let description = match config.as_deref() {
            Some(config) if !config.filter().is_empty() && !self.is_terminal() => {
                Some(error.to_string())
            }
            _ => None,
        };

        let mut outbox = self.outbox.lock();
        self.begin_locked(&mut outbox, config.as_deref());

        let forward = match self.phase.compare_exchange(
            ACTIVE,
            ERRORED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                trace!(subscription = %self.id, "Subscription failed");
                if let (Some(config), Some(description)) = (config.as_deref(), description) {
                    self.push(&mut outbox, config, EventKind::Error, Some(description.clone()));
                    self.push(
                        &mut outbox,
                        config,
                        EventKind::SubscriptionEnd(EndState::Error(description)),
                        None,
                    );
                }
                true
            }
            Err(CANCELLED) => true,
            Err(_) => {
                trace!(subscription = %self.id, "Failure after termination ignored");
                false
            }
        };
        self.flush(outbox, config.as_deref());
        forward
    }

    /// Schedule the deferred cancellation check on the lane's scheduler.
    ///
    /// At most one check is scheduled per subscription. Returns `true` if
    /// this call scheduled it.
    pub fn schedule_cancel(self: &Arc<Self>) -> bool {
        if self.cancel_scheduled.swap(true, Ordering::AcqRel) {
            return false;
        }

        let Some(config) = self.config.upgrade() else {
            trace!(subscription = %self.id, "Lane released; cancellation not reported");
            return false;
        };

        let scheduler = config.scheduler();
        trace!(
            subscription = %self.id,
            scheduler = scheduler.name(),
            "Deferred cancellation check scheduled"
        );

        let probe = Arc::clone(self);
        scheduler.schedule(Box::new(move || {
            probe.report_cancel_with(Some(&config));
        }));
        true
    }

    /// Run the cancellation check now.
    ///
    /// Reports the cancellation unless the subscription already terminated.
    /// Returns `true` if the cancellation was reported.
    pub fn report_cancel(&self) -> bool {
        let config = self.config.upgrade();
        self.report_cancel_with(config.as_deref())
    }

    fn report_cancel_with(&self, config: Option<&LaneConfig<T>>) -> bool {
        let mut outbox = self.outbox.lock();
        self.begin_locked(&mut outbox, config);

        let reported = match self.phase.compare_exchange(
            ACTIVE,
            CANCELLED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                trace!(subscription = %self.id, "Subscription cancelled");
                if let Some(config) = config {
                    self.push(&mut outbox, config, EventKind::Cancelled, None);
                    self.push(
                        &mut outbox,
                        config,
                        EventKind::SubscriptionEnd(EndState::Cancelled),
                        None,
                    );
                }
                true
            }
            Err(phase) => {
                trace!(
                    subscription = %self.id,
                    phase = ?Phase::from_u8(phase),
                    "Cancellation suppressed"
                );
                false
            }
        };
        self.flush(outbox, config);
        reported
    }

    fn begin_locked(&self, outbox: &mut Outbox, config: Option<&LaneConfig<T>>) -> bool {
        if self
            .phase
            .compare_exchange(UNATTACHED, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        trace!(subscription = %self.id, "Subscription began");
        if let Some(config) = config {
            self.push(outbox, config, EventKind::SubscriptionBegin, None);
        }
        true
    }

    fn push(
        &self,
        outbox: &mut Outbox,
        config: &LaneConfig<T>,
        kind: EventKind,
        payload: Option<String>,
    ) {
        if !config.filter().contains(kind.lane_type()) {
            return;
        }
        let record = format::<T>(kind, self.id, config.name(), config.source(), payload);
        outbox.records.push_back(record);
    }

    /// Hand queued records to the sink with the lock released.
    ///
    /// Returns at once if another call is already delivering; that call
    /// picks up whatever was queued here.
    fn flush(&self, mut outbox: MutexGuard<'_, Outbox>, config: Option<&LaneConfig<T>>) {
        let Some(config) = config else {
            return;
        };
        if outbox.delivering {
            return;
        }

        outbox.delivering = true;
        while let Some(record) = outbox.records.pop_front() {
            MutexGuard::unlocked(&mut outbox, || {
                deliver(config.sink().as_ref(), &record);
            });
        }
        outbox.delivering = false;
    }
}

impl<T> fmt::Debug for SubscriptionProbe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionProbe")
            .field("id", &self.id)
            .field("type", &short_type_name::<T>())
            .field("phase", &Phase::from_u8(self.phase.load(Ordering::Acquire)))
            .field("attached", &(self.config.strong_count() > 0))
            .finish()
    }
}
