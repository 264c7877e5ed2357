//! The lane decorator for `futures` streams.
//!
//! A stream has no explicit subscribe or cancel signal, so they are mapped:
//! the first poll begins the subscription, `Poll::Ready(None)` completes it,
//! and dropping the stream before it finished cancels it.

use std::fmt;
use std::panic::Location;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::stream::{FusedStream, Stream, StreamExt};
use tracing::debug;

use streamlane_core::{DispatchTurn, LaneConfig, Phase, SubscriptionProbe};

/// A stream that reports its lifecycle to a lane.
///
/// Items pass through unchanged. The subscription id is allocated when the
/// stream is wrapped.
#[must_use = "streams do nothing unless polled"]
pub struct LaneStream<S: Stream>
where
    S::Item: 'static,
{
    inner: S,
    config: Arc<LaneConfig<S::Item>>,
    probe: Arc<SubscriptionProbe<S::Item>>,
    done: bool,
}

impl<S> LaneStream<S>
where
    S: Stream + Unpin,
    S::Item: 'static,
{
    /// Wrap `inner` in a lane.
    pub fn new(inner: S, config: LaneConfig<S::Item>) -> Self {
        let config = Arc::new(config);
        let probe = Arc::new(SubscriptionProbe::new(&config));
        debug!(
            lane = config.name().unwrap_or("<unnamed>"),
            subscription = %probe.id(),
            filter = %config.filter(),
            "Lane attached to stream"
        );
        Self {
            inner,
            config,
            probe,
            done: false,
        }
    }

    /// The lane configuration.
    pub fn config(&self) -> &LaneConfig<S::Item> {
        &self.config
    }

    /// The probe tracking this stream's subscription.
    pub fn probe(&self) -> &Arc<SubscriptionProbe<S::Item>> {
        &self.probe
    }
}

impl<S> Stream for LaneStream<S>
where
    S: Stream + Unpin,
    S::Item: 'static,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        let _turn = DispatchTurn::enter();
        if this.probe.phase() == Phase::Unattached {
            this.probe.begin();
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(item)) => {
                this.probe.on_value(&item);
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                this.done = true;
                this.probe.complete();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            self.inner.size_hint()
        }
    }
}

impl<S> FusedStream for LaneStream<S>
where
    S: Stream + Unpin,
    S::Item: 'static,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<S: Stream> Drop for LaneStream<S>
where
    S::Item: 'static,
{
    fn drop(&mut self) {
        // Never polled means never subscribed.
        if self.done || self.probe.phase() == Phase::Unattached {
            return;
        }
        self.probe.schedule_cancel();
    }
}

impl<S: Stream> fmt::Debug for LaneStream<S>
where
    S::Item: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaneStream")
            .field("config", &self.config)
            .field("probe", &self.probe)
            .field("done", &self.done)
            .finish()
    }
}

/// Lane adapters available on every [`Stream`].
pub trait LaneStreamExt: Stream + Sized {
    /// Attach a lane with default settings.
    ///
    /// The source label is the caller's location.
    #[track_caller]
    fn lane(self, name: impl Into<String>) -> LaneStream<Self>
    where
        Self: Unpin,
        Self::Item: fmt::Debug + 'static,
    {
        let config = LaneConfig::new(name).with_default_source(Location::caller());
        LaneStream::new(self, config)
    }

    /// Attach a lane with an explicit configuration.
    #[track_caller]
    fn lane_with(self, config: LaneConfig<Self::Item>) -> LaneStream<Self>
    where
        Self: Unpin,
        Self::Item: 'static,
    {
        LaneStream::new(self, config.with_default_source(Location::caller()))
    }
}

impl<S: Stream> LaneStreamExt for S {}
