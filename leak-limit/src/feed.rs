use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use futures::Stream;
use futures::StreamExt;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::WaitForCancellationFutureOwned;
use tracing::debug;

use crate::ChannelPool;
use crate::Snapshot;

/// Publishes pool snapshots to any number of independent subscribers.
///
/// Every [`Subscription`] owns its own ticker, so a slow consumer only ever delays
/// itself. All subscriptions end when the feed's shutdown token is cancelled.
#[derive(Debug, Clone)]
pub struct StatusFeed {
    pool: Arc<ChannelPool>,
    period: Duration,
    shutdown: CancellationToken,
    subscribers: Arc<AtomicUsize>,
}

impl StatusFeed {
    /// # Panics
    ///
    /// Subscribing panics if `period` is zero.
    pub fn new(pool: Arc<ChannelPool>, period: Duration, shutdown: CancellationToken) -> Self {
        Self {
            pool,
            period,
            shutdown,
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start a new subscription. The first snapshot is available immediately.
    pub fn subscribe(&self) -> Subscription {
        let mut ticker = tokio::time::interval(self.period);
        // Missed ticks are dropped rather than queued for a backpressured subscriber.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let active = self.subscribers.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(active, "status subscription opened");

        Subscription {
            pool: Arc::clone(&self.pool),
            ticker,
            cancelled: Box::pin(self.shutdown.clone().cancelled_owned()),
            subscribers: Arc::clone(&self.subscribers),
            closed: false,
        }
    }

    /// Number of subscriptions that have not yet been dropped.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Acquire)
    }
}

/// An infinite stream of snapshots, ending only on shutdown.
///
/// Dropping the subscription releases it.
pub struct Subscription {
    pool: Arc<ChannelPool>,
    ticker: Interval,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    subscribers: Arc<AtomicUsize>,
    closed: bool,
}

impl Subscription {
    /// Wait for the next snapshot. `None` once the feed has shut down.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.next().await
    }
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(None);
        }
        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.closed = true;
            return Poll::Ready(None);
        }

        match this.ticker.poll_tick(cx) {
            Poll::Ready(_) => Poll::Ready(Some(this.pool.snapshot())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("period", &self.ticker.period())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let active = self.subscribers.fetch_sub(1, Ordering::AcqRel) - 1;
        debug!(active, "status subscription closed");
    }
}
