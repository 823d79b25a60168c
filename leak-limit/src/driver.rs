use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::ChannelPool;

/// Background task that leaks every bucket in a pool on a fixed period.
///
/// Buckets already leak whenever they are touched; the driver keeps idle channels
/// draining so readings between admissions stay current.
#[derive(Debug)]
pub struct LeakDriver {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

impl LeakDriver {
    /// Spawn the driver onto the current tokio runtime.
    ///
    /// The driver stops when `shutdown` is called or when `parent` is cancelled.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn spawn(pool: Arc<ChannelPool>, period: Duration, parent: &CancellationToken) -> Self {
        let token = parent.child_token();
        let handle = tokio::spawn(run(pool, period, token.clone()));
        Self { handle, token }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the driver and wait for its task to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(err) = self.handle.await {
            warn!(%err, "leak driver task failed");
        }
    }
}

async fn run(pool: Arc<ChannelPool>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(?period, channels = pool.channels().get(), "leak driver started");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => pool.leak_all(),
        }
    }

    info!("leak driver stopped");
}
