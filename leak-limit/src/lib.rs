//! # leak-limit
//!
//! `leak-limit` provides round robin admission control over a fixed set of
//! leaky buckets ("channels").
//!
//! ## Core Philosophy
//!
//! Each channel is an independent [`LeakyBucket`]: every admitted request adds one unit of
//! occupancy and the occupancy drains continuously at a fixed rate. A [`ChannelPool`] spreads
//! requests over its channels in round robin order and only rejects once every channel has
//! refused, so a single busy channel never causes a rejection while another has room.
//!
//! ## Key Concepts
//!
//! * **Per-Bucket Exclusion**: Leak, check and increment happen in one critical section per
//!   bucket. No operation ever holds two bucket locks.
//! * **Lazy and Driven Decay**: Buckets leak at the moment they are touched, and a
//!   [`LeakDriver`] leaks every bucket on a timer so idle channels recover in real time.
//! * **Status Feed**: A [`StatusFeed`] hands out independent [`Subscription`] streams of
//!   per-channel [`Snapshot`]s.
//!
//! ## Example
//!
//! ```rust
//! use leak_limit::ChannelPool;
//! use std::num::NonZeroUsize;
//!
//! let channels = NonZeroUsize::new(4).unwrap();
//! let pool = ChannelPool::new(channels, 500.0, 250.0).unwrap();
//!
//! if let Some(channel) = pool.try_admit().continue_value() {
//!     // Request allowed on `channel`
//!     println!("admitted on {channel}");
//! }
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

mod config;
mod driver;
mod feed;
mod leaky_bucket;
mod pool;

pub use config::ConfigError;
pub use config::LimiterConfig;
pub use driver::LeakDriver;
pub use feed::StatusFeed;
pub use feed::Subscription;
pub use leaky_bucket::LeakyBucket;
pub use pool::ChannelId;
pub use pool::ChannelPool;
pub use pool::Snapshot;
pub use tokio_util::sync::CancellationToken;

/// Reasons why a request might be rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    /// Every channel was at capacity when the request was considered.
    ///
    /// `retry_after` is the shortest wait until some channel drains below capacity,
    /// or `None` if no channel drains at all.
    Saturated { retry_after: Option<Duration> },
}

/// The admission seam used by middleware.
///
/// Implementations must be `Send` and `Sync` to be shared across tasks via `Arc`.
pub trait Admit: Debug {
    /// Attempts to admit a single request.
    ///
    /// # Errors
    ///
    /// Breaks with a [`Reason`] if the request cannot be admitted.
    fn try_admit(&self) -> ControlFlow<Reason, ChannelId>;
}
