use std::fmt;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use quanta::Clock;
use serde::Serialize;
use serde::ser::SerializeMap;
use tracing::debug;

use crate::Admit;
use crate::ConfigError;
use crate::LeakyBucket;
use crate::LimiterConfig;
use crate::Reason;

/// Index of a channel within a [`ChannelPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChannelId(usize);

impl ChannelId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel_{}", self.0)
    }
}

/// Occupancy of every channel, read one bucket at a time.
///
/// Each reading is atomic for its bucket; the snapshot as a whole is not a single
/// point in time across all buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    levels: Vec<f64>,
}

impl Snapshot {
    pub fn get(&self, channel: ChannelId) -> Option<f64> {
        self.levels.get(channel.index()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, f64)> + '_ {
        self.levels
            .iter()
            .enumerate()
            .map(|(index, level)| (ChannelId(index), *level))
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Serialized as `{"channel_0": 1.0, "channel_1": 0.0, ...}`.
impl Serialize for Snapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.levels.len()))?;
        for (channel, level) in self.iter() {
            map.serialize_entry(&channel.to_string(), &level)?;
        }
        map.end()
    }
}

/// A fixed set of leaky buckets served in round robin order.
#[derive(Debug)]
pub struct ChannelPool {
    buckets: Box<[LeakyBucket]>,
    channels: NonZeroUsize,
    cursor: AtomicUsize,
}

impl ChannelPool {
    /// Creates a pool of `channels` identical, empty buckets.
    pub fn new(channels: NonZeroUsize, capacity: f64, leak_rate: f64) -> Result<Self, ConfigError> {
        Self::with_clock(channels, capacity, leak_rate, Clock::new())
    }

    pub fn with_clock(
        channels: NonZeroUsize,
        capacity: f64,
        leak_rate: f64,
        clock: Clock,
    ) -> Result<Self, ConfigError> {
        let buckets = (0..channels.get())
            .map(|_| LeakyBucket::with_clock(capacity, leak_rate, clock.clone()))
            .collect::<Result<Box<[_]>, _>>()?;

        Ok(Self {
            buckets,
            channels,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn from_config(config: &LimiterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::new(config.channels, config.capacity, config.leak_rate)
    }

    pub fn channels(&self) -> NonZeroUsize {
        self.channels
    }

    pub fn channel(&self, channel: ChannelId) -> Option<&LeakyBucket> {
        self.buckets.get(channel.index())
    }

    /// Take the channel under the cursor and advance the cursor by one.
    fn next_channel(&self) -> usize {
        let channels = self.channels.get();
        // The closure never declines, so both arms carry the previous cursor.
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                Some((cursor + 1) % channels)
            }) {
            Ok(cursor) | Err(cursor) => cursor,
        }
    }

    /// Admit a request onto the first channel with room, starting at the cursor.
    ///
    /// Makes exactly one attempt per channel. Each attempt advances the cursor, and each
    /// bucket lock is released before the next channel is tried.
    pub fn try_admit(&self) -> ControlFlow<Reason, ChannelId> {
        for _ in 0..self.channels.get() {
            let index = self.next_channel();
            if self.buckets[index].add_request() {
                return ControlFlow::Continue(ChannelId(index));
            }
        }

        let retry_after = self.retry_after();
        debug!(?retry_after, "all channels saturated");
        ControlFlow::Break(Reason::Saturated { retry_after })
    }

    /// Occupancy of every channel. Does not move the cursor.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            levels: self.buckets.iter().map(LeakyBucket::status).collect(),
        }
    }

    /// Apply pending decay to every bucket.
    pub fn leak_all(&self) {
        for bucket in self.buckets.iter() {
            bucket.leak();
        }
    }

    /// Shortest wait until any channel has room, `None` if no channel drains.
    pub fn retry_after(&self) -> Option<Duration> {
        self.buckets
            .iter()
            .filter_map(LeakyBucket::retry_after)
            .min()
    }
}

impl Admit for ChannelPool {
    fn try_admit(&self) -> ControlFlow<Reason, ChannelId> {
        ChannelPool::try_admit(self)
    }
}
