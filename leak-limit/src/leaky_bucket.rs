use std::time::Duration;

use parking_lot::Mutex;
use quanta::Clock;
use quanta::Instant;

use crate::ConfigError;
use crate::config::validate_bucket;

const MIN_RETRY: Duration = Duration::from_nanos(1);

/// A single leaky bucket.
///
/// Every admitted request adds one unit of occupancy. Occupancy drains at `leak_rate`
/// units per second, measured on a monotonic clock, and never drops below zero.
#[derive(Debug)]
pub struct LeakyBucket {
    capacity: f64,
    leak_rate: f64,
    level: Mutex<Level>,
    clock: Clock,
}

#[derive(Debug)]
struct Level {
    occupancy: f64,
    last_observed: Instant,
}

impl Level {
    fn drain(&mut self, now: Instant, leak_rate: f64) {
        let elapsed = now
            .checked_duration_since(self.last_observed)
            .unwrap_or_default();
        self.occupancy = (self.occupancy - elapsed.as_secs_f64() * leak_rate).max(0.0);
        self.last_observed = now;
    }
}

impl LeakyBucket {
    /// Creates a new, empty `LeakyBucket`.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The occupancy at which requests start being refused.
    /// * `leak_rate` - Units drained per second. Zero means the bucket never drains.
    pub fn new(capacity: f64, leak_rate: f64) -> Result<Self, ConfigError> {
        Self::with_clock(capacity, leak_rate, Clock::new())
    }

    pub fn with_clock(capacity: f64, leak_rate: f64, clock: Clock) -> Result<Self, ConfigError> {
        validate_bucket(capacity, leak_rate)?;
        let last_observed = clock.now();
        Ok(Self {
            capacity,
            leak_rate,
            level: Mutex::new(Level {
                occupancy: 0.0,
                last_observed,
            }),
            clock,
        })
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn leak_rate(&self) -> f64 {
        self.leak_rate
    }

    /// Apply the decay accumulated since the bucket was last observed.
    pub fn leak(&self) {
        let mut level = self.level.lock();
        level.drain(self.clock.now(), self.leak_rate);
    }

    /// Attempt to add one request to the bucket.
    ///
    /// Returns `true` if the request was admitted. Decay, the capacity check and the
    /// increment happen under a single lock, so concurrent callers can never push the
    /// bucket past capacity.
    pub fn add_request(&self) -> bool {
        let mut level = self.level.lock();
        level.drain(self.clock.now(), self.leak_rate);
        if level.occupancy < self.capacity {
            level.occupancy += 1.0;
            true
        } else {
            false
        }
    }

    /// Current occupancy, decayed up to now.
    ///
    /// The value is only a point-in-time reading.
    pub fn status(&self) -> f64 {
        let mut level = self.level.lock();
        level.drain(self.clock.now(), self.leak_rate);
        level.occupancy
    }

    /// How long until the bucket drains below capacity.
    ///
    /// `Some(Duration::ZERO)` only if there is room now, `None` if the bucket is full and
    /// never drains. A bucket sitting exactly at capacity refuses requests, so it reports
    /// a wait of at least one nanosecond.
    pub fn retry_after(&self) -> Option<Duration> {
        let occupancy = self.status();
        if occupancy < self.capacity {
            return Some(Duration::ZERO);
        }
        if self.leak_rate == 0.0 {
            return None;
        }
        let excess = occupancy - self.capacity;
        Duration::try_from_secs_f64(excess / self.leak_rate)
            .ok()
            .map(|wait| wait.max(MIN_RETRY))
    }

    #[cfg(test)]
    pub(crate) fn fill(&self, occupancy: f64) {
        self.level.lock().occupancy = occupancy;
    }

    #[cfg(test)]
    pub(crate) fn observed_at(&self) -> Instant {
        self.level.lock().last_observed
    }
}
