//! Time source and request pacing.
//!
//! All waiting is blocking: the executing thread has nothing else to do while
//! the upstream quota recovers.

use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::sync::Arc;
#[cfg(test)]
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic time source that can also block
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `Instant` and `thread::sleep`
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Simulated clock; sleeping advances time instantly
#[cfg(test)]
#[derive(Default)]
pub struct ManualClock {
    elapsed: Mutex<Duration>,
    slept: Mutex<Duration>,
}

#[cfg(test)]
impl ManualClock {
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
    }

    /// Total time spent in `sleep`
    pub fn total_slept(&self) -> Duration {
        *self.slept.lock().unwrap()
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
        *self.slept.lock().unwrap() += duration;
    }
}

/// Adapts a [`Clock`] to the limiter's time source
#[derive(Clone)]
struct PacingClock(Arc<dyn Clock>);

impl governor::clock::Clock for PacingClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        Nanos::from(self.0.now())
    }
}

type Limiter = RateLimiter<NotKeyed, InMemoryState, PacingClock, NoOpMiddleware<Nanos>>;

/// Enforces a minimum interval between consecutive upstream calls
pub struct Pacer {
    clock: Arc<dyn Clock>,
    min_interval: Duration,
    /// `None` when pacing is disabled
    limiter: Option<Limiter>,
}

impl Pacer {
    pub fn new(clock: Arc<dyn Clock>, min_interval: Duration) -> Self {
        let limiter = Quota::with_period(min_interval)
            .map(|quota| RateLimiter::direct_with_clock(quota, PacingClock(clock.clone())));
        Self {
            clock,
            min_interval,
            limiter,
        }
    }

    pub fn interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until the limiter grants the next call
    pub fn wait_turn(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        while let Err(not_until) = limiter.check() {
            let wait = not_until.wait_time_from(Nanos::from(self.clock.now()));
            self.clock.sleep(wait);
        }
    }
}

/// Wall-clock allowance for one phase invocation
pub struct TimeBudget {
    clock: Arc<dyn Clock>,
    started: Duration,
    ceiling: Duration,
    safety_margin: Duration,
    /// Wait the next call may spend queued behind the pacer
    lead: Duration,
}

impl TimeBudget {
    pub fn start(clock: Arc<dyn Clock>, ceiling: Duration, safety_margin: Duration) -> Self {
        let started = clock.now();
        Self {
            clock,
            started,
            ceiling,
            safety_margin,
            lead: Duration::ZERO,
        }
    }

    pub fn with_lead(mut self, lead: Duration) -> Self {
        self.lead = lead;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.started)
    }

    /// True once there is not enough time left to safely start another call
    pub fn should_stop(&self) -> bool {
        self.elapsed() + self.lead + self.safety_margin >= self.ceiling
    }
}
