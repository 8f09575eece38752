//! Simulation time and the world clock.

use std::fmt;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A point on the simulation timeline, measured from the last clock reset.
///
/// `SimTime::ZERO` doubles as the epoch sentinel: a deadline set to it is
/// always due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(Duration);

impl SimTime {
    pub const ZERO: SimTime = SimTime(Duration::ZERO);

    pub fn from_secs_f64(secs: f64) -> Self {
        SimTime(Duration::from_secs_f64(secs))
    }

    pub fn from_duration(duration: Duration) -> Self {
        SimTime(duration)
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    pub fn is_epoch(&self) -> bool {
        self.0.is_zero()
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0.saturating_add(rhs))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}

/// Read-only access to the current simulation time.
pub trait SimClock: Send + Sync {
    fn sim_time(&self) -> SimTime;
}

/// The host's world clock.
///
/// Time only moves when the host steps the world, and jumps back to zero on
/// `reset`. Reads are lock-free so plugins can sample it from any thread.
#[derive(Debug, Default)]
pub struct WorldClock {
    nanos: AtomicU64,
}

impl WorldClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `dt` and returns the new time.
    pub fn advance(&self, dt: Duration) -> SimTime {
        let dt = u64::try_from(dt.as_nanos()).unwrap_or(u64::MAX);
        let previous = self.nanos.fetch_add(dt, Ordering::AcqRel);
        SimTime(Duration::from_nanos(previous.saturating_add(dt)))
    }

    /// Sets the clock back to zero.
    pub fn reset(&self) {
        self.nanos.store(0, Ordering::Release);
    }

    /// Jumps the clock to an arbitrary time.
    pub fn set(&self, time: SimTime) {
        let nanos = u64::try_from(time.as_duration().as_nanos()).unwrap_or(u64::MAX);
        self.nanos.store(nanos, Ordering::Release);
    }
}

impl SimClock for WorldClock {
    fn sim_time(&self) -> SimTime {
        SimTime(Duration::from_nanos(self.nanos.load(Ordering::Acquire)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_is_zero_and_orders_first() {
        assert!(SimTime::ZERO.is_epoch());
        assert!(SimTime::ZERO <= SimTime::from_secs_f64(0.0));
        assert!(SimTime::ZERO < SimTime::from_secs_f64(0.001));
    }

    #[test]
    fn clock_advances_and_resets() {
        let clock = WorldClock::new();
        assert_eq!(clock.sim_time(), SimTime::ZERO);

        let t = clock.advance(Duration::from_millis(250));
        assert_eq!(t, SimTime::from_duration(Duration::from_millis(250)));
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.sim_time().as_secs_f64(), 0.5);

        clock.reset();
        assert_eq!(clock.sim_time(), SimTime::ZERO);

        clock.set(SimTime::from_secs_f64(3.0));
        assert_eq!(clock.sim_time().as_secs_f64(), 3.0);
    }
}
