//! Time as an injected dependency.
//!
//! Everything in the orchestrator that reads the time or waits goes through a
//! [`Clock`], so tests drive the health-convergence wait with [`ManualClock`]
//! instead of sleeping for real.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time and tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

/// A clock that only moves when told to. `sleep` returns immediately after
/// advancing the clock by the requested duration.
///
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// `now + duration`, saturating at the latest representable instant.
fn advanced(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: start,
                sleeps: Vec::new(),
            })),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.now = advanced(state.now, duration);
    }

    /// Every duration passed to [`Clock::sleep`], in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Total time advanced through [`Clock::sleep`].
    pub fn slept(&self) -> Duration {
        self.lock().sleeps.iter().sum()
    }

    /// A timestamp source for a simulated provider sharing this clock.
    ///
    /// Each reading returns the current time and then moves the clock forward
    /// by one millisecond, so anything stamped by the provider is strictly
    /// earlier than the orchestrator's next reading.
    pub fn ticking_source(&self) -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
        let clock = self.clone();
        move || {
            let mut state = clock.lock();
            let stamp = state.now;
            state.now = advanced(state.now, Duration::from_millis(1));
            stamp
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.now = advanced(state.now, duration);
        state.sleeps.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_time() {
        let start = Utc::now();
        let clock = ManualClock::new(start);

        clock.sleep(Duration::from_secs(15)).await;
        clock.sleep(Duration::from_secs(15)).await;

        assert_eq!(clock.now() - start, chrono::Duration::seconds(30));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(15); 2]);
        assert_eq!(clock.slept(), Duration::from_secs(30));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let other = clock.clone();

        other.advance(Duration::from_secs(5));
        assert_eq!(clock.now() - start, chrono::Duration::seconds(5));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_ticking_source_stamps_before_advancing() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let source = clock.ticking_source();

        assert_eq!(source(), start);
        assert!(clock.now() > start);
        assert_eq!(source(), start + chrono::Duration::milliseconds(1));
    }

    #[tokio::test]
    async fn test_manual_clock_saturates_on_huge_durations() {
        let clock = ManualClock::default();
        clock.sleep(Duration::MAX).await;
        assert_eq!(clock.now(), DateTime::<Utc>::MAX_UTC);

        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_manual_clock_keeps_sub_millisecond_precision() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(Duration::from_micros(1500));
        assert_eq!(clock.now() - start, chrono::Duration::microseconds(1500));
    }

    #[tokio::test]
    async fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let before = clock.now();
        clock.sleep(Duration::from_millis(5)).await;
        assert!(clock.now() >= before);
    }
}
