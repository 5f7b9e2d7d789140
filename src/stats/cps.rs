//! Counts-per-second over a sliding window.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Period {
    start: Instant,
    count: u64,
}

/// Rate of some repeating event (poll cycles, frames, requests), averaged
/// over the last `window` in 100 ms periods.
#[derive(Debug)]
pub struct CpsCalculator {
    window: Duration,
    periods: Mutex<VecDeque<Period>>,
}

impl CpsCalculator {
    /// Calculator averaging over `window`.
    pub fn new(window: Duration) -> Self {
        Self::new_at(window, Instant::now())
    }

    /// Like [`CpsCalculator::new`] with an explicit clock.
    pub fn new_at(window: Duration, now: Instant) -> Self {
        let mut periods = VecDeque::new();
        periods.push_back(Period {
            start: now,
            count: 0,
        });
        Self {
            window,
            periods: Mutex::new(periods),
        }
    }

    /// Count one cycle.
    pub fn increment(&self) {
        self.increment_at(Instant::now());
    }

    /// Count one cycle at `now`.
    pub fn increment_at(&self, now: Instant) {
        let mut periods = self.periods.lock();
        self.roll(&mut periods, now);
        if let Some(current) = periods.back_mut() {
            current.count += 1;
        }
    }

    /// Current rate per second.
    pub fn cps(&self) -> f64 {
        self.cps_at(Instant::now())
    }

    /// Like [`CpsCalculator::cps`] with an explicit clock.
    pub fn cps_at(&self, now: Instant) -> f64 {
        let mut periods = self.periods.lock();
        self.roll(&mut periods, now);

        let span = periods
            .front()
            .map(|first| now.saturating_duration_since(first.start))
            .unwrap_or_default();
        if span.is_zero() {
            return 0.0;
        }
        let total: u64 = periods.iter().map(|p| p.count).sum();
        total as f64 / span.as_secs_f64()
    }

    fn roll(&self, periods: &mut VecDeque<Period>, now: Instant) {
        if let Some(cutoff) = now.checked_sub(self.window) {
            while periods.front().is_some_and(|p| p.start < cutoff) {
                periods.pop_front();
            }
        }
        let stale = periods
            .back()
            .map_or(true, |p| now.saturating_duration_since(p.start) >= PERIOD);
        if stale {
            periods.push_back(Period {
                start: now,
                count: 0,
            });
        }
    }
}

impl Default for CpsCalculator {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
