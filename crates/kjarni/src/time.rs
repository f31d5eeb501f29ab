//! Tick timing.
//!
//! The [`TickMonitor`] is sampled by the level at the start of every tick.
//! It keeps the last 60 frame intervals and reports their average rate as
//! ticks per second.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default number of frame intervals averaged by [`TickMonitor::tps`].
pub const DEFAULT_SAMPLES: usize = 60;

#[derive(Debug, Clone)]
pub struct TickMonitor {
    /// When the monitor was created.
    startup: Instant,
    /// When the previous tick started.
    last: Option<Instant>,
    /// Duration of the previous tick interval.
    delta: Duration,
    /// Rolling window of tick intervals.
    samples: VecDeque<Duration>,
    capacity: usize,
    /// Ticks sampled so far.
    tick_count: u64,
}

impl TickMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            startup: Instant::now(),
            last: None,
            delta: Duration::ZERO,
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            tick_count: 0,
        }
    }

    /// Record the start of a tick now.
    pub fn sample(&mut self) {
        self.sample_at(Instant::now());
    }

    /// Record the start of a tick at a given instant.
    pub fn sample_at(&mut self, now: Instant) {
        if let Some(last) = self.last {
            self.delta = now.saturating_duration_since(last);
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(self.delta);
        }
        self.last = Some(now);
        self.tick_count += 1;
    }

    /// Average ticks per second over the sample window, 0 until two ticks
    /// have been sampled.
    pub fn tps(&self) -> f32 {
        let total: Duration = self.samples.iter().sum();
        if total.is_zero() {
            0.0
        } else {
            self.samples.len() as f32 / total.as_secs_f32()
        }
    }

    /// Interval between the last two ticks.
    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Time since the monitor was created.
    pub fn elapsed(&self) -> Duration {
        self.startup.elapsed()
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.delta = Duration::ZERO;
        self.samples.clear();
    }
}

impl Default for TickMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rate_before_two_samples() {
        let mut monitor = TickMonitor::default();
        assert_eq!(monitor.tps(), 0.0);
        monitor.sample_at(Instant::now());
        assert_eq!(monitor.tps(), 0.0);
        assert_eq!(monitor.tick_count(), 1);
    }

    #[test]
    fn steady_rate() {
        let mut monitor = TickMonitor::default();
        let start = Instant::now();
        for i in 0..=20 {
            monitor.sample_at(start + Duration::from_millis(50 * i));
        }
        assert!((monitor.tps() - 20.0).abs() < 0.01);
        assert_eq!(monitor.delta(), Duration::from_millis(50));
    }

    #[test]
    fn window_forgets_old_samples() {
        let mut monitor = TickMonitor::new(4);
        let start = Instant::now();
        let mut t = start;
        // Ten slow ticks then four fast ones.
        for _ in 0..10 {
            t += Duration::from_millis(500);
            monitor.sample_at(t);
        }
        for _ in 0..4 {
            t += Duration::from_millis(10);
            monitor.sample_at(t);
        }
        assert!((monitor.tps() - 100.0).abs() < 0.1);
    }
}
