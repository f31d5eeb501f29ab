//! Fixed-period driver.
//!
//! A [`Ticker`] never skips: if the host falls behind, [`Ticker::poll`]
//! keeps returning `true` until every missed tick has run, back to back.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self::starting_at(period, Instant::now())
    }

    /// First tick is due at `start`.
    pub fn starting_at(period: Duration, start: Instant) -> Self {
        Self {
            period: period.max(Duration::from_micros(1)),
            next: start,
        }
    }

    /// A ticker running `rate` times per second. Zero counts as 1.
    pub fn from_rate(rate: u32) -> Self {
        Self::new(Duration::from_secs(1) / rate.max(1))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// When the next tick is due.
    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// `true` if a tick is due at `now`; the deadline advances by exactly
    /// one period.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.period;
        true
    }

    /// Sleep until the next deadline (returns at once if overdue), then
    /// consume it.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if now < self.next {
            std::thread::sleep(self.next - now);
        }
        self.next += self.period;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_period() {
        let start = Instant::now();
        let mut ticker = Ticker::starting_at(Duration::from_millis(10), start);
        assert!(ticker.poll(start));
        assert!(!ticker.poll(start + Duration::from_millis(5)));
        assert!(ticker.poll(start + Duration::from_millis(10)));
    }

    #[test]
    fn late_ticks_run_back_to_back() {
        let start = Instant::now();
        let mut ticker = Ticker::starting_at(Duration::from_millis(10), start);
        let late = start + Duration::from_millis(35);
        let mut fired = 0;
        while ticker.poll(late) {
            fired += 1;
        }
        assert_eq!(fired, 4);
        assert_eq!(ticker.deadline(), start + Duration::from_millis(40));
    }

    #[test]
    fn zero_rate_is_one_hertz() {
        assert_eq!(Ticker::from_rate(0).period(), Duration::from_secs(1));
        assert_eq!(Ticker::from_rate(50).period(), Duration::from_millis(20));
    }
}
