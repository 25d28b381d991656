//! Sliding-window throughput.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Default averaging window.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_millis(1000);

/// Throughput snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateSample {
    /// Average over the retained window.
    pub bytes_per_sec: f64,
    /// Every byte ever registered.
    pub total_bytes: u64,
}

impl RateSample {
    pub fn megabytes_per_sec(&self) -> f64 {
        self.bytes_per_sec / 1e6
    }

    pub fn total_megabytes(&self) -> f64 {
        self.total_bytes as f64 / 1e6
    }
}

/// Moving-average byte rate over a bounded time window, plus a running total.
#[derive(Debug, Clone)]
pub struct RateStats {
    window: Duration,
    history: VecDeque<(Instant, u64)>,
    total_bytes: u64,
}

impl Default for RateStats {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_WINDOW)
    }
}

impl RateStats {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            history: VecDeque::new(),
            total_bytes: 0,
        }
    }

    /// Record `bytes` read now.
    pub fn register(&mut self, bytes: usize) {
        self.register_at(Instant::now(), bytes);
    }

    /// Record `bytes` read at `now`.
    pub fn register_at(&mut self, now: Instant, bytes: usize) {
        let bytes = bytes as u64;
        self.history.push_back((now, bytes));
        self.total_bytes += bytes;
        self.evict(now);
    }

    /// Current average and total.
    pub fn result(&mut self) -> RateSample {
        self.result_at(Instant::now())
    }

    /// Average and total as seen at `now`.
    pub fn result_at(&mut self, now: Instant) -> RateSample {
        self.evict(now);

        let in_window: u64 = self.history.iter().map(|(_, bytes)| bytes).sum();
        let effective = match self.history.front() {
            Some((oldest, _)) => now.saturating_duration_since(*oldest),
            None => self.window,
        };
        let bytes_per_sec = if effective.is_zero() {
            0.0
        } else {
            in_window as f64 / effective.as_secs_f64()
        };

        RateSample {
            bytes_per_sec,
            total_bytes: self.total_bytes,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn evict(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while self
            .history
            .front()
            .is_some_and(|(stamp, _)| *stamp < cutoff)
        {
            self.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_rate_converges() {
        let start = Instant::now();
        let mut stats = RateStats::new(Duration::from_millis(1000));

        // 1000 bytes every millisecond for three seconds: 1 MB/s.
        let mut now = start;
        for _ in 0..3000 {
            now += Duration::from_millis(1);
            stats.register_at(now, 1000);
        }

        let sample = stats.result_at(now);
        let expected = 1_000_000.0;
        assert!(
            (sample.bytes_per_sec - expected).abs() / expected < 0.01,
            "rate {} not within 1% of {expected}",
            sample.bytes_per_sec
        );
        assert_eq!(sample.total_bytes, 3_000_000);
    }

    #[test]
    fn total_survives_eviction() {
        let start = Instant::now();
        let mut stats = RateStats::new(Duration::from_millis(100));

        stats.register_at(start, 7);
        stats.register_at(start + Duration::from_millis(500), 11);
        stats.register_at(start + Duration::from_millis(900), 13);

        let sample = stats.result_at(start + Duration::from_secs(10));
        assert_eq!(sample.total_bytes, 31);
        assert_eq!(sample.bytes_per_sec, 0.0);
        assert_eq!(stats.total_bytes(), 31);
    }

    #[test]
    fn empty_window_reports_zero() {
        let mut stats = RateStats::default();
        let sample = stats.result();
        assert_eq!(sample.bytes_per_sec, 0.0);
        assert_eq!(sample.total_bytes, 0);
        assert_eq!(stats.window(), DEFAULT_RATE_WINDOW);
    }

    #[test]
    fn single_sample_at_now_reports_zero() {
        let now = Instant::now();
        let mut stats = RateStats::default();
        stats.register_at(now, 4096);
        assert_eq!(stats.result_at(now).bytes_per_sec, 0.0);
    }

    #[test]
    fn effective_window_is_age_of_oldest() {
        let start = Instant::now();
        let mut stats = RateStats::new(Duration::from_secs(1));
        stats.register_at(start, 500);
        stats.register_at(start + Duration::from_millis(250), 500);

        let sample = stats.result_at(start + Duration::from_millis(500));
        assert!((sample.bytes_per_sec - 2000.0).abs() < 1e-6);
        assert!((sample.megabytes_per_sec() - 0.002).abs() < 1e-9);
        assert!((sample.total_megabytes() - 0.001).abs() < 1e-9);
    }
}
