//! Time-windowed statistics: a ring buffer of per-bucket stats.
//!
//! The ring needs no background maintenance; every access first advances the
//! current bucket to cover the time elapsed since the previous operation,
//! zeroing the buckets it passes.

use serde::Serialize;

/// One bucket's worth of serving statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stat {
    /// Completed responses.
    pub request_count: u64,
    /// Cumulative wall time from first byte received to last byte out.
    pub request_duration_ms: u64,
    pub request_max_ms: u64,
    /// Completed adaptor invocations.
    pub processing_count: u64,
    /// Cumulative time spent inside the adaptor producing a response.
    pub processing_duration_ms: u64,
    pub processing_max_ms: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl Stat {
    pub fn add_request(&mut self, duration_ms: u64) {
        self.request_count += 1;
        self.request_duration_ms += duration_ms;
        self.request_max_ms = self.request_max_ms.max(duration_ms);
    }

    pub fn add_processing(&mut self, duration_ms: u64) {
        self.processing_count += 1;
        self.processing_duration_ms += duration_ms;
        self.processing_max_ms = self.processing_max_ms.max(duration_ms);
    }
}

/// Ring buffer of [`Stat`] buckets of equal duration.
#[derive(Debug, Clone)]
pub struct StatWindow {
    stats: Vec<Stat>,
    bucket_ms: u64,
    current: usize,
    /// Exclusive end (epoch ms) of the bucket at `current`.
    pending_end_ms: u64,
}

/// Read-only copy of one window, oldest bucket first.
#[derive(Debug, Clone, Serialize)]
pub struct WindowSnapshot {
    pub bucket_ms: u64,
    pub stats: Vec<Stat>,
}

impl StatWindow {
    pub fn new(num_buckets: usize, bucket_ms: u64, now_ms: u64) -> Self {
        assert!(num_buckets > 0 && bucket_ms > 0);
        Self {
            stats: vec![Stat::default(); num_buckets],
            bucket_ms,
            current: 0,
            pending_end_ms: align_up(now_ms, bucket_ms),
        }
    }

    pub fn span_ms(&self) -> u64 {
        self.bucket_ms * self.stats.len() as u64
    }

    /// The bucket covering `now_ms`, rotating the ring as needed.
    pub fn current_stat(&mut self, now_ms: u64) -> &mut Stat {
        if now_ms >= self.pending_end_ms {
            if now_ms - self.pending_end_ms >= self.span_ms() {
                // So much time passed that every bucket is stale.
                for stat in &mut self.stats {
                    *stat = Stat::default();
                }
                self.pending_end_ms = align_up(now_ms, self.bucket_ms);
            } else {
                while self.pending_end_ms <= now_ms {
                    self.current = (self.current + 1) % self.stats.len();
                    self.stats[self.current] = Stat::default();
                    self.pending_end_ms += self.bucket_ms;
                }
            }
        }
        &mut self.stats[self.current]
    }

    /// Deep copy, oldest bucket first, after rotating up to `now_ms`.
    pub fn snapshot(&mut self, now_ms: u64) -> WindowSnapshot {
        let _ = self.current_stat(now_ms);
        let len = self.stats.len();
        let mut stats = Vec::with_capacity(len);
        for i in 0..len {
            stats.push(self.stats[(self.current + 1 + i) % len]);
        }
        WindowSnapshot {
            bucket_ms: self.bucket_ms,
            stats,
        }
    }
}

fn align_up(now_ms: u64, bucket_ms: u64) -> u64 {
    (now_ms / bucket_ms + 1) * bucket_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bucket_accumulates() {
        let mut w = StatWindow::new(5, 1000, 0);
        w.current_stat(100).add_request(10);
        w.current_stat(900).add_request(30);
        let stat = *w.current_stat(999);
        assert_eq!(stat.request_count, 2);
        assert_eq!(stat.request_duration_ms, 40);
        assert_eq!(stat.request_max_ms, 30);
    }

    #[test]
    fn advancing_resets_passed_buckets() {
        let mut w = StatWindow::new(3, 1000, 0);
        w.current_stat(500).add_request(1);
        // Two buckets later: the skipped bucket must be zero.
        w.current_stat(2500).add_request(7);
        let snap = w.snapshot(2500);
        let counts: Vec<u64> = snap.stats.iter().map(|s| s.request_count).collect();
        assert_eq!(counts, vec![1, 0, 1]);
    }

    #[test]
    fn overshoot_resets_everything() {
        let mut w = StatWindow::new(3, 1000, 0);
        w.current_stat(100).add_request(1);
        // Far beyond the full 3 s span.
        let stat = *w.current_stat(60_000);
        assert_eq!(stat, Stat::default());
        let total: u64 = w.snapshot(60_000).stats.iter().map(|s| s.request_count).sum();
        assert_eq!(total, 0);
    }

    #[test]
    fn realignment_lands_on_a_bucket_boundary() {
        let mut w = StatWindow::new(3, 1000, 0);
        let _ = w.current_stat(60_250);
        assert_eq!(w.pending_end_ms, 61_000);
    }

    #[test]
    fn wraparound_keeps_newest_last_in_snapshot() {
        let mut w = StatWindow::new(3, 1000, 0);
        for (t, d) in [(100, 1), (1100, 2), (2100, 3), (3100, 4)] {
            w.current_stat(t).add_request(d);
        }
        let snap = w.snapshot(3100);
        let maxes: Vec<u64> = snap.stats.iter().map(|s| s.request_max_ms).collect();
        assert_eq!(maxes, vec![2, 3, 4]);
    }
}
