use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// How an analyze request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Report,
    Incomplete,
    Failed,
}

pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    reports_produced: AtomicUsize,
    incomplete_profiles: AtomicUsize,
    failed_requests: AtomicUsize,

    // Timing (in microseconds)
    total_analysis_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            reports_produced: AtomicUsize::new(0),
            incomplete_profiles: AtomicUsize::new(0),
            failed_requests: AtomicUsize::new(0),
            total_analysis_time_us: AtomicU64::new(0),
        })
    }

    pub fn record_request(&self, outcome: Outcome, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_analysis_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        let counter = match outcome {
            Outcome::Report => &self.reports_produced,
            Outcome::Incomplete => &self.incomplete_profiles,
            Outcome::Failed => &self.failed_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_us = self.total_analysis_time_us.load(Ordering::Relaxed) as f64;

        MetricsSnapshot {
            total_requests,
            reports_produced: self.reports_produced.load(Ordering::Relaxed),
            incomplete_profiles: self.incomplete_profiles.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            avg_analysis_time_ms: if total_requests > 0 {
                total_us / total_requests as f64 / 1000.0 // Convert to ms
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub reports_produced: usize,
    pub incomplete_profiles: usize,
    pub failed_requests: usize,
    pub avg_analysis_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
