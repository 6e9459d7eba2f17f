use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default averaging window.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default sample cap.
const DEFAULT_MAX_SAMPLES: usize = 100;

struct Sample {
    bytes: u64,
    at: Instant,
}

/// Sliding-window transfer rate over recently sent chunks.
///
/// Owned by a single upload session, so no interior locking.
pub struct ThroughputMeter {
    samples: VecDeque<Sample>,
    window: Duration,
    max_samples: usize,
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl ThroughputMeter {
    /// Creates a meter.
    ///
    /// - `window`: time span averaged over (default 5 s).
    /// - `max_samples`: retained samples (default 100).
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            window: window.unwrap_or(DEFAULT_WINDOW),
            max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(2),
        }
    }

    /// Records `bytes` sent now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(bytes, Instant::now());
    }

    fn record_at(&mut self, bytes: u64, at: Instant) {
        self.samples.push_back(Sample { bytes, at });
        while let Some(front) = self.samples.front() {
            if at.duration_since(front.at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Average rate in bytes/second; `0.0` until two samples exist.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }
        let elapsed = last.at.duration_since(first.at);
        if elapsed.is_zero() {
            return 0.0;
        }
        // The first sample only marks the window start.
        let bytes: u64 = self.samples.iter().skip(1).map(|s| s.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to send `remaining` bytes, `None` while the rate is unknown.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
