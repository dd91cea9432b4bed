//! Sliding-window hashrate meter. Seal workers push attempt counts in
//! batches; readers get a hashes-per-second figure over the window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

pub struct HashrateMeter {
    window: Duration,
    samples: Mutex<VecDeque<(Instant, u64)>>,
}

impl Default for HashrateMeter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl HashrateMeter {
    pub fn new(window: Duration) -> HashrateMeter {
        HashrateMeter {
            window,
            samples: Mutex::new(VecDeque::with_capacity(128)),
        }
    }

    /// Record `attempts` hashes done since the last mark.
    pub fn mark(&self, attempts: u64) {
        if attempts == 0 {
            return;
        }
        let mut samples = self.samples.lock();
        let now = Instant::now();
        samples.push_back((now, attempts));
        let cutoff = now - self.window;
        while samples.front().map_or(false, |(ts, _)| *ts < cutoff) {
            samples.pop_front();
        }
    }

    /// Hashes per second over the sample window.
    pub fn rate(&self) -> f64 {
        let samples = self.samples.lock();
        let (Some((oldest, _)), Some((newest, _))) = (samples.front(), samples.back()) else {
            return 0.0;
        };
        let total: u64 = samples.iter().map(|(_, n)| n).sum();
        let span = newest.duration_since(*oldest).as_secs_f64().max(1.0);
        total as f64 / span
    }
}
