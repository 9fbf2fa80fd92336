//! # Drono Timing
//!
//! Randomized timing source for the traffic engine.
//!
//! The session controller draws the delay before each iteration from
//! [`TimingDistributor::next_interval`]. The dwell-time and scroll draws
//! exist for fetch clients that emulate an embedded browser and want
//! page interactions to look organic; the controller itself never calls
//! them.

use rand::Rng;
use std::f64::consts::PI;
use std::time::Duration;

/// Default minimum delay between iterations.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(30);

/// Default maximum delay between iterations.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(120);

/// Default mean simulated reading time for browser-emulated fetches.
pub const DEFAULT_DWELL_MEAN: Duration = Duration::from_secs(30);

/// Default reading-time standard deviation.
pub const DEFAULT_DWELL_STDDEV: Duration = Duration::from_secs(15);

/// Default probability that a simulated visit scrolls the page.
pub const DEFAULT_SCROLL_PROBABILITY: f64 = 0.8;

/// Timing distributor with configurable inter-iteration bounds.
///
/// Holds no state beyond its configured bounds; every draw is independent.
/// Reconfiguring the bounds takes effect on the next draw, never
/// retroactively.
#[derive(Debug, Clone)]
pub struct TimingDistributor {
    min_interval: Duration,
    max_interval: Duration,
}

impl Default for TimingDistributor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL, DEFAULT_MAX_INTERVAL)
    }
}

impl TimingDistributor {
    /// Create a distributor with the given inter-iteration bounds.
    ///
    /// Bounds are taken as given; validation happens at session
    /// configuration time so invalid ranges are rejected before a session
    /// starts.
    pub fn new(min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            min_interval,
            max_interval,
        }
    }

    /// Current minimum delay bound.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Current maximum delay bound.
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Reconfigure the delay bounds. Affects the next draw only.
    pub fn set_delay_range(&mut self, min_interval: Duration, max_interval: Duration) {
        self.min_interval = min_interval;
        self.max_interval = max_interval;
        tracing::debug!(
            "Delay range set to {}ms..{}ms",
            min_interval.as_millis(),
            max_interval.as_millis()
        );
    }

    /// Draw the delay before the next iteration, uniform over
    /// `[min_interval, max_interval]` (inclusive).
    pub fn next_interval(&self) -> Duration {
        let min_ms = self.min_interval.as_millis() as u64;
        let max_ms = self.max_interval.as_millis() as u64;
        if min_ms >= max_ms {
            return self.min_interval;
        }
        let ms = rand::thread_rng().gen_range(min_ms..=max_ms);
        Duration::from_millis(ms)
    }

    /// Draw a simulated page dwell time from a normal distribution
    /// (Box-Muller), clamped to a non-negative floor.
    pub fn next_dwell_time(&self, mean: Duration, stddev: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen_range(0.0..1.0);
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();

        let dwell_ms = mean.as_millis() as f64 + z * stddev.as_millis() as f64;
        if dwell_ms <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_millis(dwell_ms as u64)
        }
    }

    /// Decide whether a simulated visit should scroll the page.
    pub fn should_scroll(&self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        rand::thread_rng().gen_bool(probability)
    }
}
