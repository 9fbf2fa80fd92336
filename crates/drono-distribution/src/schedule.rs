//! Schedule computation.
//!
//! A schedule spreads a fixed number of iterations across a wall-clock
//! window following a shape function. Computation is pure: the scheduler
//! turns the resulting offsets into absolute fire times when the
//! distribution starts.

use drono_common::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Shape function used to spread iterations across the window.
///
/// Immutable once a schedule has been generated from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum DistributionPattern {
    /// Entries evenly spaced across the window.
    Uniform,
    /// Entries allocated proportionally more densely inside the peak
    /// sub-interval `[peak_start_hour, peak_end_hour)` of the window,
    /// weighted by `weight`.
    PeakWeighted {
        peak_start_hour: u32,
        peak_end_hour: u32,
        weight: f64,
    },
}

impl DistributionPattern {
    pub fn name(&self) -> &'static str {
        match self {
            DistributionPattern::Uniform => "uniform",
            DistributionPattern::PeakWeighted { .. } => "peak_weighted",
        }
    }

    fn validate(&self, window_hours: u32) -> EngineResult<()> {
        if let DistributionPattern::PeakWeighted {
            peak_start_hour,
            peak_end_hour,
            weight,
        } = self
        {
            if peak_start_hour >= peak_end_hour {
                return Err(EngineError::invalid_configuration(format!(
                    "peak start hour {} must precede peak end hour {}",
                    peak_start_hour, peak_end_hour
                )));
            }
            if *peak_end_hour > window_hours {
                return Err(EngineError::invalid_configuration(format!(
                    "peak end hour {} exceeds window of {} hours",
                    peak_end_hour, window_hours
                )));
            }
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(EngineError::invalid_configuration(
                    "peak weight must be a positive number",
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for DistributionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A computed schedule: the pattern it came from plus the offset of every
/// entry from the window start. Offsets are strictly increasing, the
/// first is at the window start, the last is within the window, and the
/// count equals the requested total exactly.
#[derive(Debug, Clone)]
pub struct TrafficSchedule {
    pattern: DistributionPattern,
    window_hours: u32,
    offsets: Vec<Duration>,
}

impl TrafficSchedule {
    /// Compute a schedule for `total` entries across `window_hours`.
    pub fn generate(
        total: u32,
        window_hours: u32,
        pattern: DistributionPattern,
    ) -> EngineResult<Self> {
        if total == 0 {
            return Err(EngineError::invalid_configuration(
                "schedule requires at least one entry",
            ));
        }
        if window_hours == 0 {
            return Err(EngineError::invalid_configuration(
                "distribution window must be at least one hour",
            ));
        }
        pattern.validate(window_hours)?;

        let window = Duration::from_secs(window_hours as u64 * 3600);
        let offsets = match &pattern {
            DistributionPattern::Uniform => Self::spaced(Duration::ZERO, window, total),
            DistributionPattern::PeakWeighted {
                peak_start_hour,
                peak_end_hour,
                weight,
            } => Self::peak_weighted(
                window_hours,
                *peak_start_hour,
                *peak_end_hour,
                *weight,
                total,
            ),
        };

        debug_assert_eq!(offsets.len(), total as usize);
        Ok(Self {
            pattern,
            window_hours,
            offsets,
        })
    }

    /// Evenly space `count` entries across `[start, start + span)`,
    /// beginning at `start` itself.
    fn spaced(start: Duration, span: Duration, count: u32) -> Vec<Duration> {
        let step = span.as_secs_f64() / count as f64;
        (0..count)
            .map(|i| start + Duration::from_secs_f64(step * i as f64))
            .collect()
    }

    /// Partition the window into leading off-peak, peak, and trailing
    /// off-peak segments and allocate entry counts proportionally to
    /// weighted segment lengths. Fractional peak share rounds down; the
    /// remainder goes to off-peak.
    fn peak_weighted(
        window_hours: u32,
        peak_start_hour: u32,
        peak_end_hour: u32,
        weight: f64,
        total: u32,
    ) -> Vec<Duration> {
        let peak_len = (peak_end_hour - peak_start_hour) as f64;
        let off_len = (window_hours - (peak_end_hour - peak_start_hour)) as f64;
        let lead_len = peak_start_hour as f64;
        let trail_len = (window_hours - peak_end_hour) as f64;

        let weighted_peak = peak_len * weight;
        let peak_count = if off_len == 0.0 {
            total
        } else {
            ((total as f64 * weighted_peak / (weighted_peak + off_len)) as u32).min(total)
        };
        let off_count = total - peak_count;

        // Split off-peak entries across the two off-peak segments by
        // length; the leading segment absorbs the rounding leftover.
        let (lead_count, trail_count) = if off_count == 0 || off_len == 0.0 {
            (0, 0)
        } else if lead_len == 0.0 {
            (0, off_count)
        } else if trail_len == 0.0 {
            (off_count, 0)
        } else {
            let trail = (off_count as f64 * trail_len / off_len) as u32;
            (off_count - trail, trail)
        };

        let hour = Duration::from_secs(3600);
        let mut offsets = Vec::with_capacity(total as usize);
        if lead_count > 0 {
            offsets.extend(Self::spaced(
                Duration::ZERO,
                hour.mul_f64(lead_len),
                lead_count,
            ));
        }
        if peak_count > 0 {
            offsets.extend(Self::spaced(
                hour.mul_f64(lead_len),
                hour.mul_f64(peak_len),
                peak_count,
            ));
        }
        if trail_count > 0 {
            offsets.extend(Self::spaced(
                hour.mul_f64(lead_len + peak_len),
                hour.mul_f64(trail_len),
                trail_count,
            ));
        }
        offsets
    }

    pub fn pattern(&self) -> &DistributionPattern {
        &self.pattern
    }

    pub fn window_hours(&self) -> u32 {
        self.window_hours
    }

    pub fn total(&self) -> u32 {
        self.offsets.len() as u32
    }

    /// Offset of every entry from the window start, strictly increasing.
    pub fn offsets(&self) -> &[Duration] {
        &self.offsets
    }

    /// Average gap between consecutive entries (the whole window divided
    /// by the entry count).
    pub fn average_gap(&self) -> Duration {
        Duration::from_secs(self.window_hours as u64 * 3600) / self.total().max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_strictly_increasing(offsets: &[Duration]) {
        for pair in offsets.windows(2) {
            assert!(pair[0] < pair[1], "offsets not strictly increasing");
        }
    }

    #[test]
    fn test_uniform_schedule_shape() {
        let schedule = TrafficSchedule::generate(100, 10, DistributionPattern::Uniform).unwrap();

        let offsets = schedule.offsets();
        assert_eq!(offsets.len(), 100);
        assert_strictly_increasing(offsets);
        assert_eq!(offsets[0], Duration::ZERO);
        assert!(*offsets.last().unwrap() <= Duration::from_secs(10 * 3600));

        // Even spacing: every gap equals the window divided by the total
        let expected_gap = Duration::from_secs(10 * 3600) / 100;
        for pair in offsets.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap >= expected_gap - Duration::from_millis(1)
                    && gap <= expected_gap + Duration::from_millis(1)
            );
        }
    }

    #[test]
    fn test_peak_weighted_density_is_higher_in_peak() {
        let pattern = DistributionPattern::PeakWeighted {
            peak_start_hour: 2,
            peak_end_hour: 4,
            weight: 3.0,
        };
        let schedule = TrafficSchedule::generate(100, 10, pattern).unwrap();

        let offsets = schedule.offsets();
        assert_eq!(offsets.len(), 100);
        assert_strictly_increasing(offsets);
        assert!(*offsets.last().unwrap() <= Duration::from_secs(10 * 3600));

        let peak_start = Duration::from_secs(2 * 3600);
        let peak_end = Duration::from_secs(4 * 3600);
        let in_peak = offsets
            .iter()
            .filter(|o| **o >= peak_start && **o < peak_end)
            .count() as f64;
        let outside = offsets.len() as f64 - in_peak;

        // Density: entries per hour inside the 2h peak vs. the 8h remainder
        assert!(
            in_peak / 2.0 > outside / 8.0,
            "peak density {} <= off-peak density {}",
            in_peak / 2.0,
            outside / 8.0
        );
    }

    #[test]
    fn test_peak_share_rounds_down() {
        // 10 entries, peak 2h of 10h, weight 3: raw peak share is
        // 10 * 6/14 = 4.28..., so exactly 4 land in the peak.
        let pattern = DistributionPattern::PeakWeighted {
            peak_start_hour: 2,
            peak_end_hour: 4,
            weight: 3.0,
        };
        let schedule = TrafficSchedule::generate(10, 10, pattern).unwrap();

        let peak_start = Duration::from_secs(2 * 3600);
        let peak_end = Duration::from_secs(4 * 3600);
        let in_peak = schedule
            .offsets()
            .iter()
            .filter(|o| **o >= peak_start && **o < peak_end)
            .count();
        assert_eq!(in_peak, 4);
        assert_eq!(schedule.total(), 10);
    }

    #[test]
    fn test_peak_at_window_edges() {
        // Peak starting at hour zero: no leading off-peak segment
        let pattern = DistributionPattern::PeakWeighted {
            peak_start_hour: 0,
            peak_end_hour: 2,
            weight: 2.0,
        };
        let schedule = TrafficSchedule::generate(20, 4, pattern).unwrap();
        assert_eq!(schedule.total(), 20);
        assert_strictly_increasing(schedule.offsets());

        // Peak ending at the window end: no trailing segment
        let pattern = DistributionPattern::PeakWeighted {
            peak_start_hour: 2,
            peak_end_hour: 4,
            weight: 2.0,
        };
        let schedule = TrafficSchedule::generate(20, 4, pattern).unwrap();
        assert_eq!(schedule.total(), 20);
        assert_strictly_increasing(schedule.offsets());
    }

    #[test]
    fn test_peak_covering_whole_window() {
        let pattern = DistributionPattern::PeakWeighted {
            peak_start_hour: 0,
            peak_end_hour: 5,
            weight: 4.0,
        };
        let schedule = TrafficSchedule::generate(25, 5, pattern).unwrap();
        assert_eq!(schedule.total(), 25);
        assert_strictly_increasing(schedule.offsets());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(TrafficSchedule::generate(0, 10, DistributionPattern::Uniform).is_err());
        assert!(TrafficSchedule::generate(10, 0, DistributionPattern::Uniform).is_err());

        let inverted_peak = DistributionPattern::PeakWeighted {
            peak_start_hour: 4,
            peak_end_hour: 2,
            weight: 3.0,
        };
        assert!(TrafficSchedule::generate(10, 10, inverted_peak).is_err());

        let peak_outside_window = DistributionPattern::PeakWeighted {
            peak_start_hour: 2,
            peak_end_hour: 12,
            weight: 3.0,
        };
        assert!(TrafficSchedule::generate(10, 10, peak_outside_window).is_err());

        let bad_weight = DistributionPattern::PeakWeighted {
            peak_start_hour: 2,
            peak_end_hour: 4,
            weight: 0.0,
        };
        assert!(TrafficSchedule::generate(10, 10, bad_weight).is_err());
    }

    #[test]
    fn test_single_entry_schedule() {
        let schedule = TrafficSchedule::generate(1, 1, DistributionPattern::Uniform).unwrap();
        assert_eq!(schedule.offsets(), &[Duration::ZERO]);
        assert_eq!(schedule.average_gap(), Duration::from_secs(3600));
    }
}
