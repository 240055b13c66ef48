//! Torque monitor implementation
//!
//! Instantaneous readings drive the stall decision; the exponentially
//! weighted average is only for telemetry.

use crate::config::MAX_AXIS_CHANNELS;

/// Default smoothing factor
pub const DEFAULT_ALPHA: f32 = 0.2;

/// Readings above this magnitude are treated as invalid
pub const MAX_VALID_EFFORT: f32 = 100.0;

#[derive(Debug, Clone, Copy, Default)]
struct ChannelSample {
    /// None until the first valid reading after a reset
    smoothed: Option<f32>,
    /// Last instantaneous reading, zero when invalid
    raw: f32,
    /// Channel was stepping when sampled
    stepping: bool,
}

/// Per-channel effort tracking for one axis
#[derive(Debug, Clone)]
pub struct TorqueMonitor {
    alpha: f32,
    count: usize,
    channels: [ChannelSample; MAX_AXIS_CHANNELS],
}

impl TorqueMonitor {
    /// Create a monitor for `count` channels
    ///
    /// `count` is clamped to [`MAX_AXIS_CHANNELS`]; an `alpha` outside
    /// (0, 1] falls back to [`DEFAULT_ALPHA`].
    pub fn new(count: usize, alpha: f32) -> Self {
        let alpha = if alpha > 0.0 && alpha <= 1.0 {
            alpha
        } else {
            DEFAULT_ALPHA
        };
        Self {
            alpha,
            count: count.min(MAX_AXIS_CHANNELS),
            channels: [ChannelSample::default(); MAX_AXIS_CHANNELS],
        }
    }

    /// Number of monitored channels
    pub fn channel_count(&self) -> usize {
        self.count
    }

    /// Record one effort reading
    ///
    /// Invalid readings (missing, non-finite or beyond ±100 %) count as
    /// zero effort and leave the smoothed average untouched.
    pub fn sample(&mut self, channel: usize, reading: Option<f32>, stepping: bool) {
        if channel >= self.count {
            return;
        }
        let alpha = self.alpha;
        let sample = &mut self.channels[channel];
        sample.stepping = stepping;

        match reading.filter(|r| r.is_finite() && libm::fabsf(*r) <= MAX_VALID_EFFORT) {
            Some(raw) => {
                sample.raw = raw;
                sample.smoothed = Some(match sample.smoothed {
                    Some(prev) => alpha * raw + (1.0 - alpha) * prev,
                    None => raw,
                });
            }
            None => sample.raw = 0.0,
        }
    }

    /// Check if the last reading exceeds `limit` while stepping
    pub fn check_limit(&self, channel: usize, limit: f32) -> bool {
        if channel >= self.count {
            return false;
        }
        let sample = &self.channels[channel];
        sample.stepping && libm::fabsf(sample.raw) > limit
    }

    /// Smoothed effort, None before the first valid reading
    pub fn smoothed(&self, channel: usize) -> Option<f32> {
        self.channels.get(..self.count)?.get(channel)?.smoothed
    }

    /// Last instantaneous effort reading
    pub fn raw(&self, channel: usize) -> f32 {
        if channel >= self.count {
            return 0.0;
        }
        self.channels[channel].raw
    }

    /// Clear all smoothing state
    pub fn reset(&mut self) {
        self.channels = [ChannelSample::default(); MAX_AXIS_CHANNELS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_sample_initializes() {
        let mut monitor = TorqueMonitor::new(1, 0.2);
        assert_eq!(monitor.smoothed(0), None);
        monitor.sample(0, Some(40.0), true);
        assert_eq!(monitor.smoothed(0), Some(40.0));
    }

    #[test]
    fn test_ewma_update() {
        let mut monitor = TorqueMonitor::new(1, 0.2);
        monitor.sample(0, Some(10.0), true);
        monitor.sample(0, Some(20.0), true);
        let smoothed = monitor.smoothed(0).unwrap();
        assert!((smoothed - 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_readings_keep_average() {
        let mut monitor = TorqueMonitor::new(1, 0.2);
        monitor.sample(0, Some(30.0), true);

        for reading in [None, Some(f32::NAN), Some(f32::INFINITY), Some(150.0), Some(-101.0)] {
            monitor.sample(0, reading, true);
            assert_eq!(monitor.smoothed(0), Some(30.0));
            assert_eq!(monitor.raw(0), 0.0);
            assert!(!monitor.check_limit(0, 10.0));
        }
    }

    #[test]
    fn test_limit_uses_instantaneous_reading() {
        let mut monitor = TorqueMonitor::new(1, 0.2);
        monitor.sample(0, Some(5.0), true);
        monitor.sample(0, Some(60.0), true);

        // Average is still well below the limit
        assert!(monitor.smoothed(0).unwrap() < 50.0);
        assert!(monitor.check_limit(0, 50.0));
    }

    #[test]
    fn test_limit_uses_magnitude() {
        let mut monitor = TorqueMonitor::new(1, 0.2);
        monitor.sample(0, Some(-70.0), true);
        assert!(monitor.check_limit(0, 50.0));
    }

    #[test]
    fn test_limit_requires_stepping() {
        let mut monitor = TorqueMonitor::new(1, 0.2);
        monitor.sample(0, Some(90.0), false);
        assert!(!monitor.check_limit(0, 50.0));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut monitor = TorqueMonitor::new(2, 0.2);
        monitor.sample(0, Some(10.0), true);
        monitor.sample(1, Some(80.0), true);
        assert!(!monitor.check_limit(0, 50.0));
        assert!(monitor.check_limit(1, 50.0));
        assert_eq!(monitor.smoothed(0), Some(10.0));
    }

    #[test]
    fn test_out_of_range_channel() {
        let mut monitor = TorqueMonitor::new(1, 0.2);
        monitor.sample(3, Some(80.0), true);
        assert_eq!(monitor.smoothed(1), None);
        assert!(!monitor.check_limit(1, 0.0));
    }

    #[test]
    fn test_reset() {
        let mut monitor = TorqueMonitor::new(1, 0.2);
        monitor.sample(0, Some(80.0), true);
        monitor.reset();
        assert_eq!(monitor.smoothed(0), None);
        assert!(!monitor.check_limit(0, 50.0));
    }

    proptest! {
        #[test]
        fn test_constant_input_converges(value in -100.0f32..100.0, prev in -100.0f32..100.0) {
            let mut monitor = TorqueMonitor::new(1, 0.2);
            monitor.sample(0, Some(prev), true);
            for _ in 0..200 {
                monitor.sample(0, Some(value), true);
            }
            let smoothed = monitor.smoothed(0).unwrap();
            prop_assert!((smoothed - value).abs() < 0.01);
        }

        #[test]
        fn test_average_stays_within_readings(readings in proptest::collection::vec(-100.0f32..100.0, 1..50)) {
            let mut monitor = TorqueMonitor::new(1, 0.2);
            for r in &readings {
                monitor.sample(0, Some(*r), true);
            }
            let min = readings.iter().cloned().fold(f32::MAX, f32::min);
            let max = readings.iter().cloned().fold(f32::MIN, f32::max);
            let smoothed = monitor.smoothed(0).unwrap();
            prop_assert!(smoothed >= min - 1e-3 && smoothed <= max + 1e-3);
        }
    }
}
