/// Light level smoothing and derived day/colour labels
use log::{info, warn};
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use crate::error::SensorError;
use crate::models::{ColorProfile, ColorTone, Daylight, Measurement, SensorFault};
use crate::sensors::{ColorSample, LightProbe};
use crate::utils::round_to;

/// Sliding-window median over the most recent raw samples.
///
/// A median rejects a single transient glint on an optical sensor that a
/// mean would smear across the whole window.
#[derive(Debug, Clone)]
pub struct RobustAnalogStabilizer {
    window: VecDeque<f32>,
    capacity: usize,
}

impl RobustAnalogStabilizer {
    pub fn new(capacity: NonZeroUsize) -> Self {
        RobustAnalogStabilizer {
            window: VecDeque::with_capacity(capacity.get()),
            capacity: capacity.get(),
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);
    }

    /// Median of the current window, `None` before the first push.
    pub fn stable_value(&self) -> Option<f32> {
        if self.window.is_empty() {
            return None;
        }

        let mut sorted: Vec<f32> = self.window.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 1 {
            Some(sorted[mid])
        } else {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }
}

/// Result of one light measurement with its derived labels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightReading {
    pub level: Measurement<f32>,
    pub daylight: Option<Daylight>,
    pub color: Option<ColorProfile>,
}

/// Normalise the colour channels against the clear channel.
pub fn color_profile(sample: &ColorSample) -> ColorProfile {
    let scale = |channel: u32| -> u8 {
        if sample.clear == 0 {
            return 0;
        }
        (channel as f32 / sample.clear as f32 * 255.0)
            .round()
            .clamp(0.0, 255.0) as u8
    };

    let (red, green, blue) = (scale(sample.red), scale(sample.green), scale(sample.blue));
    let tone = if red == 0 || blue == 0 {
        ColorTone::Neutral
    } else if red > blue {
        ColorTone::Warm
    } else {
        ColorTone::Cool
    };

    ColorProfile {
        red,
        green,
        blue,
        tone,
    }
}

/// Ambient light sensor: raw clear channel through the stabiliser, scaled
/// so that `full_scale` counts read as 100 %.
pub struct LightMeter<P> {
    sensor: P,
    stabilizer: RobustAnalogStabilizer,
    full_scale: f32,
}

impl<P: LightProbe> LightMeter<P> {
    pub fn new(sensor: P, window: NonZeroUsize, full_scale: f32) -> Self {
        LightMeter {
            sensor,
            stabilizer: RobustAnalogStabilizer::new(window),
            full_scale,
        }
    }

    /// Take `samples` reads to prime the stabiliser and log the reference
    /// level. Fails only when not a single read succeeds.
    pub fn calibrate(&mut self, samples: usize, delay: Duration) -> Result<f32, SensorError> {
        let mut readings = Vec::with_capacity(samples);

        for i in 0..samples.max(1) {
            match self.sensor.read_color() {
                Ok(sample) => readings.push(sample.clear as f32),
                Err(e) => {
                    warn!("Light calibration read {} failed: {}", i + 1, e);
                }
            }
            if i + 1 < samples && !delay.is_zero() {
                thread::sleep(delay);
            }
        }

        if readings.is_empty() {
            return Err(SensorError::Uncalibrated("light"));
        }

        let mut reference = RobustAnalogStabilizer::new(
            NonZeroUsize::new(readings.len()).unwrap_or(NonZeroUsize::MIN),
        );
        for value in &readings {
            reference.push(*value);
            self.stabilizer.push(*value);
        }
        let reference = reference.stable_value().unwrap_or_default();
        info!(
            "Light sensor calibrated from {} samples, reference clear count {:.0}, window {}",
            readings.len(),
            reference,
            self.stabilizer.len()
        );
        Ok(reference)
    }

    /// Read the sensor once. `hour` is the local hour used for the
    /// day-period label.
    pub fn read(&mut self, hour: u8) -> LightReading {
        let sample = match self.sensor.read_color() {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Light sensor read failed: {}", e);
                return LightReading {
                    level: Measurement::Fault(SensorFault::ReadFailed),
                    daylight: None,
                    color: None,
                };
            }
        };

        self.stabilizer.push(sample.clear as f32);
        let clear = self.stabilizer.stable_value().unwrap_or(sample.clear as f32);
        let level = round_to((clear / self.full_scale * 100.0).min(100.0), 1);

        LightReading {
            level: Measurement::Value(level),
            daylight: Some(Daylight::classify(hour, level)),
            color: Some(color_profile(&sample)),
        }
    }

    pub fn release(&mut self) -> Result<(), SensorError> {
        self.sensor.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::testing::ScriptedLight;

    fn stabilizer(capacity: usize) -> RobustAnalogStabilizer {
        RobustAnalogStabilizer::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn median_ignores_outlier() {
        let mut s = stabilizer(5);
        for v in [10.0, 12.0, 11.0, 9.0, 50.0] {
            s.push(v);
        }
        assert_eq!(s.stable_value(), Some(11.0));
    }

    #[test]
    fn median_before_window_fills() {
        let mut s = stabilizer(5);
        assert_eq!(s.stable_value(), None);
        s.push(4.0);
        assert_eq!(s.stable_value(), Some(4.0));
        s.push(8.0);
        assert_eq!(s.stable_value(), Some(6.0));
        s.push(1.0);
        assert_eq!(s.stable_value(), Some(4.0));
    }

    #[test]
    fn window_evicts_oldest() {
        let mut s = stabilizer(3);
        for v in [100.0, 100.0, 100.0, 1.0, 2.0, 3.0] {
            s.push(v);
        }
        assert_eq!(s.len(), 3);
        assert_eq!(s.stable_value(), Some(2.0));
    }

    #[test]
    fn level_is_clamped_and_labelled() {
        let sensor = ScriptedLight {
            clear: vec![Ok(500), Ok(5000), Ok(5000), Ok(5000)].into(),
        };
        let mut meter = LightMeter::new(sensor, NonZeroUsize::new(3).unwrap(), 1000.0);

        let first = meter.read(14);
        assert_eq!(first.level, Measurement::Value(50.0));
        assert_eq!(first.daylight.map(|d| d.to_string()), Some("Afternoon clear".into()));

        // Median of [500, 5000] is 2750 counts, clamped to 100 %.
        assert_eq!(meter.read(14).level, Measurement::Value(100.0));
        assert_eq!(meter.read(14).level, Measurement::Value(100.0));
    }

    #[test]
    fn failed_read_is_a_fault() {
        let sensor = ScriptedLight {
            clear: vec![Err(SensorError::Simulated("i2c nack"))].into(),
        };
        let mut meter = LightMeter::new(sensor, NonZeroUsize::new(5).unwrap(), 1000.0);
        let reading = meter.read(10);
        assert_eq!(reading.level, Measurement::Fault(SensorFault::ReadFailed));
        assert!(reading.daylight.is_none());
    }

    #[test]
    fn calibration_primes_window() {
        let sensor = ScriptedLight {
            clear: vec![
                Ok(300),
                Err(SensorError::Simulated("glitch")),
                Ok(320),
                Ok(310),
                Err(SensorError::Simulated("script exhausted")),
            ]
            .into(),
        };
        let mut meter = LightMeter::new(sensor, NonZeroUsize::new(5).unwrap(), 1000.0);
        assert_eq!(meter.calibrate(4, Duration::ZERO).unwrap(), 310.0);
        assert_eq!(meter.stabilizer.stable_value(), Some(310.0));
    }

    #[test]
    fn calibration_without_any_read_fails() {
        let sensor = ScriptedLight {
            clear: VecDeque::new(),
        };
        let mut meter = LightMeter::new(sensor, NonZeroUsize::new(5).unwrap(), 1000.0);
        assert!(matches!(
            meter.calibrate(3, Duration::ZERO),
            Err(SensorError::Uncalibrated("light"))
        ));
    }

    #[test]
    fn color_tone() {
        let warm = color_profile(&ColorSample {
            clear: 100,
            red: 60,
            green: 30,
            blue: 10,
        });
        assert_eq!(warm.tone, ColorTone::Warm);
        assert_eq!(warm.red, 153);

        let dark = color_profile(&ColorSample {
            clear: 0,
            red: 0,
            green: 0,
            blue: 0,
        });
        assert_eq!(dark.tone, ColorTone::Neutral);
    }
}
