/// Majority-vote debouncing for noisy digital sensors
use std::thread;
use std::time::Duration;

use crate::error::{ConfigError, SensorError};
use crate::sensors::DigitalInput;

/// True when strictly more than half of the samples are true.
pub fn majority(samples: &[bool]) -> bool {
    samples.iter().filter(|s| **s).count() * 2 > samples.len()
}

/// Classifies a binary physical state by sampling an input several times.
///
/// A single read of a resistive rain plate flutters while it is damp; taking
/// an odd number of samples a fixed delay apart and voting costs roughly
/// `samples * delay` of latency per read.
pub struct DebouncedDigitalSensor<I> {
    input: I,
    samples: usize,
    delay: Duration,
    active_low: bool,
}

impl<I: DigitalInput> DebouncedDigitalSensor<I> {
    /// Reject sample counts that could tie, before any input is opened.
    pub fn check_samples(samples: usize) -> Result<(), ConfigError> {
        if samples == 0 || samples % 2 == 0 {
            return Err(ConfigError::InvalidParameter(format!(
                "debounce sample count must be odd, got {}",
                samples
            )));
        }
        Ok(())
    }

    /// `active_low` marks inputs that pull the line low when the state is
    /// present, like the YL-83 rain plate.
    pub fn new(
        input: I,
        samples: usize,
        delay: Duration,
        active_low: bool,
    ) -> Result<Self, ConfigError> {
        Self::check_samples(samples)?;

        Ok(DebouncedDigitalSensor {
            input,
            samples,
            delay,
            active_low,
        })
    }

    /// Whether the state is present according to the majority of samples.
    ///
    /// A failed sample aborts the read; the caller decides how to mark it.
    pub fn read(&mut self) -> Result<bool, SensorError> {
        let mut votes = Vec::with_capacity(self.samples);
        for i in 0..self.samples {
            let level = self.input.read_level()?;
            votes.push(level != self.active_low);
            if i + 1 < self.samples && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }
        Ok(majority(&votes))
    }

    pub fn release(&mut self) -> Result<(), SensorError> {
        self.input.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::testing::ScriptedInput;

    #[test]
    fn majority_needs_more_than_half() {
        assert!(majority(&[true, false, true, true, false]));
        assert!(!majority(&[true, false, false, true, false]));
        assert!(!majority(&[true, false]));
        assert!(!majority(&[]));
    }

    #[test]
    fn three_of_five_is_present() {
        let input = ScriptedInput::new(&[true, false, true, true, false]);
        let mut sensor = DebouncedDigitalSensor::new(input, 5, Duration::ZERO, false).unwrap();
        assert!(sensor.read().unwrap());
    }

    #[test]
    fn active_low_inverts_levels() {
        // Line low three times out of five: wet.
        let input = ScriptedInput::new(&[false, true, false, false, true]);
        let mut sensor = DebouncedDigitalSensor::new(input, 5, Duration::ZERO, true).unwrap();
        assert!(sensor.read().unwrap());

        let input = ScriptedInput::new(&[true, true, false, true, true]);
        let mut sensor = DebouncedDigitalSensor::new(input, 5, Duration::ZERO, true).unwrap();
        assert!(!sensor.read().unwrap());
    }

    #[test]
    fn consumes_exactly_k_samples() {
        let input = ScriptedInput::new(&[true, true, true, false, false, false]);
        let mut sensor = DebouncedDigitalSensor::new(input, 3, Duration::ZERO, false).unwrap();
        assert!(sensor.read().unwrap());
        assert!(!sensor.read().unwrap());
    }

    #[test]
    fn even_sample_count_is_rejected() {
        let input = ScriptedInput::new(&[]);
        assert!(DebouncedDigitalSensor::new(input, 4, Duration::ZERO, false).is_err());
        let input = ScriptedInput::new(&[]);
        assert!(DebouncedDigitalSensor::new(input, 0, Duration::ZERO, false).is_err());
    }

    #[test]
    fn failed_sample_fails_the_read() {
        let mut input = ScriptedInput::new(&[true]);
        input.script.push_back(Err(SensorError::Simulated("bounce")));
        let mut sensor = DebouncedDigitalSensor::new(input, 3, Duration::ZERO, false).unwrap();
        assert!(sensor.read().is_err());
    }
}
