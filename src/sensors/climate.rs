/// Retry policy and calibration for the DHT-style climate sensor
use log::warn;
use std::ops::RangeInclusive;
use std::thread;
use std::time::Duration;

use crate::error::SensorError;
use crate::models::{Measurement, SensorFault};
use crate::sensors::ClimateSensor;
use crate::utils::round_to;

const TEMPERATURE_RANGE: RangeInclusive<f32> = -40.0..=80.0;
const HUMIDITY_RANGE: RangeInclusive<f32> = 0.0..=100.0;

/// Wraps a flaky single-wire sensor with a bounded retry loop.
///
/// Temperature and humidity are retried independently, so a sensor that
/// keeps failing on one quantity still delivers the other.
pub struct RetryingClimateSensor<S> {
    sensor: S,
    attempts: u32,
    backoff: Duration,
    temperature_offset: f32,
}

impl<S: ClimateSensor> RetryingClimateSensor<S> {
    pub fn new(sensor: S, attempts: u32, backoff: Duration, temperature_offset: f32) -> Self {
        RetryingClimateSensor {
            sensor,
            attempts: attempts.max(1),
            backoff,
            temperature_offset,
        }
    }

    /// Calibrated temperature in °C, or a fault once every attempt failed.
    pub fn read_temperature(&mut self) -> Measurement<f32> {
        let offset = self.temperature_offset;
        self.read_with_retry("temperature", TEMPERATURE_RANGE, |s| {
            s.read_temperature()
        })
        .map(|t| round_to(t + offset, 1))
    }

    /// Relative humidity in percent, or a fault once every attempt failed.
    pub fn read_humidity(&mut self) -> Measurement<f32> {
        self.read_with_retry("humidity", HUMIDITY_RANGE, |s| s.read_humidity())
            .map(|h| round_to(h, 1))
    }

    fn read_with_retry(
        &mut self,
        quantity: &'static str,
        range: RangeInclusive<f32>,
        read: impl Fn(&mut S) -> Result<f32, SensorError>,
    ) -> Measurement<f32> {
        let mut fault = SensorFault::ReadFailed;

        for attempt in 1..=self.attempts {
            let result = read(&mut self.sensor).and_then(|value| {
                if value.is_finite() && range.contains(&value) {
                    Ok(value)
                } else {
                    Err(SensorError::Implausible { quantity, value })
                }
            });

            match result {
                Ok(value) => return Measurement::Value(value),
                Err(e) => {
                    fault = match e {
                        SensorError::Implausible { .. } => SensorFault::OutOfRange,
                        _ => SensorFault::ReadFailed,
                    };
                    warn!(
                        "Climate {} attempt {}/{} failed: {}",
                        quantity, attempt, self.attempts, e
                    );
                }
            }

            if attempt < self.attempts && !self.backoff.is_zero() {
                thread::sleep(self.backoff);
            }
        }

        Measurement::Fault(fault)
    }

    pub fn release(&mut self) -> Result<(), SensorError> {
        self.sensor.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::testing::ScriptedClimate;

    fn sensor(
        temperatures: Vec<Result<f32, SensorError>>,
        humidities: Vec<Result<f32, SensorError>>,
    ) -> RetryingClimateSensor<ScriptedClimate> {
        RetryingClimateSensor::new(
            ScriptedClimate {
                temperatures: temperatures.into(),
                humidities: humidities.into(),
            },
            3,
            Duration::ZERO,
            -2.0,
        )
    }

    #[test]
    fn applies_offset() {
        let mut s = sensor(vec![Ok(25.0)], vec![Ok(48.04)]);
        assert_eq!(s.read_temperature(), Measurement::Value(23.0));
        assert_eq!(s.read_humidity(), Measurement::Value(48.0));
    }

    #[test]
    fn succeeds_on_last_attempt() {
        let mut s = sensor(
            vec![
                Err(SensorError::Simulated("checksum")),
                Err(SensorError::Simulated("timeout")),
                Ok(21.0),
            ],
            vec![],
        );
        assert_eq!(s.read_temperature(), Measurement::Value(19.0));
    }

    #[test]
    fn three_failures_are_a_fault_and_humidity_survives() {
        let mut s = sensor(
            vec![
                Err(SensorError::Simulated("checksum")),
                Err(SensorError::Simulated("checksum")),
                Err(SensorError::Simulated("checksum")),
                Ok(30.0),
            ],
            vec![Ok(55.0)],
        );
        assert_eq!(
            s.read_temperature(),
            Measurement::Fault(SensorFault::ReadFailed)
        );
        assert_eq!(s.read_humidity(), Measurement::Value(55.0));
        // The fourth scripted value was never consumed by the failed read.
        assert_eq!(s.read_temperature(), Measurement::Value(28.0));
    }

    #[test]
    fn implausible_values_are_out_of_range() {
        let mut s = sensor(vec![], vec![Ok(140.0), Ok(-3.0), Ok(f32::NAN)]);
        assert_eq!(s.read_humidity(), Measurement::Fault(SensorFault::OutOfRange));
    }
}
