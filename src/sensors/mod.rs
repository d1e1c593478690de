/// Sensor collaborators and the sampling strategies layered on top of them
///
/// The traits here are the whole hardware boundary: each backend only knows
/// how to fetch one raw value, while retries, debouncing and smoothing live
/// in the wrappers next to them.
use log::warn;

use crate::error::SensorError;

pub mod climate;
pub mod light;
pub mod linux;
pub mod rain;
pub mod simulated;

pub use climate::RetryingClimateSensor;
pub use light::LightMeter;
pub use rain::DebouncedDigitalSensor;

/// A single digital input line. `true` means the line is high.
pub trait DigitalInput: Send {
    fn read_level(&mut self) -> Result<bool, SensorError>;

    fn release(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
}

/// DHT-style temperature/humidity sensor. Each quantity is read on its own.
pub trait ClimateSensor: Send {
    /// Degrees Celsius, uncalibrated.
    fn read_temperature(&mut self) -> Result<f32, SensorError>;

    /// Relative humidity in percent.
    fn read_humidity(&mut self) -> Result<f32, SensorError>;

    fn release(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
}

/// Raw channel counts from a colour/light sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSample {
    pub clear: u32,
    pub red: u32,
    pub green: u32,
    pub blue: u32,
}

pub trait LightProbe: Send {
    fn read_color(&mut self) -> Result<ColorSample, SensorError>;

    fn release(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
}

impl<T: DigitalInput + ?Sized> DigitalInput for Box<T> {
    fn read_level(&mut self) -> Result<bool, SensorError> {
        (**self).read_level()
    }

    fn release(&mut self) -> Result<(), SensorError> {
        (**self).release()
    }
}

impl<T: ClimateSensor + ?Sized> ClimateSensor for Box<T> {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        (**self).read_temperature()
    }

    fn read_humidity(&mut self) -> Result<f32, SensorError> {
        (**self).read_humidity()
    }

    fn release(&mut self) -> Result<(), SensorError> {
        (**self).release()
    }
}

impl<T: LightProbe + ?Sized> LightProbe for Box<T> {
    fn read_color(&mut self) -> Result<ColorSample, SensorError> {
        (**self).read_color()
    }

    fn release(&mut self) -> Result<(), SensorError> {
        (**self).release()
    }
}

/// The sensors read by the acquisition tick, already wrapped in their
/// sampling strategies. The rotation input is owned by the poller instead.
pub struct SensorSet {
    pub climate: RetryingClimateSensor<Box<dyn ClimateSensor>>,
    pub rain: DebouncedDigitalSensor<Box<dyn DigitalInput>>,
    pub light: LightMeter<Box<dyn LightProbe>>,
}

impl SensorSet {
    /// Release every hardware handle, logging failures instead of stopping
    /// at the first one.
    pub fn release(mut self) {
        if let Err(e) = self.climate.release() {
            warn!("Failed to release climate sensor: {}", e);
        }
        if let Err(e) = self.rain.release() {
            warn!("Failed to release rain sensor: {}", e);
        }
        if let Err(e) = self.light.release() {
            warn!("Failed to release light sensor: {}", e);
        }
    }
}
