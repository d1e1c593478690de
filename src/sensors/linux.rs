/// Linux backends: GPIO character-device lines and IIO sensor attributes
///
/// The kernel drivers own the bus timing (`dht11` for the single-wire
/// climate sensor, `tcs3472` for the colour sensor); these types only read
/// the attributes the drivers expose. Digital lines are requested through
/// the GPIO character device, addressed by chip and line offset.
use gpiocdev::line::Value;
use gpiocdev::Request;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SensorError;
use crate::sensors::{ClimateSensor, ColorSample, DigitalInput, LightProbe};

const CONSUMER: &str = "weather-station";

fn read_attribute(path: &Path) -> Result<String, SensorError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| SensorError::io(path, e))
}

fn read_integer(path: &Path) -> Result<i64, SensorError> {
    let raw = read_attribute(path)?;
    raw.parse().map_err(|_| SensorError::Parse {
        path: path.to_path_buf(),
        value: raw,
    })
}

/// One input line requested from a GPIO chip.
///
/// Bias cannot be configured here; the line must be pulled by the board or
/// device tree. The kernel frees the line when the request is dropped.
pub struct GpioLineInput {
    chip: PathBuf,
    line: u32,
    request: Option<Request>,
}

impl GpioLineInput {
    pub fn open(chip: &Path, line: u32) -> Result<Self, SensorError> {
        let gpio_error = |source| SensorError::Gpio {
            chip: chip.to_path_buf(),
            line,
            source,
        };

        let request = Request::builder()
            .on_chip(chip)
            .with_consumer(CONSUMER)
            .with_line(line)
            .as_input()
            .request()
            .map_err(gpio_error)?;
        let level = request.value(line).map_err(gpio_error)?;

        info!(
            "GPIO line {} on {} requested as input, initial level {}",
            line,
            chip.display(),
            (level == Value::Active) as u8
        );
        Ok(GpioLineInput {
            chip: chip.to_path_buf(),
            line,
            request: Some(request),
        })
    }
}

impl DigitalInput for GpioLineInput {
    fn read_level(&mut self) -> Result<bool, SensorError> {
        let request = self
            .request
            .as_ref()
            .ok_or(SensorError::LineReleased { line: self.line })?;
        let value = request.value(self.line).map_err(|source| SensorError::Gpio {
            chip: self.chip.clone(),
            line: self.line,
            source,
        })?;
        Ok(value == Value::Active)
    }

    fn release(&mut self) -> Result<(), SensorError> {
        if self.request.take().is_some() {
            debug!("GPIO line {} on {} released", self.line, self.chip.display());
        }
        Ok(())
    }
}

/// Temperature/humidity from an IIO device (milli-degrees, milli-percent).
pub struct IioClimateSensor {
    temperature: PathBuf,
    humidity: PathBuf,
}

impl IioClimateSensor {
    pub fn open(device: &Path) -> Result<Self, SensorError> {
        let sensor = IioClimateSensor {
            temperature: device.join("in_temp_input"),
            humidity: device.join("in_humidityrelative_input"),
        };
        for attribute in [&sensor.temperature, &sensor.humidity] {
            fs::metadata(attribute).map_err(|e| SensorError::io(attribute, e))?;
        }
        info!("Climate sensor found at {}", device.display());
        Ok(sensor)
    }
}

impl ClimateSensor for IioClimateSensor {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        Ok(read_integer(&self.temperature)? as f32 / 1000.0)
    }

    fn read_humidity(&mut self) -> Result<f32, SensorError> {
        Ok(read_integer(&self.humidity)? as f32 / 1000.0)
    }
}

/// Raw colour channels from an IIO light sensor.
pub struct IioLightSensor {
    clear: PathBuf,
    red: PathBuf,
    green: PathBuf,
    blue: PathBuf,
}

impl IioLightSensor {
    pub fn open(device: &Path) -> Result<Self, SensorError> {
        let sensor = IioLightSensor {
            clear: device.join("in_intensity_clear_raw"),
            red: device.join("in_intensity_red_raw"),
            green: device.join("in_intensity_green_raw"),
            blue: device.join("in_intensity_blue_raw"),
        };
        fs::metadata(&sensor.clear).map_err(|e| SensorError::io(&sensor.clear, e))?;
        info!("Light sensor found at {}", device.display());
        Ok(sensor)
    }

    fn channel(path: &Path) -> Result<u32, SensorError> {
        let value = read_integer(path)?;
        u32::try_from(value).map_err(|_| SensorError::Parse {
            path: path.to_path_buf(),
            value: value.to_string(),
        })
    }
}

impl LightProbe for IioLightSensor {
    fn read_color(&mut self) -> Result<ColorSample, SensorError> {
        Ok(ColorSample {
            clear: Self::channel(&self.clear)?,
            red: Self::channel(&self.red)?,
            green: Self::channel(&self.green)?,
            blue: Self::channel(&self.blue)?,
        })
    }
}
