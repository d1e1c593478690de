/// Simulated sensors for running the station without hardware
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::time::Instant;

use crate::error::SensorError;
use crate::sensors::{ClimateSensor, ColorSample, DigitalInput, LightProbe};

/// Random-walk climate with occasional checksum failures, like a DHT11.
pub struct SimulatedClimate {
    rng: StdRng,
    temperature: f32,
    humidity: f32,
    failure_rate: f64,
}

impl SimulatedClimate {
    pub fn new(failure_rate: f64) -> Self {
        SimulatedClimate {
            rng: StdRng::from_entropy(),
            temperature: 22.0,
            humidity: 55.0,
            failure_rate,
        }
    }

    fn maybe_fail(&mut self) -> Result<(), SensorError> {
        if self.rng.gen_bool(self.failure_rate) {
            Err(SensorError::Simulated("checksum did not validate"))
        } else {
            Ok(())
        }
    }
}

impl ClimateSensor for SimulatedClimate {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.maybe_fail()?;
        self.temperature = (self.temperature + self.rng.gen_range(-0.2..=0.2)).clamp(5.0, 35.0);
        Ok(self.temperature)
    }

    fn read_humidity(&mut self) -> Result<f32, SensorError> {
        self.maybe_fail()?;
        self.humidity = (self.humidity + self.rng.gen_range(-0.5..=0.5)).clamp(20.0, 95.0);
        Ok(self.humidity)
    }
}

/// Anemometer reed switch toggling at the rate a gusting wind would spin
/// the cups.
pub struct SimulatedAnemometer {
    rng: StdRng,
    transitions_per_metre: f64,
    wind_kmh: f64,
    phase: f64,
    last_sample: Instant,
    next_gust: Instant,
}

impl SimulatedAnemometer {
    pub fn new(radius_m: f64, transitions_per_revolution: u32) -> Self {
        let now = Instant::now();
        SimulatedAnemometer {
            rng: StdRng::from_entropy(),
            transitions_per_metre: transitions_per_revolution as f64 / (2.0 * PI * radius_m),
            wind_kmh: 8.0,
            phase: 0.0,
            last_sample: now,
            next_gust: now,
        }
    }
}

impl DigitalInput for SimulatedAnemometer {
    fn read_level(&mut self) -> Result<bool, SensorError> {
        let now = Instant::now();
        if now >= self.next_gust {
            self.wind_kmh = (self.wind_kmh + self.rng.gen_range(-3.0..=3.0)).clamp(0.0, 60.0);
            self.next_gust = now + std::time::Duration::from_secs(2);
        }

        let elapsed = now.duration_since(self.last_sample).as_secs_f64();
        self.last_sample = now;
        self.phase += self.wind_kmh / 3.6 * self.transitions_per_metre * elapsed;

        Ok(self.phase as u64 % 2 == 0)
    }
}

/// Rain plate: long dry and wet spells, with flutter on the line.
pub struct SimulatedRainPlate {
    rng: StdRng,
    wet: bool,
    active_low: bool,
}

impl SimulatedRainPlate {
    pub fn new(active_low: bool) -> Self {
        SimulatedRainPlate {
            rng: StdRng::from_entropy(),
            wet: false,
            active_low,
        }
    }
}

impl DigitalInput for SimulatedRainPlate {
    fn read_level(&mut self) -> Result<bool, SensorError> {
        if self.rng.gen_bool(0.002) {
            self.wet = !self.wet;
        }
        let flutter = self.rng.gen_bool(0.15);
        let asserted = self.wet != flutter;
        Ok(asserted != self.active_low)
    }
}

/// Light sensor around a slowly drifting level with occasional glints.
pub struct SimulatedLight {
    rng: StdRng,
    clear: f64,
}

impl SimulatedLight {
    pub fn new() -> Self {
        SimulatedLight {
            rng: StdRng::from_entropy(),
            clear: 450.0,
        }
    }
}

impl Default for SimulatedLight {
    fn default() -> Self {
        Self::new()
    }
}

impl LightProbe for SimulatedLight {
    fn read_color(&mut self) -> Result<ColorSample, SensorError> {
        self.clear = (self.clear + self.rng.gen_range(-15.0..=15.0)).clamp(0.0, 1200.0);
        let mut clear = self.clear + self.rng.gen_range(-5.0..=5.0);
        if self.rng.gen_bool(0.05) {
            clear *= 5.0;
        }
        let clear = clear.max(0.0) as u32;

        Ok(ColorSample {
            clear,
            red: clear * 2 / 5,
            green: clear * 7 / 20,
            blue: clear / 4,
        })
    }
}
