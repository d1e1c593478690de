use std::env;
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use time::UtcOffset;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Random-walk sensors, no hardware required.
    Simulated,
    /// GPIO character device and IIO sysfs devices.
    Linux,
}

impl FromStr for Backend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(Backend::Simulated),
            "linux" | "hardware" => Ok(Backend::Linux),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StationConfig {
    pub backend: Backend,
    pub gpio_chip: PathBuf,
    /// Line offsets on `gpio_chip`.
    pub rotation_gpio: u32,
    pub rain_gpio: u32,
    pub rain_active_low: bool,
    pub climate_device: PathBuf,
    pub light_device: PathBuf,
    pub climate_settle: Duration,

    pub anemometer_radius_m: f64,
    pub transitions_per_revolution: NonZeroU32,
    pub wind_noise_floor_kmh: f64,
    pub rotation_sample_interval: Duration,
    pub rotation_window: Duration,

    pub rain_samples: usize,
    pub rain_sample_delay: Duration,

    pub light_window: NonZeroUsize,
    pub light_full_scale: f32,
    pub light_calibration_samples: usize,

    pub climate_retries: u32,
    pub climate_retry_backoff: Duration,
    pub temperature_offset_c: f32,

    pub acquisition_interval: Duration,
    pub display_page_interval: Duration,
    pub display_width: usize,
    pub history_capacity: NonZeroUsize,
    pub summary_interval: Duration,
    pub utc_offset: UtcOffset,
}

/// Read `key` from the environment, falling back to `default` when unset.
fn var_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn millis_or(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    var_or(key, default.as_millis() as u64).map(Duration::from_millis)
}

fn micros_or(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    var_or(key, default.as_micros() as u64).map(Duration::from_micros)
}

fn require(condition: bool, message: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter(message()))
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            backend: Backend::Simulated,
            gpio_chip: PathBuf::from("/dev/gpiochip0"),
            rotation_gpio: 17,
            rain_gpio: 27,
            rain_active_low: true,
            climate_device: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
            light_device: PathBuf::from("/sys/bus/iio/devices/iio:device1"),
            climate_settle: Duration::from_secs(2),
            anemometer_radius_m: 0.09,
            // 2 transitions x 3 cups
            transitions_per_revolution: NonZeroU32::MIN.saturating_add(5),
            wind_noise_floor_kmh: 1.0,
            rotation_sample_interval: Duration::from_micros(500),
            rotation_window: Duration::from_secs(1),
            rain_samples: 5,
            rain_sample_delay: Duration::from_millis(100),
            light_window: NonZeroUsize::MIN.saturating_add(4),
            light_full_scale: 1000.0,
            light_calibration_samples: 10,
            climate_retries: 3,
            climate_retry_backoff: Duration::from_millis(500),
            temperature_offset_c: -2.0,
            acquisition_interval: Duration::from_secs(1),
            display_page_interval: Duration::from_secs(3),
            display_width: 16,
            history_capacity: NonZeroUsize::MIN.saturating_add(999),
            summary_interval: Duration::from_secs(30),
            utc_offset: UtcOffset::UTC,
        }
    }
}

impl StationConfig {
    /// Defaults overridden by environment variables (and `.env`).
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();
        let d = StationConfig::default();

        let backend = match env::var("STATION_BACKEND") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "STATION_BACKEND",
                value: raw,
            })?,
            Err(_) => d.backend,
        };

        let utc_offset_hours: i8 = var_or("UTC_OFFSET_HOURS", d.utc_offset.whole_hours())?;
        let utc_offset = UtcOffset::from_hms(utc_offset_hours, 0, 0).map_err(|_| {
            ConfigError::InvalidValue {
                key: "UTC_OFFSET_HOURS",
                value: utc_offset_hours.to_string(),
            }
        })?;

        let config = StationConfig {
            backend,
            gpio_chip: var_or("GPIO_CHIP", d.gpio_chip)?,
            rotation_gpio: var_or("ROTATION_GPIO", d.rotation_gpio)?,
            rain_gpio: var_or("RAIN_GPIO", d.rain_gpio)?,
            rain_active_low: var_or("RAIN_ACTIVE_LOW", d.rain_active_low)?,
            climate_device: var_or("CLIMATE_IIO_DEVICE", d.climate_device)?,
            light_device: var_or("LIGHT_IIO_DEVICE", d.light_device)?,
            climate_settle: millis_or("CLIMATE_SETTLE_MS", d.climate_settle)?,
            anemometer_radius_m: var_or("ANEMOMETER_RADIUS_M", d.anemometer_radius_m)?,
            transitions_per_revolution: var_or(
                "TRANSITIONS_PER_REVOLUTION",
                d.transitions_per_revolution,
            )?,
            wind_noise_floor_kmh: var_or("WIND_NOISE_FLOOR_KMH", d.wind_noise_floor_kmh)?,
            rotation_sample_interval: micros_or("ROTATION_SAMPLE_US", d.rotation_sample_interval)?,
            rotation_window: millis_or("ROTATION_WINDOW_MS", d.rotation_window)?,
            rain_samples: var_or("RAIN_SAMPLES", d.rain_samples)?,
            rain_sample_delay: millis_or("RAIN_SAMPLE_DELAY_MS", d.rain_sample_delay)?,
            light_window: var_or("LIGHT_WINDOW", d.light_window)?,
            light_full_scale: var_or("LIGHT_FULL_SCALE", d.light_full_scale)?,
            light_calibration_samples: var_or(
                "LIGHT_CALIBRATION_SAMPLES",
                d.light_calibration_samples,
            )?,
            climate_retries: var_or("CLIMATE_RETRIES", d.climate_retries)?,
            climate_retry_backoff: millis_or("CLIMATE_RETRY_BACKOFF_MS", d.climate_retry_backoff)?,
            temperature_offset_c: var_or("TEMPERATURE_OFFSET_C", d.temperature_offset_c)?,
            acquisition_interval: millis_or("ACQUISITION_INTERVAL_MS", d.acquisition_interval)?,
            display_page_interval: millis_or("DISPLAY_PAGE_MS", d.display_page_interval)?,
            display_width: var_or("DISPLAY_WIDTH", d.display_width)?,
            history_capacity: var_or("HISTORY_CAPACITY", d.history_capacity)?,
            summary_interval: var_or("SUMMARY_INTERVAL_SECS", d.summary_interval.as_secs())
                .map(Duration::from_secs)?,
            utc_offset,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("ANEMOMETER_RADIUS_M", self.anemometer_radius_m),
            ("WIND_NOISE_FLOOR_KMH", self.wind_noise_floor_kmh),
            ("LIGHT_FULL_SCALE", f64::from(self.light_full_scale)),
            ("TEMPERATURE_OFFSET_C", f64::from(self.temperature_offset_c)),
        ] {
            require(value.is_finite(), || format!("{} must be a finite number, got {}", key, value))?;
        }
        require(self.rain_samples % 2 == 1, || {
            format!("RAIN_SAMPLES must be odd, got {}", self.rain_samples)
        })?;
        require(self.anemometer_radius_m > 0.0, || {
            format!("ANEMOMETER_RADIUS_M must be positive, got {}", self.anemometer_radius_m)
        })?;
        require(self.wind_noise_floor_kmh >= 0.0, || {
            format!("WIND_NOISE_FLOOR_KMH must not be negative, got {}", self.wind_noise_floor_kmh)
        })?;
        require(self.light_full_scale > 0.0, || {
            format!("LIGHT_FULL_SCALE must be positive, got {}", self.light_full_scale)
        })?;
        require(self.climate_retries > 0, || "CLIMATE_RETRIES must be at least 1".to_string())?;
        require(self.display_width > 0, || "DISPLAY_WIDTH must be at least 1".to_string())?;
        for (key, interval) in [
            ("ROTATION_WINDOW_MS", self.rotation_window),
            ("ACQUISITION_INTERVAL_MS", self.acquisition_interval),
            ("DISPLAY_PAGE_MS", self.display_page_interval),
            ("SUMMARY_INTERVAL_SECS", self.summary_interval),
        ] {
            require(!interval.is_zero(), || format!("{} must be greater than zero", key))?;
        }
        Ok(())
    }
}
