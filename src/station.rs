/// Station lifecycle: hardware acquisition, task threads and teardown
///
/// `Station::initialize` acquires every sensor or fails as a whole.
/// `Station::start` moves the handles into the task threads, and
/// `RunningStation::shutdown` gets them back from the joined threads so
/// they are released only once every task has exited.
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::acquisition::{
    AcquisitionScheduler, HistoryRingBuffer, RotationPollerTask, RotationRateEstimator,
    SharedSnapshot, WindGauge,
};
use crate::config::{Backend, StationConfig};
use crate::display::{show, ConsoleDisplay, DisplayMultiplexer, LineDisplay};
use crate::error::StationError;
use crate::sensors::linux::{GpioLineInput, IioClimateSensor, IioLightSensor};
use crate::sensors::simulated::{
    SimulatedAnemometer, SimulatedClimate, SimulatedLight, SimulatedRainPlate,
};
use crate::sensors::{
    ClimateSensor, DebouncedDigitalSensor, DigitalInput, LightMeter, LightProbe,
    RetryingClimateSensor, SensorSet,
};

/// Delay between light calibration reads.
const CALIBRATION_DELAY: Duration = Duration::from_millis(100);
/// Failure probability of a simulated climate read.
const SIMULATED_CLIMATE_FAILURE_RATE: f64 = 0.05;

/// Every collaborator acquired, nothing running yet.
pub struct Station {
    config: StationConfig,
    running: Arc<AtomicBool>,
    snapshot: Arc<SharedSnapshot>,
    history: Arc<HistoryRingBuffer>,
    wind: Arc<WindGauge>,
    sensors: SensorSet,
    rotation: Box<dyn DigitalInput>,
    display: Box<dyn LineDisplay>,
}

/// Handles of the three task threads plus the shared state they write.
pub struct RunningStation {
    running: Arc<AtomicBool>,
    snapshot: Arc<SharedSnapshot>,
    history: Arc<HistoryRingBuffer>,
    wind: Arc<WindGauge>,
    poller: JoinHandle<Box<dyn DigitalInput>>,
    acquisition: JoinHandle<SensorSet>,
    display: JoinHandle<Box<dyn LineDisplay>>,
}

fn open_analog(
    config: &StationConfig,
) -> Result<(Box<dyn ClimateSensor>, Box<dyn LightProbe>), StationError> {
    match config.backend {
        Backend::Simulated => {
            let climate: Box<dyn ClimateSensor> =
                Box::new(SimulatedClimate::new(SIMULATED_CLIMATE_FAILURE_RATE));
            let light: Box<dyn LightProbe> = Box::new(SimulatedLight::new());
            Ok((climate, light))
        }
        Backend::Linux => {
            let climate = IioClimateSensor::open(&config.climate_device)
                .map_err(StationError::init("climate sensor"))?;
            let light = IioLightSensor::open(&config.light_device)
                .map_err(StationError::init("light sensor"))?;
            info!(
                "Waiting {} ms for the climate sensor to settle",
                config.climate_settle.as_millis()
            );
            thread::sleep(config.climate_settle);
            let climate: Box<dyn ClimateSensor> = Box::new(climate);
            let light: Box<dyn LightProbe> = Box::new(light);
            Ok((climate, light))
        }
    }
}

/// Open the anemometer and rain lines. A line opened before a later
/// failure is released again.
fn open_digital(
    config: &StationConfig,
) -> Result<(Box<dyn DigitalInput>, Box<dyn DigitalInput>), StationError> {
    match config.backend {
        Backend::Simulated => {
            let rotation: Box<dyn DigitalInput> = Box::new(SimulatedAnemometer::new(
                config.anemometer_radius_m,
                config.transitions_per_revolution.get(),
            ));
            let rain: Box<dyn DigitalInput> =
                Box::new(SimulatedRainPlate::new(config.rain_active_low));
            Ok((rotation, rain))
        }
        Backend::Linux => {
            let mut rotation = GpioLineInput::open(&config.gpio_chip, config.rotation_gpio)
                .map_err(StationError::init("anemometer"))?;
            match GpioLineInput::open(&config.gpio_chip, config.rain_gpio) {
                Ok(rain) => {
                    let rotation: Box<dyn DigitalInput> = Box::new(rotation);
                    let rain: Box<dyn DigitalInput> = Box::new(rain);
                    Ok((rotation, rain))
                }
                Err(e) => {
                    if let Err(release) = rotation.release() {
                        warn!("Failed to release anemometer input: {}", release);
                    }
                    Err(StationError::init("rain sensor")(e))
                }
            }
        }
    }
}

fn release_analog(climate: &mut Box<dyn ClimateSensor>, light: &mut LightMeter<Box<dyn LightProbe>>) {
    if let Err(e) = climate.release() {
        warn!("Failed to release climate sensor: {}", e);
    }
    if let Err(e) = light.release() {
        warn!("Failed to release light sensor: {}", e);
    }
}

fn release_rotation(rotation: Option<&mut Box<dyn DigitalInput>>) {
    if let Some(rotation) = rotation {
        if let Err(e) = rotation.release() {
            warn!("Failed to release anemometer input: {}", e);
        }
    }
}

fn spawn_task<T: Send + 'static>(
    name: &'static str,
    task: impl FnOnce() -> T + Send + 'static,
) -> Result<JoinHandle<T>, StationError> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(task)
        .map_err(|source| StationError::Spawn { task: name, source })
}

impl Station {
    /// Acquire and calibrate every sensor. Any failure here is fatal: the
    /// station never runs with part of its sensors missing.
    pub fn initialize(config: StationConfig) -> Result<Self, StationError> {
        info!("Initializing sensors ({:?} backend)", config.backend);
        config.validate()?;

        let mut display: Box<dyn LineDisplay> = Box::new(ConsoleDisplay::new(config.display_width));
        show(&mut display, "Weather station", "Starting...")?;

        let (mut climate, light_sensor) = open_analog(&config)?;
        let mut light = LightMeter::new(light_sensor, config.light_window, config.light_full_scale);
        if let Err(e) = light.calibrate(config.light_calibration_samples, CALIBRATION_DELAY) {
            release_analog(&mut climate, &mut light);
            return Err(StationError::init("light sensor")(e));
        }

        let (mut rotation, rain_input) = match open_digital(&config) {
            Ok(inputs) => inputs,
            Err(e) => {
                release_analog(&mut climate, &mut light);
                return Err(e);
            }
        };
        let rain = match DebouncedDigitalSensor::new(
            rain_input,
            config.rain_samples,
            config.rain_sample_delay,
            config.rain_active_low,
        ) {
            Ok(rain) => rain,
            Err(e) => {
                // The rain input was dropped with the failed wrapper.
                release_rotation(Some(&mut rotation));
                release_analog(&mut climate, &mut light);
                return Err(e.into());
            }
        };
        let sensors = SensorSet {
            climate: RetryingClimateSensor::new(
                climate,
                config.climate_retries,
                config.climate_retry_backoff,
                config.temperature_offset_c,
            ),
            rain,
            light,
        };

        let estimator = RotationRateEstimator::new(
            config.transitions_per_revolution,
            config.anemometer_radius_m,
            config.wind_noise_floor_kmh,
        );
        let wind = Arc::new(WindGauge::new(estimator, config.rotation_window, Instant::now()));

        info!(
            "Anemometer radius {} cm, {} transitions per revolution",
            config.anemometer_radius_m * 100.0,
            config.transitions_per_revolution
        );

        Ok(Station {
            running: Arc::new(AtomicBool::new(false)),
            snapshot: Arc::new(SharedSnapshot::new()),
            history: Arc::new(HistoryRingBuffer::new(config.history_capacity)),
            wind,
            sensors,
            rotation,
            display,
            config,
        })
    }

    /// Spawn the rotation poller, the acquisition loop and the display
    /// multiplexer.
    pub fn start(self) -> Result<RunningStation, StationError> {
        let Station {
            config,
            running,
            snapshot,
            history,
            wind,
            sensors,
            rotation,
            mut display,
        } = self;

        if let Err(e) = show(&mut display, "Weather station", "Station ready") {
            warn!("Failed to show ready message: {}", e);
        }
        running.store(true, Ordering::Release);

        let poller = {
            let task = RotationPollerTask::new(
                rotation,
                Arc::clone(&wind),
                config.rotation_sample_interval,
            );
            let flag = Arc::clone(&running);
            spawn_task("rotation-poller", move || task.run(&flag))?
        };

        let acquisition = {
            let task = AcquisitionScheduler::new(
                sensors,
                Arc::clone(&wind),
                Arc::clone(&snapshot),
                Arc::clone(&history),
                config.acquisition_interval,
                config.utc_offset,
            );
            let flag = Arc::clone(&running);
            match spawn_task("acquisition", move || task.run(&flag)) {
                Ok(handle) => handle,
                Err(e) => {
                    running.store(false, Ordering::Release);
                    release_rotation(poller.join().ok().as_mut());
                    return Err(e);
                }
            }
        };

        let display = {
            let task = DisplayMultiplexer::new(
                display,
                Arc::clone(&snapshot),
                config.display_page_interval,
            );
            let flag = Arc::clone(&running);
            match spawn_task("display", move || task.run(&flag)) {
                Ok(handle) => handle,
                Err(e) => {
                    running.store(false, Ordering::Release);
                    release_rotation(poller.join().ok().as_mut());
                    if let Ok(sensors) = acquisition.join() {
                        sensors.release();
                    }
                    return Err(e);
                }
            }
        };

        info!("Station started");
        Ok(RunningStation {
            running,
            snapshot,
            history,
            wind,
            poller,
            acquisition,
            display,
        })
    }
}

impl RunningStation {
    pub fn snapshot(&self) -> Arc<SharedSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn history(&self) -> Arc<HistoryRingBuffer> {
        Arc::clone(&self.history)
    }

    /// Stop every task, wait for each to exit, then release the hardware.
    pub fn shutdown(self) -> Result<(), StationError> {
        info!("Stopping station tasks");
        self.running.store(false, Ordering::Release);

        let mut rotation = self
            .poller
            .join()
            .map_err(|_| StationError::TaskPanicked("rotation-poller"));
        let sensors = self
            .acquisition
            .join()
            .map_err(|_| StationError::TaskPanicked("acquisition"));
        let mut display = self
            .display
            .join()
            .map_err(|_| StationError::TaskPanicked("display"));
        info!("All station tasks stopped, releasing hardware");

        if let Ok(display) = display.as_mut() {
            if let Err(e) = show(display, "Shutting down", "") {
                warn!("Failed to show shutdown message: {}", e);
            }
            if let Err(e) = display.release() {
                warn!("Failed to release display: {}", e);
            }
        }
        release_rotation(rotation.as_mut().ok());

        info!(
            "Anemometer counted {} transitions, {} readings in history",
            self.wind.total_transitions(),
            self.history.len()
        );

        let sensors = sensors?;
        sensors.release();
        rotation?;
        display?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;

    fn fast_config() -> StationConfig {
        StationConfig {
            light_calibration_samples: 1,
            rain_sample_delay: Duration::ZERO,
            climate_retry_backoff: Duration::ZERO,
            rotation_window: Duration::from_millis(20),
            acquisition_interval: Duration::from_millis(10),
            display_page_interval: Duration::from_millis(10),
            ..StationConfig::default()
        }
    }

    #[test]
    fn simulated_station_runs_and_shuts_down() {
        let station = Station::initialize(fast_config()).unwrap().start().unwrap();
        let snapshot = station.snapshot();
        let history = station.history();

        thread::sleep(Duration::from_millis(200));
        let latest = snapshot.read().expect("no reading published");
        assert!(latest.sequence >= 1);
        assert!(history.len() >= 1);
        assert!(latest.light_level.value().is_some());

        station.shutdown().unwrap();
        // Nothing is published once the tasks have been joined.
        let after = snapshot.read().map(|r| r.sequence);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(snapshot.read().map(|r| r.sequence), after);
    }

    fn linux_config(name: &str) -> (StationConfig, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "weather-station-init-{}-{}",
            name,
            std::process::id()
        ));
        let config = StationConfig {
            backend: Backend::Linux,
            gpio_chip: dir.join("gpiochip-missing"),
            climate_device: dir.join("climate"),
            light_device: dir.join("light"),
            climate_settle: Duration::ZERO,
            ..fast_config()
        };
        (config, dir)
    }

    fn write_climate_device(dir: &std::path::Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("in_temp_input"), "21000").unwrap();
        std::fs::write(dir.join("in_humidityrelative_input"), "45000").unwrap();
    }

    #[test]
    fn missing_climate_device_is_an_init_fault() {
        let (config, _dir) = linux_config("absent");
        assert!(matches!(
            Station::initialize(config),
            Err(StationError::Init {
                component: "climate sensor",
                ..
            })
        ));
    }

    #[test]
    fn light_calibration_without_reads_is_an_init_fault() {
        let (config, dir) = linux_config("dark");
        write_climate_device(&config.climate_device);
        // Clear channel present, colour channels missing: every read fails.
        std::fs::create_dir_all(&config.light_device).unwrap();
        std::fs::write(config.light_device.join("in_intensity_clear_raw"), "400").unwrap();

        let result = Station::initialize(config);
        assert!(matches!(
            result,
            Err(StationError::Init {
                component: "light sensor",
                source: SensorError::Uncalibrated("light"),
            })
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_gpio_chip_is_an_init_fault() {
        let (config, dir) = linux_config("nogpio");
        write_climate_device(&config.climate_device);
        std::fs::create_dir_all(&config.light_device).unwrap();
        for channel in ["clear", "red", "green", "blue"] {
            std::fs::write(
                config.light_device.join(format!("in_intensity_{}_raw", channel)),
                "400",
            )
            .unwrap();
        }

        assert!(matches!(
            Station::initialize(config),
            Err(StationError::Init {
                component: "anemometer",
                source: SensorError::Gpio { line: 17, .. },
            })
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn invalid_config_fails_before_hardware_is_touched() {
        let (config, _dir) = linux_config("invalid");
        let config = StationConfig {
            temperature_offset_c: f32::NAN,
            ..config
        };
        // The devices do not exist, so reaching them would be an Init fault.
        assert!(matches!(
            Station::initialize(config),
            Err(StationError::Config(_))
        ));
    }

    #[test]
    fn even_rain_samples_fail_initialization() {
        let config = StationConfig {
            rain_samples: 4,
            ..fast_config()
        };
        assert!(matches!(
            Station::initialize(config),
            Err(StationError::Config(_))
        ));
    }
}
