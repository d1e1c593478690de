/// One acquisition tick per interval: read, compose, publish, record
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use time::{OffsetDateTime, UtcOffset};

use crate::acquisition::{HistoryRingBuffer, SharedSnapshot, WindGauge};
use crate::models::{Measurement, Reading, SensorFault};
use crate::sensors::SensorSet;

/// Every measured field of `reading` that carries a fault marker.
pub fn faulted_fields(reading: &Reading) -> Vec<(&'static str, SensorFault)> {
    [
        ("temperature", reading.temperature.fault()),
        ("humidity", reading.humidity.fault()),
        ("wind", reading.wind_speed.fault()),
        ("rain", reading.is_raining.fault()),
        ("light", reading.light_level.fault()),
    ]
    .into_iter()
    .filter_map(|(field, fault)| fault.map(|f| (field, f)))
    .collect()
}

/// Sole writer of the snapshot and the history.
pub struct AcquisitionScheduler {
    sensors: SensorSet,
    wind: Arc<WindGauge>,
    snapshot: Arc<SharedSnapshot>,
    history: Arc<HistoryRingBuffer>,
    interval: Duration,
    utc_offset: UtcOffset,
    sequence: u64,
}

impl AcquisitionScheduler {
    pub fn new(
        sensors: SensorSet,
        wind: Arc<WindGauge>,
        snapshot: Arc<SharedSnapshot>,
        history: Arc<HistoryRingBuffer>,
        interval: Duration,
        utc_offset: UtcOffset,
    ) -> Self {
        AcquisitionScheduler {
            sensors,
            wind,
            snapshot,
            history,
            interval,
            utc_offset,
            sequence: 0,
        }
    }

    /// Read every sensor once and publish the resulting reading.
    ///
    /// Each sensor fails on its own: a fault marks only its field and the
    /// tick always completes.
    pub fn tick(&mut self) -> Arc<Reading> {
        let captured_at = Instant::now();
        let wall_clock = OffsetDateTime::now_utc().to_offset(self.utc_offset);

        let temperature = self.sensors.climate.read_temperature();
        let humidity = self.sensors.climate.read_humidity();

        let is_raining = match self.sensors.rain.read() {
            Ok(raining) => Measurement::Value(raining),
            Err(e) => {
                warn!("Rain sensor read failed: {}", e);
                Measurement::Fault(SensorFault::ReadFailed)
            }
        };

        let light = self.sensors.light.read(wall_clock.hour());
        let wind_speed = self.wind.current();

        self.sequence += 1;
        let reading = Arc::new(Reading {
            sequence: self.sequence,
            captured_at,
            wall_clock,
            temperature,
            humidity,
            wind_speed,
            is_raining,
            light_level: light.level,
            daylight: light.daylight,
            color: light.color,
        });

        for (field, fault) in faulted_fields(&reading) {
            warn!("Tick {}: {} {}", reading.sequence, field, fault);
        }

        self.snapshot.publish(Arc::clone(&reading));
        self.history.append(Arc::clone(&reading));

        debug!(
            "Tick {} in {} ms: {:.1}C {:.1}% {:.1}km/h rain={} light={:.1}%",
            reading.sequence,
            captured_at.elapsed().as_millis(),
            reading.temperature,
            reading.humidity,
            reading.wind_speed,
            reading.is_raining,
            reading.light_level
        );
        reading
    }

    /// Tick until `running` is cleared, then hand the sensors back for
    /// release.
    pub fn run(mut self, running: &AtomicBool) -> SensorSet {
        info!(
            "Acquisition started, one tick every {} ms",
            self.interval.as_millis()
        );
        while running.load(Ordering::Acquire) {
            let started = Instant::now();
            self.tick();

            let elapsed = started.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            } else {
                debug!(
                    "Tick took {} ms, longer than the {} ms interval",
                    elapsed.as_millis(),
                    self.interval.as_millis()
                );
            }
        }
        info!("Acquisition stopped after {} ticks", self.sequence);
        self.sensors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{RotationRateEstimator, WindGauge};
    use crate::error::SensorError;
    use crate::sensors::testing::{ScriptedClimate, ScriptedInput, ScriptedLight};
    use crate::sensors::{
        ClimateSensor, DebouncedDigitalSensor, DigitalInput, LightMeter, LightProbe,
        RetryingClimateSensor,
    };
    use std::num::{NonZeroU32, NonZeroUsize};

    fn sensors(climate: ScriptedClimate, rain: &[bool], light: Vec<u32>) -> SensorSet {
        let climate: Box<dyn ClimateSensor> = Box::new(climate);
        let rain: Box<dyn DigitalInput> = Box::new(ScriptedInput::new(rain));
        let light: Box<dyn LightProbe> = Box::new(ScriptedLight {
            clear: light.into_iter().map(Ok).collect(),
        });
        SensorSet {
            climate: RetryingClimateSensor::new(climate, 3, Duration::ZERO, 0.0),
            rain: DebouncedDigitalSensor::new(rain, 5, Duration::ZERO, false).unwrap(),
            light: LightMeter::new(light, NonZeroUsize::new(5).unwrap(), 1000.0),
        }
    }

    fn scheduler(sensors: SensorSet, wind: Arc<WindGauge>) -> AcquisitionScheduler {
        AcquisitionScheduler::new(
            sensors,
            wind,
            Arc::new(SharedSnapshot::new()),
            Arc::new(HistoryRingBuffer::new(NonZeroUsize::new(10).unwrap())),
            Duration::from_millis(10),
            UtcOffset::UTC,
        )
    }

    fn windy_gauge() -> Arc<WindGauge> {
        let start = Instant::now();
        let estimator = RotationRateEstimator::new(NonZeroU32::new(6).unwrap(), 0.09, 1.0);
        let gauge = WindGauge::new(estimator, Duration::from_secs(1), start);
        for _ in 0..60 {
            gauge.record_sample(true);
        }
        gauge.close_window_if_due(start + Duration::from_secs(1));
        Arc::new(gauge)
    }

    #[test]
    fn temperature_fault_leaves_other_fields_intact() {
        let climate = ScriptedClimate {
            temperatures: vec![
                Err(SensorError::Simulated("checksum")),
                Err(SensorError::Simulated("checksum")),
                Err(SensorError::Simulated("checksum")),
            ]
            .into(),
            humidities: vec![Ok(61.0)].into(),
        };
        let wind = windy_gauge();
        let expected_wind = wind.current();
        let mut scheduler = scheduler(
            sensors(climate, &[true, true, false, true, false], vec![420]),
            wind,
        );

        let reading = scheduler.tick();

        assert_eq!(
            reading.temperature,
            Measurement::Fault(SensorFault::ReadFailed)
        );
        assert_eq!(reading.humidity, Measurement::Value(61.0));
        assert!(expected_wind.value().is_some_and(|w| w > 0.0));
        assert_eq!(reading.wind_speed, expected_wind);
        assert_eq!(reading.is_raining, Measurement::Value(true));
        assert_eq!(reading.light_level, Measurement::Value(42.0));

        let history = scheduler.history.snapshot();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sequence, reading.sequence);
        assert_eq!(scheduler.snapshot.read().unwrap().sequence, 1);
    }

    #[test]
    fn rain_fault_is_marked_not_dry() {
        let climate = ScriptedClimate {
            temperatures: vec![Ok(20.0)].into(),
            humidities: vec![Ok(50.0)].into(),
        };
        let mut rain = ScriptedInput::new(&[true]);
        rain.script.push_back(Err(SensorError::Simulated("open circuit")));
        let rain: Box<dyn DigitalInput> = Box::new(rain);

        let mut set = sensors(climate, &[], vec![100]);
        set.rain = DebouncedDigitalSensor::new(rain, 3, Duration::ZERO, false).unwrap();
        let mut scheduler = scheduler(set, windy_gauge());

        let reading = scheduler.tick();
        assert_eq!(reading.is_raining, Measurement::Fault(SensorFault::ReadFailed));
        assert_eq!(reading.temperature, Measurement::Value(20.0));
    }

    #[test]
    fn failed_wind_window_is_reported_with_the_tick() {
        let start = Instant::now();
        let estimator = RotationRateEstimator::new(NonZeroU32::new(6).unwrap(), 0.09, 1.0);
        let gauge = WindGauge::new(estimator, Duration::from_secs(1), start);
        gauge.record_failure();
        gauge.close_window_if_due(start + Duration::from_secs(1));

        let climate = ScriptedClimate {
            temperatures: vec![Ok(20.0)].into(),
            humidities: vec![Ok(50.0)].into(),
        };
        let mut scheduler = scheduler(sensors(climate, &[], vec![100]), Arc::new(gauge));
        let reading = scheduler.tick();

        assert_eq!(reading.wind_speed, Measurement::Fault(SensorFault::ReadFailed));
        assert_eq!(
            faulted_fields(&reading),
            vec![("wind", SensorFault::ReadFailed)]
        );
    }

    #[test]
    fn ticks_are_sequenced_in_history() {
        let climate = ScriptedClimate {
            temperatures: vec![Ok(20.0), Ok(21.0), Ok(22.0)].into(),
            humidities: vec![Ok(50.0), Ok(50.0), Ok(50.0)].into(),
        };
        let mut scheduler = scheduler(sensors(climate, &[], vec![100, 100, 100]), windy_gauge());
        for _ in 0..3 {
            scheduler.tick();
        }

        let temperatures: Vec<_> = scheduler
            .history
            .snapshot()
            .iter()
            .map(|r| (r.sequence, r.temperature))
            .collect();
        assert_eq!(
            temperatures,
            vec![
                (1, Measurement::Value(20.0)),
                (2, Measurement::Value(21.0)),
                (3, Measurement::Value(22.0)),
            ]
        );
    }

    #[test]
    fn run_returns_sensors_when_stopped() {
        let climate = ScriptedClimate {
            temperatures: Default::default(),
            humidities: Default::default(),
        };
        let scheduler = scheduler(sensors(climate, &[], vec![]), windy_gauge());
        let history = Arc::clone(&scheduler.history);

        let running = AtomicBool::new(true);
        thread::scope(|scope| {
            let handle = scope.spawn(|| scheduler.run(&running));
            thread::sleep(Duration::from_millis(35));
            running.store(false, Ordering::Release);
            let sensors = handle.join().unwrap();
            sensors.release();
        });
        assert!(history.len() >= 1);
    }
}
