/// Wind speed from anemometer transitions
///
/// The poller samples the reed switch far faster than the cups can turn and
/// counts level changes. Once per window (measured on the monotonic clock,
/// never by sample count) the count becomes a rate that the acquisition
/// tick picks up.
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::f64::consts::PI;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::{Measurement, SensorFault};
use crate::sensors::DigitalInput;
use crate::sync::lock_bounded;
use crate::utils::round_to;

/// Converts a transition count over a time window into km/h.
#[derive(Debug, Clone)]
pub struct RotationRateEstimator {
    transitions_per_revolution: NonZeroU32,
    radius_m: f64,
    noise_floor_kmh: f64,
    count: u32,
}

impl RotationRateEstimator {
    pub fn new(transitions_per_revolution: NonZeroU32, radius_m: f64, noise_floor_kmh: f64) -> Self {
        RotationRateEstimator {
            transitions_per_revolution,
            radius_m,
            noise_floor_kmh,
            count: 0,
        }
    }

    pub fn accumulate_transition(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn pending(&self) -> u32 {
        self.count
    }

    /// Consume the accumulated count and return the linear speed in km/h.
    ///
    /// Speeds under the noise floor read exactly zero. Nothing is divided
    /// when the count is zero or the window has no length.
    pub fn emit_rate(&mut self, elapsed_seconds: f64) -> f64 {
        let count = std::mem::take(&mut self.count);
        if count == 0 || elapsed_seconds <= 0.0 || !elapsed_seconds.is_finite() {
            return 0.0;
        }

        let revolutions = count as f64 / self.transitions_per_revolution.get() as f64;
        let angular_rate = revolutions * 2.0 * PI / elapsed_seconds;
        let kmh = angular_rate * self.radius_m * 3.6;

        if kmh < self.noise_floor_kmh {
            0.0
        } else {
            kmh
        }
    }
}

/// Accumulator for the window currently being measured.
#[derive(Debug)]
struct RotationWindow {
    estimator: RotationRateEstimator,
    started_at: Instant,
    samples: u32,
    failed_samples: u32,
}

#[derive(Debug)]
struct WindState {
    window: RotationWindow,
    rate: Measurement<f32>,
    total_transitions: u64,
}

/// What a closed window measured, for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReport {
    pub transitions: u32,
    pub samples: u32,
    pub elapsed: Duration,
    pub rate: Measurement<f32>,
}

/// Window state and published rate behind one lock.
///
/// The poller is the only caller of the recording methods; the acquisition
/// tick only ever calls [`WindGauge::current`].
#[derive(Debug)]
pub struct WindGauge {
    state: Mutex<WindState>,
    window_length: Duration,
}

impl WindGauge {
    pub fn new(estimator: RotationRateEstimator, window_length: Duration, started_at: Instant) -> Self {
        WindGauge {
            state: Mutex::new(WindState {
                window: RotationWindow {
                    estimator,
                    started_at,
                    samples: 0,
                    failed_samples: 0,
                },
                rate: Measurement::Fault(SensorFault::NotReady),
                total_transitions: 0,
            }),
            window_length,
        }
    }

    pub fn record_sample(&self, transition: bool) {
        let mut state = lock_bounded(&self.state, "wind");
        state.window.samples += 1;
        if transition {
            state.window.estimator.accumulate_transition();
            state.total_transitions += 1;
        }
    }

    pub fn record_failure(&self) {
        let mut state = lock_bounded(&self.state, "wind");
        state.window.samples += 1;
        state.window.failed_samples += 1;
    }

    /// Emit a rate and start a new window once the current one is due.
    ///
    /// A window in which every sample failed publishes a fault instead of
    /// a misleading zero.
    pub fn close_window_if_due(&self, now: Instant) -> Option<WindowReport> {
        let mut state = lock_bounded(&self.state, "wind");
        let elapsed = now.saturating_duration_since(state.window.started_at);
        if elapsed < self.window_length {
            return None;
        }

        let window = &mut state.window;
        let transitions = window.estimator.pending();
        let samples = window.samples;
        let kmh = window.estimator.emit_rate(elapsed.as_secs_f64());
        let rate = if samples > 0 && window.failed_samples == samples {
            Measurement::Fault(SensorFault::ReadFailed)
        } else {
            Measurement::Value(round_to(kmh as f32, 1))
        };

        window.started_at = now;
        window.samples = 0;
        window.failed_samples = 0;
        state.rate = rate;

        Some(WindowReport {
            transitions,
            samples,
            elapsed,
            rate,
        })
    }

    /// Latest published wind speed in km/h.
    pub fn current(&self) -> Measurement<f32> {
        lock_bounded(&self.state, "wind").rate
    }

    pub fn total_transitions(&self) -> u64 {
        lock_bounded(&self.state, "wind").total_transitions
    }
}

/// High-frequency sampler of the anemometer input.
pub struct RotationPollerTask<I> {
    input: I,
    gauge: Arc<WindGauge>,
    sample_interval: Duration,
    last_level: Option<bool>,
    failing: bool,
}

impl<I: DigitalInput> RotationPollerTask<I> {
    pub fn new(input: I, gauge: Arc<WindGauge>, sample_interval: Duration) -> Self {
        RotationPollerTask {
            input,
            gauge,
            sample_interval,
            last_level: None,
            failing: false,
        }
    }

    /// Take one sample and close the window if it is due.
    ///
    /// A failed read keeps the last known level, so the next good read is
    /// compared against the state seen before the failure.
    pub fn poll_once(&mut self, now: Instant) {
        match self.input.read_level() {
            Ok(level) => {
                if self.failing {
                    info!("Anemometer input readable again");
                    self.failing = false;
                }
                let transition = self.last_level.is_some_and(|last| last != level);
                self.last_level = Some(level);
                self.gauge.record_sample(transition);
            }
            Err(e) => {
                if !self.failing {
                    warn!("Anemometer read failed, keeping last state: {}", e);
                    self.failing = true;
                }
                self.gauge.record_failure();
            }
        }

        if let Some(report) = self.gauge.close_window_if_due(now) {
            debug!(
                "Wind window: {} transitions in {:.3} s over {} samples -> {:.1} km/h",
                report.transitions,
                report.elapsed.as_secs_f64(),
                report.samples,
                report.rate
            );
        }
    }

    /// Sample until `running` is cleared, then hand the input back for
    /// release.
    pub fn run(mut self, running: &AtomicBool) -> I {
        info!(
            "Rotation poller started, sampling every {} us",
            self.sample_interval.as_micros()
        );
        while running.load(Ordering::Acquire) {
            self.poll_once(Instant::now());
            thread::sleep(self.sample_interval);
        }
        info!(
            "Rotation poller stopped after {} transitions",
            self.gauge.total_transitions()
        );
        self.input
    }
}
