/// Error types for the weather station
///
/// Transient hardware noise is not an error at the `Reading` level: the
/// acquisition tick turns a failed `SensorError` into a fault marker on the
/// affected field. Errors that reach the caller are configuration problems,
/// initialization faults and task failures, all of which stop the station.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single read on a sensor collaborator.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected value {value:?} read from {path}")]
    Parse { path: PathBuf, value: String },

    #[error("GPIO line {line} on {chip}: {source}")]
    Gpio {
        chip: PathBuf,
        line: u32,
        #[source]
        source: gpiocdev::Error,
    },

    #[error("GPIO line {line} was already released")]
    LineReleased { line: u32 },

    #[error("No successful {0} read during calibration")]
    Uncalibrated(&'static str),

    #[error("Implausible {quantity} value: {value}")]
    Implausible { quantity: &'static str, value: f32 },

    #[error("Simulated fault: {0}")]
    Simulated(&'static str),
}

impl SensorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SensorError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Invalid or missing configuration value.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {key} has invalid value {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Failure of the character display collaborator.
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Display write failed: {0}")]
    Write(String),
}

/// Top-level station error. Any of these prevents the main loop from running.
#[derive(Error, Debug)]
pub enum StationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to initialize {component}: {source}")]
    Init {
        component: &'static str,
        #[source]
        source: SensorError,
    },

    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    #[error("Failed to spawn {task} thread: {source}")]
    Spawn {
        task: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Task {0} panicked")]
    TaskPanicked(&'static str),
}

impl StationError {
    pub fn init(component: &'static str) -> impl FnOnce(SensorError) -> Self {
        move |source| StationError::Init { component, source }
    }
}
