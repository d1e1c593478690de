use std::fmt;
use std::time::Instant;
use time::OffsetDateTime;

/// Why a field of a [`Reading`] carries no measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    /// The sensor could not be read (after any retries).
    ReadFailed,
    /// The sensor answered with a value outside its physical range.
    OutOfRange,
    /// No measurement has been produced yet.
    NotReady,
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SensorFault::ReadFailed => "read failed",
            SensorFault::OutOfRange => "out of range",
            SensorFault::NotReady => "not ready",
        };
        f.write_str(text)
    }
}

/// A measured value or an explicit fault marker.
///
/// A fault is never represented as a zero, so a genuine `0.0` km/h or a
/// dry rain sensor can always be told apart from a sensor that failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement<T> {
    Value(T),
    Fault(SensorFault),
}

impl<T: Copy> Measurement<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Measurement::Value(v) => Some(*v),
            Measurement::Fault(_) => None,
        }
    }

    pub fn fault(&self) -> Option<SensorFault> {
        match self {
            Measurement::Value(_) => None,
            Measurement::Fault(fault) => Some(*fault),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Measurement<U> {
        match self {
            Measurement::Value(v) => Measurement::Value(f(v)),
            Measurement::Fault(fault) => Measurement::Fault(fault),
        }
    }
}

/// Values honour the caller's precision (`{:.1}`), faults print as `--`.
impl<T: fmt::Display> fmt::Display for Measurement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Value(v) => v.fmt(f),
            Measurement::Fault(_) => f.write_str("--"),
        }
    }
}

/// Period of the day combined with how bright it currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPeriod {
    Morning,
    Afternoon,
    Night,
}

impl DayPeriod {
    pub fn from_hour(hour: u8) -> Self {
        match hour {
            6..=11 => DayPeriod::Morning,
            12..=17 => DayPeriod::Afternoon,
            _ => DayPeriod::Night,
        }
    }

    fn name(self) -> &'static str {
        match self {
            DayPeriod::Morning => "Morning",
            DayPeriod::Afternoon => "Afternoon",
            DayPeriod::Night => "Night",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Brightness {
    VeryDark,
    Overcast,
    Normal,
    Clear,
    VeryBright,
}

impl Brightness {
    pub fn from_level(level: f32) -> Self {
        if level < 10.0 {
            Brightness::VeryDark
        } else if level < 30.0 {
            Brightness::Overcast
        } else if level < 50.0 {
            Brightness::Normal
        } else if level < 70.0 {
            Brightness::Clear
        } else {
            Brightness::VeryBright
        }
    }
}

/// Descriptive label derived from the hour and the light level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Daylight {
    pub period: DayPeriod,
    pub brightness: Brightness,
}

impl Daylight {
    pub fn classify(hour: u8, level: f32) -> Self {
        Daylight {
            period: DayPeriod::from_hour(hour),
            brightness: Brightness::from_level(level),
        }
    }
}

impl fmt::Display for Daylight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let period = self.period.name();
        match (self.period, self.brightness) {
            (DayPeriod::Night, Brightness::VeryDark) => f.write_str("Dark night"),
            (DayPeriod::Night, Brightness::Overcast) => f.write_str("Night with light"),
            (DayPeriod::Night, Brightness::VeryBright) => f.write_str("Lit night"),
            (_, Brightness::VeryDark) => write!(f, "{} very dark", period),
            (_, Brightness::Overcast) => write!(f, "{} overcast", period),
            (_, Brightness::Normal) => write!(f, "{} normal", period),
            (_, Brightness::Clear) => write!(f, "{} clear", period),
            (_, Brightness::VeryBright) => write!(f, "{} very bright", period),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorTone {
    Warm,
    Cool,
    Neutral,
}

impl fmt::Display for ColorTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ColorTone::Warm => "warm",
            ColorTone::Cool => "cool",
            ColorTone::Neutral => "neutral",
        };
        f.write_str(text)
    }
}

/// Colour channels normalised against the clear channel to 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorProfile {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub tone: ColorTone,
}

/// One immutable snapshot of every sensor, produced once per acquisition tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sequence: u64,
    pub captured_at: Instant,
    pub wall_clock: OffsetDateTime,
    /// Degrees Celsius, calibration offset applied.
    pub temperature: Measurement<f32>,
    /// Relative humidity in percent.
    pub humidity: Measurement<f32>,
    /// Kilometres per hour, never negative.
    pub wind_speed: Measurement<f32>,
    pub is_raining: Measurement<bool>,
    /// Normalised 0-100.
    pub light_level: Measurement<f32>,
    pub daylight: Option<Daylight>,
    pub color: Option<ColorProfile>,
}

impl Reading {
    pub fn temperature_f(&self) -> Measurement<f32> {
        self.temperature
            .map(|c| crate::utils::round_to(c * 9.0 / 5.0 + 32.0, 1))
    }

    pub fn wind_speed_ms(&self) -> Measurement<f32> {
        self.wind_speed.map(|kmh| crate::utils::round_to(kmh / 3.6, 2))
    }
}
