/// Utility functions for data processing and formatting
use std::sync::Arc;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::models::Reading;

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = format_description!("[day].[month].[year] - [hour]:[minute]:[second]");
    dt.format(&format).unwrap_or_else(|_| dt.to_string())
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f32, decimals: i32) -> f32 {
    let factor = 10f32.powi(decimals);
    (value * factor).round() / factor
}

/// Aggregate view of the history buffer for the dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub samples: usize,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub light_level: Option<f32>,
    pub peak_wind: Option<f32>,
    /// Share of valid rain samples that reported rain, 0-100
    pub rain_share: Option<f32>,
    pub temperature_faults: usize,
    pub humidity_faults: usize,
    pub wind_faults: usize,
    pub rain_faults: usize,
    pub light_faults: usize,
    pub first: Option<OffsetDateTime>,
    pub last: Option<OffsetDateTime>,
}

/// Calculate summary values from a history snapshot
///
/// Fault markers are counted separately and never enter an average, so a
/// sensor that failed for half the window does not drag the mean towards
/// zero.
///
/// # Arguments
/// * `history` - Readings in acquisition order, oldest first
///
/// # Returns
/// Summary with averages rounded to 2 decimal places
pub fn summarize_history(history: &[Arc<Reading>]) -> HistorySummary {
    fn mean(values: &[f32]) -> Option<f32> {
        if values.is_empty() {
            return None;
        }
        let sum: f32 = values.iter().sum();
        Some(round_to(sum / values.len() as f32, 2))
    }

    let temperatures: Vec<f32> = history.iter().filter_map(|r| r.temperature.value()).collect();
    let humidities: Vec<f32> = history.iter().filter_map(|r| r.humidity.value()).collect();
    let light_levels: Vec<f32> = history.iter().filter_map(|r| r.light_level.value()).collect();
    let winds: Vec<f32> = history.iter().filter_map(|r| r.wind_speed.value()).collect();
    let rain: Vec<bool> = history.iter().filter_map(|r| r.is_raining.value()).collect();

    let peak_wind = winds.iter().copied().fold(None, |peak: Option<f32>, w| {
        Some(peak.map_or(w, |p| p.max(w)))
    });

    let rain_share = if rain.is_empty() {
        None
    } else {
        let raining = rain.iter().filter(|r| **r).count();
        Some(round_to(raining as f32 * 100.0 / rain.len() as f32, 2))
    };

    HistorySummary {
        samples: history.len(),
        temperature: mean(&temperatures),
        humidity: mean(&humidities),
        light_level: mean(&light_levels),
        peak_wind,
        rain_share,
        temperature_faults: history.len() - temperatures.len(),
        humidity_faults: history.len() - humidities.len(),
        wind_faults: history.len() - winds.len(),
        rain_faults: history.len() - rain.len(),
        light_faults: history.len() - light_levels.len(),
        first: history.first().map(|r| r.wall_clock),
        last: history.last().map(|r| r.wall_clock),
    }
}
