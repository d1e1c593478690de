use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::acquisition::SharedSnapshot;
use crate::display::{show, LineDisplay};
use crate::error::DisplayError;
use crate::models::{Measurement, Reading};

/// How often an idle multiplexer checks for a first reading.
const IDLE_POLL: Duration = Duration::from_millis(100);
/// Pause after a failed display write before retrying the same page.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Pages shown in turn, in declaration order, wrapping to the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPage {
    Climate,
    WindRain,
    Light,
}

fn with_unit(value: Measurement<f32>, unit: &str) -> String {
    match value {
        Measurement::Value(v) => format!("{:.1}{}", v, unit),
        Measurement::Fault(_) => "--".to_string(),
    }
}

impl DisplayPage {
    pub const FIRST: DisplayPage = DisplayPage::Climate;

    pub fn next(self) -> Self {
        match self {
            DisplayPage::Climate => DisplayPage::WindRain,
            DisplayPage::WindRain => DisplayPage::Light,
            DisplayPage::Light => DisplayPage::Climate,
        }
    }

    /// Both text lines of this page for `reading`.
    pub fn render(self, reading: &Reading) -> [String; 2] {
        match self {
            DisplayPage::Climate => [
                format!("Temp: {}", with_unit(reading.temperature, "C")),
                format!("Hum: {}", with_unit(reading.humidity, "%")),
            ],
            DisplayPage::WindRain => {
                let rain = match reading.is_raining {
                    Measurement::Value(true) => "Yes",
                    Measurement::Value(false) => "No",
                    Measurement::Fault(_) => "--",
                };
                [
                    format!("Wind: {}", with_unit(reading.wind_speed, "km/h")),
                    format!("Rain: {}", rain),
                ]
            }
            DisplayPage::Light => [
                format!("Light: {}", with_unit(reading.light_level, "%")),
                reading
                    .daylight
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "--".to_string()),
            ],
        }
    }
}

/// Cycles the latest snapshot through the display pages on its own timer.
pub struct DisplayMultiplexer<D> {
    display: D,
    snapshot: Arc<SharedSnapshot>,
    page: DisplayPage,
    period: Duration,
}

impl<D: LineDisplay> DisplayMultiplexer<D> {
    pub fn new(display: D, snapshot: Arc<SharedSnapshot>, period: Duration) -> Self {
        DisplayMultiplexer {
            display,
            snapshot,
            page: DisplayPage::FIRST,
            period,
        }
    }

    /// Render the current page from the latest snapshot and advance.
    ///
    /// Returns the rendered page, or `None` while nothing has been
    /// published. A failed write leaves the page unchanged.
    pub fn tick(&mut self) -> Result<Option<DisplayPage>, DisplayError> {
        let Some(reading) = self.snapshot.read() else {
            return Ok(None);
        };

        let page = self.page;
        let [first, second] = page.render(&reading);
        show(&mut self.display, &first, &second)?;
        self.page = page.next();
        Ok(Some(page))
    }

    /// Cycle pages until `running` is cleared, then hand the display back.
    pub fn run(mut self, running: &AtomicBool) -> D {
        info!(
            "Display multiplexer started, new page every {} ms",
            self.period.as_millis()
        );
        while running.load(Ordering::Acquire) {
            match self.tick() {
                Ok(Some(_)) => thread::sleep(self.period),
                Ok(None) => thread::sleep(IDLE_POLL),
                Err(e) => {
                    warn!("Display update failed: {}", e);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        info!("Display multiplexer stopped");
        self.display
    }
}
