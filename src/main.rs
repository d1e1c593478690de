mod acquisition;
mod config;
mod display;
mod error;
mod models;
mod sensors;
mod station;
mod sync;
mod utils;

use log::{error, info, warn};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use acquisition::{HistoryRingBuffer, SharedSnapshot};
use config::StationConfig;
use station::Station;
use utils::{format_datetime, summarize_history};

/// Periodically log the latest reading and a summary of the history buffer.
async fn dashboard_loop(
    snapshot: Arc<SharedSnapshot>,
    history: Arc<HistoryRingBuffer>,
    every: Duration,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately, nothing has been measured yet.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(latest) = snapshot.read() else {
            warn!("No readings published yet!");
            continue;
        };

        info!(
            "Latest reading #{} at {} ({} ms old)",
            latest.sequence,
            format_datetime(&latest.wall_clock),
            latest.captured_at.elapsed().as_millis()
        );
        info!(
            "  Temperature: {:.1}°C ({:.1}°F), humidity: {:.1}%",
            latest.temperature,
            latest.temperature_f(),
            latest.humidity
        );
        info!(
            "  Wind: {:.1} km/h ({:.2} m/s), raining: {}",
            latest.wind_speed,
            latest.wind_speed_ms(),
            latest.is_raining
        );
        match latest.daylight {
            Some(daylight) => info!("  Light: {:.1}% ({})", latest.light_level, daylight),
            None => info!("  Light: {:.1}%", latest.light_level),
        }
        if let Some(color) = latest.color {
            info!(
                "  Color: R {}% G {}% B {}% ({})",
                color.red, color.green, color.blue, color.tone
            );
        }

        let readings = history.snapshot();
        let summary = summarize_history(&readings);
        info!(
            "Summary over {} readings (history holds up to {}):",
            summary.samples,
            history.capacity()
        );
        if let (Some(first), Some(last)) = (summary.first, summary.last) {
            info!("  From {} to {}", format_datetime(&first), format_datetime(&last));
        }
        if let Some(t) = summary.temperature {
            info!("  Average temperature: {:.2}°C", t);
        }
        if let Some(h) = summary.humidity {
            info!("  Average humidity: {:.2}%", h);
        }
        if let Some(l) = summary.light_level {
            info!("  Average light level: {:.2}%", l);
        }
        if let Some(w) = summary.peak_wind {
            info!("  Peak wind: {:.1} km/h", w);
        }
        if let Some(r) = summary.rain_share {
            info!("  Raining in {:.0}% of readings", r);
        }

        let faults = summary.temperature_faults
            + summary.humidity_faults
            + summary.wind_faults
            + summary.rain_faults
            + summary.light_faults;
        if faults > 0 {
            warn!(
                "  Sensor faults: temperature {}, humidity {}, wind {}, rain {}, light {}",
                summary.temperature_faults,
                summary.humidity_faults,
                summary.wind_faults,
                summary.rain_faults,
                summary.light_faults
            );
        }

        let contended = sync::contended_locks();
        if contended > 0 {
            warn!("  Lock waits over the bound so far: {}", contended);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match StationConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    let summary_interval = config.summary_interval;

    // Sensor setup and the task threads block, keep them off the runtime
    let started = tokio::task::spawn_blocking(move || {
        Station::initialize(config).and_then(Station::start)
    })
    .await?;
    let station = match started {
        Ok(station) => station,
        Err(e) => {
            error!("Failed to start weather station: {}", e);
            return Err(e.into());
        }
    };

    // Log summaries until Ctrl+C
    tokio::select! {
        _ = dashboard_loop(station.snapshot(), station.history(), summary_interval) => {}
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Program terminated by user. Exiting gracefully."),
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
        }
    }

    match tokio::task::spawn_blocking(move || station.shutdown()).await? {
        Ok(()) => info!("Weather station stopped"),
        Err(e) => {
            error!("Shutdown failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
