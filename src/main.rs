//! # Sensor Pipeline
//!
//! Demo binary running the acquisition pipeline against simulated devices.
//!
//! A timer stands in for the data-ready interrupt line and posts the event
//! signal at 500 Hz; the simulated bus synthesizes combined frames the way the
//! real mux would lay them out. Once a second the consumer side takes a
//! snapshot and logs it, which exercises the whole path: bring-up, self-test,
//! calibration warm-up, decode and publish.

use anyhow::Result;
use tokio::time::{interval, Duration};
use tracing::info;
use tracing_subscriber;

use sensor_pipeline::config::Config;
use sensor_pipeline::sensors::SensorPipeline;

mod sim;

/// Data-ready event rate of the simulated interrupt line
const SAMPLE_RATE_HZ: u32 = 500;

/// Main entry point for the sensor pipeline demo
///
/// Initializes logging, loads the configuration from the path given as the
/// first argument (defaults apply when omitted), brings up the pipeline on
/// the simulated devices and runs it until Ctrl+C.
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded or device bring-up
/// fails.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Sensor pipeline v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {path}");
            Config::load(path)?
        }
        None => Config::default(),
    };

    let mut pipeline = SensorPipeline::init(
        &config,
        Box::new(sim::SimBus::new()),
        Box::new(sim::SimImu),
        Some(Box::new(sim::SimMag)),
        Some(Box::new(sim::SimBaro)),
    )
    .await?;

    if !pipeline.run_self_test().await {
        info!("Continuing despite self-test failure (simulated rig)");
    }

    let reader = pipeline.reader();
    let data_ready = pipeline.data_ready();
    tokio::spawn(pipeline.run());

    // The simulated interrupt line
    let period_us = 1_000_000 / u64::from(SAMPLE_RATE_HZ);
    let mut sample_tick = interval(Duration::from_micros(period_us));
    let mut report_tick = interval(Duration::from_secs(1));

    info!("Posting data-ready events at {SAMPLE_RATE_HZ}Hz");
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = sample_tick.tick() => {
                data_ready.post();
            }

            _ = report_tick.tick() => {
                let snapshot = reader.acquire();
                if let (Some(gyro), Some(accel)) = (snapshot.gyro, snapshot.accel) {
                    info!(
                        "gyro [{:+7.2} {:+7.2} {:+7.2}] °/s  accel [{:+6.3} {:+6.3} {:+6.3}] g  calibrated={}",
                        gyro.x, gyro.y, gyro.z,
                        accel.x, accel.y, accel.z,
                        reader.is_calibrated()
                    );
                }
                if let Some(baro) = snapshot.baro {
                    info!(
                        "baro {:.2} mbar  {:.1} °C  {:+.1} m",
                        baro.pressure_mbar, baro.temperature_celsius, baro.altitude_m
                    );
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    Ok(())
}
