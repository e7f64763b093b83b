//! # Acquisition Loop
//!
//! Interrupt-driven acquisition: the data-ready interrupt posts an event
//! signal, the loop wakes, performs one combined bus read, decodes, and
//! publishes all four channels as one atomic group.
//!
//! The loop is the single writer of calibration state and of all publication
//! channels. Its only suspension point is the unbounded wait on the event
//! signal; bus transactions block the loop's own context and nothing else.
//! It runs for the process lifetime and never enters a stopped error state:
//! a failed or short bus read skips the cycle, keeping the previous channel
//! values, and waits for the next event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{info, warn};

use super::channels::SampleChannels;
use super::decoder::MeasurementDecoder;
use super::selftest::{SelfTestFlags, SelfTestOrchestrator};
use super::types::{
    Axis3, BaroSample, PresenceFlags, SampleSet, BARO_BLOCK_LEN, INERTIAL_BLOCK_LEN, MAG_BLOCK_LEN,
};
use crate::bus::SensorBus;
use crate::config::Config;
use crate::devices::{
    AuxReadTarget, BaroDevice, ImuDevice, ImuSettings, InterruptPinConfig, MagDevice,
    AUX_SLAVE_READ_BIT, REGISTER_AUTO_INCREMENT,
};
use crate::error::{Result, SensorPipelineError};

/// Handle the data-ready interrupt posts its event signal through
///
/// `post` is non-blocking and does nothing but wake the acquisition loop;
/// consecutive posts before the loop wakes coalesce into one, exactly like a
/// binary semaphore given from an interrupt handler.
#[derive(Debug, Clone)]
pub struct DataReadySignal {
    notify: Arc<Notify>,
}

impl DataReadySignal {
    /// Signal that a fresh sample is ready to be read
    pub fn post(&self) {
        self.notify.notify_one();
    }
}

/// Consumer handle: non-blocking destructive reads plus read-only diagnostics
#[derive(Debug, Clone)]
pub struct SensorReader {
    channels: Arc<SampleChannels>,
    calibrated: Arc<AtomicBool>,
    self_test: Arc<SelfTestFlags>,
    presence: PresenceFlags,
}

impl SensorReader {
    /// Take the pending accelerometer sample (g), if any
    pub fn read_accel(&self) -> Option<Axis3> {
        self.channels.take_accel()
    }

    /// Take the pending gyro sample (°/s), if any
    pub fn read_gyro(&self) -> Option<Axis3> {
        self.channels.take_gyro()
    }

    /// Take the pending magnetometer sample (gauss), if any
    pub fn read_mag(&self) -> Option<Axis3> {
        self.channels.take_mag()
    }

    /// Take the pending barometer sample, if any
    pub fn read_baro(&self) -> Option<BaroSample> {
        self.channels.take_baro()
    }

    /// Take all four channels as one snapshot
    pub fn acquire(&self) -> SampleSet {
        self.channels.acquire()
    }

    /// Whether the gyro bias / accel scale warm-up has completed
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.calibrated.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn magnetometer_present(&self) -> bool {
        self.presence.magnetometer
    }

    #[must_use]
    pub fn barometer_present(&self) -> bool {
        self.presence.barometer
    }

    #[must_use]
    pub fn imu_test_passed(&self) -> bool {
        self.self_test.imu_passed()
    }

    #[must_use]
    pub fn mag_test_passed(&self) -> bool {
        self.self_test.mag_passed()
    }

    #[must_use]
    pub fn baro_test_passed(&self) -> bool {
        self.self_test.baro_passed()
    }
}

/// The sensor acquisition and calibration pipeline
///
/// Owns the bus, the devices, the decoder (and through it the calibration
/// state) and the publication channels. Everything consumers touch goes
/// through the cloneable [`SensorReader`] and [`DataReadySignal`] handles.
pub struct SensorPipeline {
    bus: Box<dyn SensorBus>,
    imu: Box<dyn ImuDevice>,
    mag: Option<Box<dyn MagDevice>>,
    baro: Option<Box<dyn BaroDevice>>,
    presence: PresenceFlags,
    decoder: MeasurementDecoder,
    channels: Arc<SampleChannels>,
    data_ready: Arc<Notify>,
    calibrated: Arc<AtomicBool>,
    self_test: Arc<SelfTestFlags>,
}

impl SensorPipeline {
    /// Bring up the devices and build the pipeline
    ///
    /// Probes the optional devices exactly once; the resulting presence flags
    /// are constant for the process lifetime. Devices disabled in the
    /// configuration are dropped before probing. Ends by programming the
    /// primary device's bus-master mux so every combined read carries the
    /// auxiliary payloads.
    ///
    /// # Errors
    ///
    /// Returns error if a collaborator's configuration call fails or the
    /// configuration is invalid. A failed connectivity probe is not an error;
    /// it just disables the device.
    pub async fn init(
        config: &Config,
        bus: Box<dyn SensorBus>,
        mut imu: Box<dyn ImuDevice>,
        mag: Option<Box<dyn MagDevice>>,
        baro: Option<Box<dyn BaroDevice>>,
    ) -> Result<Self> {
        let lowpass = config.lowpass_filter().ok_or_else(|| {
            SensorPipelineError::Device(format!("invalid lowpass selection: {:?}", config.imu.lowpass))
        })?;

        let mut mag = if config.devices.enable_magnetometer { mag } else { None };
        let mut baro = if config.devices.enable_barometer { baro } else { None };

        // The sensors need time to power up before the first register access
        sleep(Duration::from_millis(config.pipeline.startup_settle_ms)).await;

        if imu.probe().await? {
            info!("Primary device connection [OK]");
        } else {
            warn!("Primary device connection [FAIL]");
        }

        let settings = ImuSettings {
            gyro_range_dps: config.imu.gyro_range_dps,
            accel_range_g: config.imu.accel_range_g,
            lowpass,
            sample_rate_divider: lowpass.sample_rate_divider(),
        };
        imu.configure(&settings).await?;
        // Aux devices are reached directly through the bypass during bring-up
        imu.set_bus_bypass(true).await?;

        let mut presence = PresenceFlags::default();

        if let Some(mag) = mag.as_deref_mut() {
            if mag.probe().await? {
                presence.magnetometer = true;
                mag.start_continuous().await?;
                info!("Magnetometer connection [OK]");
            } else {
                warn!("Magnetometer connection [FAIL]");
            }
        }

        if let Some(baro) = baro.as_deref_mut() {
            if baro.probe().await? {
                presence.barometer = true;
                baro.set_enabled(true).await?;
                info!("Barometer connection [OK]");
            } else {
                warn!("Barometer connection [FAIL]");
            }
        }

        let decoder =
            MeasurementDecoder::new(config.gyro_deg_per_lsb(), config.accel_g_per_lsb());
        let calibrated = decoder.calibration().ready_flag();

        let mut pipeline = Self {
            bus,
            imu,
            mag,
            baro,
            presence,
            decoder,
            channels: Arc::new(SampleChannels::new()),
            data_ready: Arc::new(Notify::new()),
            calibrated,
            self_test: Arc::new(SelfTestFlags::new()),
        };
        pipeline.setup_aux_slave_reads(lowpass).await?;

        Ok(pipeline)
    }

    /// One-time bus-master mux setup
    ///
    /// Programs the primary device to autonomously read up to two auxiliary
    /// payloads per cycle and append them after its own 14-byte block, so the
    /// acquisition loop never pays a second bus-arbitration round trip. The
    /// data-ready interrupt is enabled last.
    async fn setup_aux_slave_reads(&mut self, lowpass: crate::devices::LowPassFilter) -> Result<()> {
        self.imu
            .set_aux_read_divider(lowpass.aux_read_divider())
            .await?;
        self.imu.set_bus_bypass(false).await?;
        self.imu.set_bus_master(true).await?;
        self.imu
            .set_interrupt_pin(&InterruptPinConfig {
                active_high: true,
                push_pull: true,
                latched: true,
                clear_on_any_read: true,
            })
            .await?;

        if self.presence.magnetometer {
            if let Some(mag) = &self.mag {
                let target = AuxReadTarget {
                    device_address: AUX_SLAVE_READ_BIT | mag.address(),
                    register: mag.status_register(),
                    length: MAG_BLOCK_LEN as u8,
                    delayed: true,
                };
                self.imu.configure_aux_slot(0, &target).await?;
            }
        }

        if self.presence.barometer {
            if let Some(baro) = &self.baro {
                let target = AuxReadTarget {
                    device_address: AUX_SLAVE_READ_BIT | baro.address(),
                    register: baro.status_register() | REGISTER_AUTO_INCREMENT,
                    length: BARO_BLOCK_LEN as u8,
                    delayed: true,
                };
                self.imu.configure_aux_slot(1, &target).await?;
            }
        }

        self.imu.set_data_ready_interrupt(true).await?;
        Ok(())
    }

    /// Signal handle for the data-ready interrupt
    #[must_use]
    pub fn data_ready(&self) -> DataReadySignal {
        DataReadySignal {
            notify: Arc::clone(&self.data_ready),
        }
    }

    /// Consumer handle
    #[must_use]
    pub fn reader(&self) -> SensorReader {
        SensorReader {
            channels: Arc::clone(&self.channels),
            calibrated: Arc::clone(&self.calibrated),
            self_test: Arc::clone(&self.self_test),
            presence: self.presence,
        }
    }

    /// Which auxiliary devices answered their probe
    #[must_use]
    pub fn presence(&self) -> PresenceFlags {
        self.presence
    }

    /// Run the self-test orchestration once; blocking, worst case ≈3 s
    ///
    /// Per-device results land in the reader's diagnostic flags. A failure
    /// does not stop acquisition.
    pub async fn run_self_test(&mut self) -> bool {
        SelfTestOrchestrator::new(
            self.imu.as_mut(),
            self.mag.as_deref_mut(),
            self.baro.as_deref_mut(),
            self.presence,
        )
        .run(&self.self_test)
        .await
    }

    /// Run the acquisition loop forever
    pub async fn run(mut self) {
        info!(
            "Acquisition loop started (frame length {} bytes)",
            self.presence.frame_length()
        );
        loop {
            self.cycle().await;
        }
    }

    /// One acquisition cycle: wait for the event signal, read, decode, publish
    async fn cycle(&mut self) {
        self.data_ready.notified().await;

        let length = self.presence.frame_length();
        let frame = match self
            .bus
            .read(self.imu.address(), self.imu.sample_register(), length)
            .await
        {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Bus read failed, skipping cycle: {e}");
                return;
            }
        };
        if frame.len() < length {
            warn!(
                "Short bus read ({} of {length} bytes), skipping cycle",
                frame.len()
            );
            return;
        }

        let (gyro, accel) = self.decoder.decode_inertial(&frame[..INERTIAL_BLOCK_LEN]);
        let mut set = SampleSet {
            accel: Some(accel),
            gyro: Some(gyro),
            mag: None,
            baro: None,
        };

        let mut offset = INERTIAL_BLOCK_LEN;
        if self.presence.magnetometer {
            set.mag = Some(
                self.decoder
                    .decode_magnetometer(&frame[offset..offset + MAG_BLOCK_LEN]),
            );
            offset += MAG_BLOCK_LEN;
        }
        if self.presence.barometer {
            set.baro = Some(
                self.decoder
                    .decode_barometer(&frame[offset..offset + BARO_BLOCK_LEN]),
            );
        }

        self.channels.publish(&set);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mocks::MockSensorBus;
    use crate::devices::mocks::{MockBaro, MockImu, MockMag};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.pipeline.startup_settle_ms = 0;
        config
    }

    async fn full_pipeline(bus: MockSensorBus) -> (SensorPipeline, MockImu) {
        let imu = MockImu::new();
        let pipeline = SensorPipeline::init(
            &test_config(),
            Box::new(bus),
            Box::new(imu.clone()),
            Some(Box::new(MockMag::new())),
            Some(Box::new(MockBaro::new())),
        )
        .await
        .unwrap();
        (pipeline, imu)
    }

    /// 28-byte combined frame: inertial + mag (DRDY set) + baro (both bits)
    fn combined_frame() -> Vec<u8> {
        let mut frame = vec![0u8; 28];
        // accel z = 4096 LSB (1 g) at the swapped az offset
        frame[4..6].copy_from_slice(&4096i16.to_be_bytes());
        // gyro raw: gy@8, gx@10, gz@12
        frame[8..10].copy_from_slice(&(-8i16).to_be_bytes());
        frame[10..12].copy_from_slice(&15i16.to_be_bytes());
        frame[12..14].copy_from_slice(&3i16.to_be_bytes());
        // mag block @14: DRDY + x/y/z LE
        frame[14] = 0x01;
        frame[15..17].copy_from_slice(&667i16.to_le_bytes());
        frame[17..19].copy_from_slice(&(-667i16).to_le_bytes());
        frame[19..21].copy_from_slice(&1334i16.to_le_bytes());
        // baro block @22: both dirty bits, pressure 4096*1000 LSB, temp 480 LSB
        frame[22] = 0x03;
        let pressure: u32 = 4096 * 1000;
        frame[23] = pressure as u8;
        frame[24] = (pressure >> 8) as u8;
        frame[25] = (pressure >> 16) as u8;
        frame[26..28].copy_from_slice(&480i16.to_le_bytes());
        frame
    }

    #[tokio::test]
    async fn test_init_programs_mux_in_order() {
        let (pipeline, imu) = full_pipeline(MockSensorBus::new()).await;
        assert_eq!(
            pipeline.presence(),
            PresenceFlags {
                magnetometer: true,
                barometer: true
            }
        );

        let calls = imu.recorded_calls();
        let position = |needle: &str| {
            calls
                .iter()
                .position(|call| call.starts_with(needle))
                .unwrap_or_else(|| panic!("missing call {needle}: {calls:?}"))
        };

        // Bring-up before mux, bypass handed over to the bus master,
        // interrupt enabled last
        assert!(position("probe") < position("configure"));
        assert!(position("set_bus_bypass(true)") < position("set_bus_bypass(false)"));
        assert!(position("set_bus_bypass(false)") < position("set_bus_master(true)"));
        assert!(position("configure_aux_slot(0") < position("set_data_ready_interrupt(true)"));
        assert!(position("configure_aux_slot(1") < position("set_data_ready_interrupt(true)"));
        assert_eq!(
            calls.last().map(String::as_str),
            Some("set_data_ready_interrupt(true)")
        );

        // 500 Hz divider from the 8 kHz clock, mag slot 0, baro slot 1 with
        // the read bit and auto-increment applied
        assert!(calls.contains(&"set_aux_read_divider(15)".to_string()));
        assert!(calls.contains(&"configure_aux_slot(0, addr=0x8C, reg=0x02, len=8)".to_string()));
        assert!(calls.contains(&"configure_aux_slot(1, addr=0xDD, reg=0xA7, len=6)".to_string()));
    }

    #[tokio::test]
    async fn test_absent_devices_disable_slots_and_shrink_frame() {
        let imu = MockImu::new();
        let pipeline = SensorPipeline::init(
            &test_config(),
            Box::new(MockSensorBus::new()),
            Box::new(imu.clone()),
            Some(Box::new(MockMag::absent())),
            Some(Box::new(MockBaro::new())),
        )
        .await
        .unwrap();

        assert!(!pipeline.presence().magnetometer);
        assert!(pipeline.presence().barometer);
        assert_eq!(pipeline.presence().frame_length(), 20);

        let calls = imu.recorded_calls();
        assert!(!calls.iter().any(|call| call.starts_with("configure_aux_slot(0")));
        assert!(calls.iter().any(|call| call.starts_with("configure_aux_slot(1")));
    }

    #[tokio::test]
    async fn test_config_disabled_device_never_probed() {
        let mut config = test_config();
        config.devices.enable_magnetometer = false;

        let mag = MockMag::new();
        let pipeline = SensorPipeline::init(
            &config,
            Box::new(MockSensorBus::new()),
            Box::new(MockImu::new()),
            Some(Box::new(mag.clone())),
            None,
        )
        .await
        .unwrap();

        assert!(!pipeline.presence().magnetometer);
        assert!(!*mag.continuous_started.lock().unwrap());
        assert_eq!(pipeline.presence().frame_length(), 14);
    }

    #[tokio::test]
    async fn test_cycle_reads_decodes_and_publishes_group() {
        let bus = MockSensorBus::new();
        bus.push_frame(combined_frame());
        let (mut pipeline, _) = full_pipeline(bus.clone()).await;
        let reader = pipeline.reader();

        pipeline.data_ready().post();
        pipeline.cycle().await;

        // One combined read against the primary's sample block
        assert_eq!(bus.reads_issued(), vec![(0x69, 0x3B, 28)]);

        let accel = reader.read_accel().unwrap();
        assert!((accel.z - 1.0).abs() < 1e-4);
        let mag = reader.read_mag().unwrap();
        assert!((mag.x - 667.0 / 666.7).abs() < 1e-4);
        let baro = reader.read_baro().unwrap();
        assert!((baro.pressure_mbar - 1000.0).abs() < 1e-3);
        assert!(reader.read_gyro().is_some());

        // Destructive: nothing pending until the next cycle
        assert!(reader.read_accel().is_none());
        assert!(reader.read_baro().is_none());
    }

    #[tokio::test]
    async fn test_read_length_follows_presence() {
        let bus = MockSensorBus::new();
        let imu = MockImu::new();
        let mut pipeline = SensorPipeline::init(
            &test_config(),
            Box::new(bus.clone()),
            Box::new(imu),
            Some(Box::new(MockMag::absent())),
            Some(Box::new(MockBaro::absent())),
        )
        .await
        .unwrap();

        pipeline.data_ready().post();
        pipeline.cycle().await;
        assert_eq!(bus.reads_issued(), vec![(0x69, 0x3B, 14)]);
    }

    #[tokio::test]
    async fn test_bus_failure_skips_cycle_and_retains_values() {
        let bus = MockSensorBus::new();
        bus.push_frame(combined_frame());
        let (mut pipeline, _) = full_pipeline(bus.clone()).await;
        let reader = pipeline.reader();

        pipeline.data_ready().post();
        pipeline.cycle().await;

        // Next cycle fails: no publish, the unread previous group survives
        bus.fail_next_reads(1);
        pipeline.data_ready().post();
        pipeline.cycle().await;

        let snapshot = reader.acquire();
        assert!(snapshot.accel.is_some());
        assert!(snapshot.gyro.is_some());
        assert!(snapshot.mag.is_some());
        assert!(snapshot.baro.is_some());
    }

    #[tokio::test]
    async fn test_short_read_skips_cycle() {
        let bus = MockSensorBus::new();
        bus.push_frame(vec![0u8; 10]);
        let (mut pipeline, _) = full_pipeline(bus).await;
        let reader = pipeline.reader();

        pipeline.data_ready().post();
        pipeline.cycle().await;
        assert_eq!(reader.acquire(), SampleSet::default());
    }

    #[tokio::test]
    async fn test_calibration_flag_reaches_reader() {
        let bus = MockSensorBus::new();
        bus.push_frame(combined_frame());
        let (mut pipeline, _) = full_pipeline(bus).await;
        let reader = pipeline.reader();
        assert!(!reader.is_calibrated());

        let signal = pipeline.data_ready();
        for _ in 0..crate::sensors::types::CALIBRATION_SAMPLE_COUNT {
            signal.post();
            pipeline.cycle().await;
        }
        assert!(reader.is_calibrated());

        // Constant warm-up input: the bias matches it and the gyro output
        // zeroes out on the next cycle
        signal.post();
        pipeline.cycle().await;
        let gyro = reader.read_gyro().unwrap();
        assert!(gyro.x.abs() < 1e-4 && gyro.y.abs() < 1e-4 && gyro.z.abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_self_test_results_reach_reader() {
        let bus = MockSensorBus::new();
        let imu = MockImu::new();
        let mag = MockMag::new();
        *mag.self_test_result.lock().unwrap() = false;
        let mut pipeline = SensorPipeline::init(
            &test_config(),
            Box::new(bus),
            Box::new(imu),
            Some(Box::new(mag)),
            Some(Box::new(MockBaro::new())),
        )
        .await
        .unwrap();
        let reader = pipeline.reader();

        let passed = pipeline.run_self_test().await;
        assert!(!passed);
        assert!(reader.imu_test_passed());
        assert!(!reader.mag_test_passed());
        assert!(reader.baro_test_passed());
        assert!(reader.magnetometer_present());
        assert!(reader.barometer_present());
    }
}
