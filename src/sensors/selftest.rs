//! # Self-Test Orchestrator
//!
//! Runs once after device init: the primary device's self-test is retried on
//! a ~10 ms cadence until it passes or the attempt budget is spent (the quad
//! needs up to 3 seconds to stabilize enough to pass), then the auxiliary
//! self-tests run exactly once each if their device is present. The aggregate
//! is an AND-reduction across everything that is enabled; individual results
//! are retained read-only for telemetry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use super::types::PresenceFlags;
use crate::devices::{BaroDevice, ImuDevice, MagDevice};

/// Maximum primary-device self-test attempts (≈3 s at the retry delay)
pub const SELF_TEST_MAX_ATTEMPTS: u32 = 300;

/// Delay between primary-device self-test attempts
pub const SELF_TEST_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Per-device self-test results, exposed read-only to telemetry
///
/// Flags default to passed and are only written by the orchestrator; a device
/// whose test never ran keeps its default.
#[derive(Debug)]
pub struct SelfTestFlags {
    imu: AtomicBool,
    mag: AtomicBool,
    baro: AtomicBool,
}

impl Default for SelfTestFlags {
    fn default() -> Self {
        Self {
            imu: AtomicBool::new(true),
            mag: AtomicBool::new(true),
            baro: AtomicBool::new(true),
        }
    }
}

impl SelfTestFlags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn imu_passed(&self) -> bool {
        self.imu.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn mag_passed(&self) -> bool {
        self.mag.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn baro_passed(&self) -> bool {
        self.baro.load(Ordering::Acquire)
    }

    fn set_imu(&self, passed: bool) {
        self.imu.store(passed, Ordering::Release);
    }

    fn set_mag(&self, passed: bool) {
        self.mag.store(passed, Ordering::Release);
    }

    fn set_baro(&self, passed: bool) {
        self.baro.store(passed, Ordering::Release);
    }
}

/// Bounded-retry self-test across the sensor devices
///
/// `mag` and `baro` are the configuration-enabled auxiliary devices; a
/// disabled device is simply not part of the reduction.
pub struct SelfTestOrchestrator<'a> {
    imu: &'a mut dyn ImuDevice,
    mag: Option<&'a mut (dyn MagDevice + 'static)>,
    baro: Option<&'a mut (dyn BaroDevice + 'static)>,
    presence: PresenceFlags,
}

impl<'a> SelfTestOrchestrator<'a> {
    #[must_use]
    pub fn new(
        imu: &'a mut dyn ImuDevice,
        mag: Option<&'a mut (dyn MagDevice + 'static)>,
        baro: Option<&'a mut (dyn BaroDevice + 'static)>,
        presence: PresenceFlags,
    ) -> Self {
        Self {
            imu,
            mag,
            baro,
            presence,
        }
    }

    /// Run the whole orchestration; blocking, worst case ≈3 s
    ///
    /// Returns the aggregate result. A self-test that fails does not halt
    /// acquisition, but downstream flight-readiness should gate on this.
    pub async fn run(mut self, flags: &SelfTestFlags) -> bool {
        let mut aggregate = true;

        let imu_passed = self.retry_primary().await;
        flags.set_imu(imu_passed);
        aggregate &= imu_passed;

        if let Some(mag) = self.mag.take() {
            aggregate &= self.presence.magnetometer;
            if self.presence.magnetometer {
                let passed = match mag.self_test().await {
                    Ok(passed) => passed,
                    Err(e) => {
                        warn!("Magnetometer self-test errored: {e}");
                        false
                    }
                };
                flags.set_mag(passed);
                aggregate &= passed;
            } else {
                warn!("Magnetometer enabled but not detected");
            }
        }

        if let Some(baro) = self.baro.take() {
            aggregate &= self.presence.barometer;
            if self.presence.barometer {
                let passed = match baro.self_test().await {
                    Ok(passed) => passed,
                    Err(e) => {
                        warn!("Barometer self-test errored: {e}");
                        false
                    }
                };
                flags.set_baro(passed);
                aggregate &= passed;
            } else {
                warn!("Barometer enabled but not detected");
            }
        }

        if aggregate {
            info!("Sensor self-test passed");
        } else {
            warn!("Sensor self-test FAILED");
        }
        aggregate
    }

    /// Retry the primary device's self-test, stopping at the first pass
    async fn retry_primary(&mut self) -> bool {
        for attempt in 1..=SELF_TEST_MAX_ATTEMPTS {
            match self.imu.self_test().await {
                Ok(true) => {
                    info!("Primary device self-test passed (attempt {attempt})");
                    return true;
                }
                Ok(false) => {}
                Err(e) => warn!("Primary device self-test attempt {attempt} errored: {e}"),
            }
            if attempt < SELF_TEST_MAX_ATTEMPTS {
                sleep(SELF_TEST_RETRY_DELAY).await;
            }
        }

        warn!(
            "Primary device self-test failed after {} attempts",
            SELF_TEST_MAX_ATTEMPTS
        );
        false
    }
}
