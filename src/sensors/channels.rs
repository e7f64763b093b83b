//! # Publication Channels
//!
//! Four independent single-slot, latest-value, overwrite channels with
//! destructive reads.
//!
//! A write always replaces any unread pending value; there is no history and
//! no backpressure. A read takes and clears the slot, returning `None` if
//! nothing was written since the previous read of that slot.
//!
//! All four slots live behind one mutex so the acquisition loop's group
//! publish is indivisible relative to any reader: nobody ever observes a
//! cycle-N value in one channel next to a cycle-(N−1) value in another. The
//! critical section is four fixed-size copies, short enough for the 500 Hz
//! budget of concurrently scheduled work.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::{Axis3, BaroSample, SampleSet};

#[derive(Debug, Default)]
struct Slots {
    accel: Option<Axis3>,
    gyro: Option<Axis3>,
    mag: Option<Axis3>,
    baro: Option<BaroSample>,
}

/// Latest-value sample channels with atomic group publish
#[derive(Debug, Default)]
pub struct SampleChannels {
    slots: Mutex<Slots>,
}

impl SampleChannels {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish one acquisition cycle's outputs as an indivisible group
    ///
    /// Slots whose sample is `None` (absent device) are left untouched.
    pub fn publish(&self, set: &SampleSet) {
        let mut slots = self.lock();
        if let Some(accel) = set.accel {
            slots.accel = Some(accel);
        }
        if let Some(gyro) = set.gyro {
            slots.gyro = Some(gyro);
        }
        if let Some(mag) = set.mag {
            slots.mag = Some(mag);
        }
        if let Some(baro) = set.baro {
            slots.baro = Some(baro);
        }
    }

    /// Take the pending accelerometer sample, if any
    pub fn take_accel(&self) -> Option<Axis3> {
        self.lock().accel.take()
    }

    /// Take the pending gyro sample, if any
    pub fn take_gyro(&self) -> Option<Axis3> {
        self.lock().gyro.take()
    }

    /// Take the pending magnetometer sample, if any
    pub fn take_mag(&self) -> Option<Axis3> {
        self.lock().mag.take()
    }

    /// Take the pending barometer sample, if any
    pub fn take_baro(&self) -> Option<BaroSample> {
        self.lock().baro.take()
    }

    /// Take all four slots as one snapshot under a single lock
    pub fn acquire(&self) -> SampleSet {
        let mut slots = self.lock();
        SampleSet {
            accel: slots.accel.take(),
            gyro: slots.gyro.take(),
            mag: slots.mag.take(),
            baro: slots.baro.take(),
        }
    }
}
