//! # Sensor Bus Module
//!
//! Trait abstraction over the raw bus-transaction primitive.
//!
//! The acquisition loop issues exactly one combined read per data-ready event:
//! the primary device's 14-byte inertial block followed by whatever auxiliary
//! payloads the bus-master mux has appended. The transaction itself is a
//! collaborator concern; this module only defines the seam and a mock for
//! testing.
//!
//! The original firmware never checked the transaction result. Here the read is
//! explicitly fallible so the acquisition loop can skip a cycle instead of
//! propagating garbage.

use async_trait::async_trait;

use crate::error::Result;

/// Trait for synchronous sensor bus reads
///
/// Implementations block the caller (the acquisition loop's own context) for
/// the duration of the transaction.
#[async_trait]
pub trait SensorBus: Send {
    /// Read `length` bytes starting at `register_address` of the device at
    /// `device_address`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SensorPipelineError::Bus`] if the transaction
    /// fails. The returned buffer is expected to hold exactly `length` bytes;
    /// short reads are treated as failures by the caller.
    async fn read(
        &mut self,
        device_address: u8,
        register_address: u8,
        length: usize,
    ) -> Result<Vec<u8>>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::SensorPipelineError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Mock sensor bus for testing
    ///
    /// Serves queued frames in order, repeating the last one when the queue
    /// runs dry. Individual reads can be forced to fail.
    #[derive(Clone)]
    pub struct MockSensorBus {
        pub frames: Arc<Mutex<VecDeque<Vec<u8>>>>,
        pub last_frame: Arc<Mutex<Option<Vec<u8>>>>,
        pub fail_reads: Arc<Mutex<u32>>,
        pub read_log: Arc<Mutex<Vec<(u8, u8, usize)>>>,
    }

    impl MockSensorBus {
        pub fn new() -> Self {
            Self {
                frames: Arc::new(Mutex::new(VecDeque::new())),
                last_frame: Arc::new(Mutex::new(None)),
                fail_reads: Arc::new(Mutex::new(0)),
                read_log: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn push_frame(&self, frame: Vec<u8>) {
            self.frames.lock().unwrap().push_back(frame);
        }

        /// Make the next `count` reads fail
        pub fn fail_next_reads(&self, count: u32) {
            *self.fail_reads.lock().unwrap() = count;
        }

        pub fn reads_issued(&self) -> Vec<(u8, u8, usize)> {
            self.read_log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SensorBus for MockSensorBus {
        async fn read(
            &mut self,
            device_address: u8,
            register_address: u8,
            length: usize,
        ) -> Result<Vec<u8>> {
            self.read_log
                .lock()
                .unwrap()
                .push((device_address, register_address, length));

            {
                let mut failures = self.fail_reads.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(SensorPipelineError::Bus("Mock read error".to_string()));
                }
            }

            let frame = match self.frames.lock().unwrap().pop_front() {
                Some(frame) => frame,
                None => self
                    .last_frame
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| vec![0u8; length]),
            };
            *self.last_frame.lock().unwrap() = Some(frame.clone());

            Ok(frame)
        }
    }
}
