// Error types for the runtime, the controller and the sequencer
use std::time::Duration;

use crate::control::Mechanism;
use crate::motor::BusError;
use crate::sequencer::{Operation, Stage};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A bus write or read failed. Fatal to the running stage.
    #[error("Hardware I/O error: {0}")]
    HardwareIo(#[from] BusError),

    #[error("Sensor {sensor} invalid for {iterations} consecutive readings")]
    SensorInvalid {
        sensor: &'static str,
        iterations: u32,
    },

    #[error("{mechanism} reached {position} (limit {limit}) without {expected}")]
    PhysicalLimitExceeded {
        mechanism: Mechanism,
        position: i32,
        limit: i32,
        expected: &'static str,
    },

    #[error("Stage {stage} did not finish within {}ms", .elapsed.as_millis())]
    StageTimeout { stage: Stage, elapsed: Duration },

    #[error("Cancelled: moving flag cleared")]
    Cancelled,

    #[error("Busy: {0} already in progress")]
    Busy(Operation),

    #[error("Config file error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error must abort the operation (clear the flag, stop all motors)
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Cancelled | Error::Busy(_))
    }
}
