// Motor board command framing
//
// Set speed:   [(id << 5) | 0x18 | (mode << 1), magnitude]
// Brake motor: [(id << 5) | (BRAKE << 1)]
// Coast all:   [0x01]

use serde::{Deserialize, Serialize};

/// Number of motor outputs on the board
pub const MOTOR_COUNT: u8 = 6;

/// Single-byte sentinel: the board floats every motor when bit 0 is set
pub const COAST_ALL: u8 = 0x01;

/// Request byte that makes the encoder board latch and return its deltas
pub const ENCODER_REQUEST: u8 = 6;

/// Flag bits that mark a two-byte speed command
const SPEED_FLAGS: u8 = 0x18;

/// Motor drive modes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Float = 0,
    Brake = 1,
    Forward = 2,
    Backward = 3,
}

/// How a speed magnitude is written to the board.
///
/// The first board revision takes the raw byte (0-255); the later one takes a
/// percentage that is scaled by 2.55 before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedScale {
    #[default]
    Raw,
    Percent,
}

impl SpeedScale {
    /// Clamp a signed speed and convert its magnitude to the wire byte
    pub fn magnitude(self, speed: i16) -> u8 {
        let magnitude = speed.unsigned_abs();
        match self {
            SpeedScale::Raw => magnitude.min(255) as u8,
            SpeedScale::Percent => (u32::from(magnitude.min(100)) * 255 / 100) as u8,
        }
    }
}

fn header(motor_id: u8, mode: Mode) -> u8 {
    (motor_id << 5) | ((mode as u8) << 1)
}

/// Encode a signed speed command. The sign selects the direction.
pub fn encode_set(motor_id: u8, speed: i16, scale: SpeedScale) -> [u8; 2] {
    let mode = if speed >= 0 {
        Mode::Forward
    } else {
        Mode::Backward
    };
    [header(motor_id, mode) | SPEED_FLAGS, scale.magnitude(speed)]
}

/// Encode a brake command for a single motor
pub fn encode_brake(motor_id: u8) -> u8 {
    header(motor_id, Mode::Brake)
}

/// Encoder deltas are signed 8-bit values
pub fn decode_delta(raw: u8) -> i8 {
    raw as i8
}
