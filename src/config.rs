// Ports, bus addresses, motor wiring and calibration constants
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::motor::SpeedScale;
use crate::sensors::IrModel;

// Dispatcher loop, sensor polling and telemetry rates
pub const LOOP_HZ: u64 = 20;
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const TELEMETRY_HZ: u64 = 10;
pub const SENSOR_REPORT_INTERVAL: Duration = Duration::from_secs(1);

// Command dispatcher (line protocol over TCP)
pub const BIND_ADDR: &str = "0.0.0.0:1050";

// Zenoh topics
pub const TOPIC_SENSORS: &str = "spencer/state/sensors"; // sensor snapshots
pub const TOPIC_PROGRESS: &str = "spencer/state/progress"; // sequencer progress

// Linux I2C bus the boards hang off
pub const I2C_BUS: &str = "/dev/i2c-1";

// Bus addresses
pub const MOTOR_BOARD_ADDR: u8 = 0x04;
pub const ENCODER_BOARD_ADDR: u8 = 0x05;
pub const TOUCH_BOARD_ADDR: u8 = 0x06;
pub const ANALOG_BOARD_ADDR: u8 = 0x07;

// Motor ids on the motor board
pub const DRIVE_BACK: u8 = 1;
pub const STEP_FRONT: u8 = 2;
pub const STEP_BACK: u8 = 3;
pub const DRIVE_RIGHT: u8 = 4;
pub const DRIVE_LEFT: u8 = 5;

// Signed drive speeds (the side motors are mounted reversed)
pub const DRIVE_SIDE_FWD: i16 = -100;
pub const DRIVE_SIDE_BCK: i16 = 100;

// Lift speeds: front lifts with positive speed, back lifts with negative speed
pub const STEP_FRONT_LIFT: i16 = 100;
pub const STEP_BACK_LIFT: i16 = -100;

// Encoder board channels (one signed delta per motor id)
pub const ENCODER_CHANNELS: usize = 6;
pub const ENCODER_FRONT_CHANNEL: usize = STEP_FRONT as usize;
pub const ENCODER_BACK_CHANNEL: usize = STEP_BACK as usize;

// Touch board channels
pub const TOUCH_BACK_GROUND: u8 = 0;
pub const TOUCH_BACK_LIFTING_NORMAL: u8 = 1;
pub const TOUCH_BACK_LIFTING_EXTENDED_MAX: u8 = 2;
pub const TOUCH_BACK_STAIR: u8 = 3;
pub const TOUCH_FRONT_GROUND: u8 = 4;
pub const TOUCH_FRONT_STAIR: u8 = 5;
pub const TOUCH_FRONT_LIFTING_NORMAL: u8 = 6;
pub const TOUCH_FRONT_LIFTING_EXTENDED_MAX: u8 = 7;
pub const TOUCH_MIDDLE_STAIR: u8 = 8;
pub const TOUCH_MIDDLE_GROUND: u8 = 9;

// Analog board channels
pub const ANALOG_CHANNELS: usize = 4;
pub const ANALOG_FRONT_LEFT: usize = 0;
pub const ANALOG_FRONT_RIGHT: usize = 1;
pub const ANALOG_BACK_GROUND: usize = 2;
pub const ANALOG_MIDDLE_GROUND: usize = 3;

/// Thresholds, speeds and timings used by the sequencer and the wall aligner.
///
/// Every value here is a calibration constant for the current chassis. They are
/// re-derived on the hardware rather than computed, so the whole set can be
/// replaced from a JSON file at startup. Missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Fallback interval between stage loop iterations
    pub loop_interval_ms: u64,
    /// Interval between wall alignment iterations
    pub align_interval_ms: u64,

    /// At or below this distance the platform is flush against the wall (cm)
    pub near_cm: f32,
    /// At or beyond this distance the wall is too far to align against (cm)
    pub far_cm: f32,
    /// Left/right difference above which the platform turns to square up (cm)
    pub align_delta_cm: f32,
    /// Left/right difference above which turns run at full speed (cm)
    pub coarse_delta_cm: f32,
    /// Speed scale for fine alignment turns
    pub fine_turn_scale: f32,
    /// Consecutive iterations with an invalid reading before alignment gives up
    pub align_invalid_budget: u32,

    /// Left/right disagreement that counts as an obstacle (cm)
    pub obstacle_delta_cm: f32,
    /// An obstacle only matters within this distance (cm)
    pub obstacle_near_cm: f32,
    pub obstacle_pause_ms: u64,

    /// Front readings beyond this mean there is no further step (cm)
    pub top_distance_cm: f32,
    /// Front reading that marks the platform as back at the edge when descending (cm)
    pub descend_edge_cm: f32,

    /// Rotary position at which a segment counts as lifted off the ground
    pub normalize_rot: i32,
    /// Front segment fully lifted
    pub front_min: i32,
    /// Front segment back at its normal position
    pub front_normal: i32,
    /// Back segment fully lifted
    pub back_min: i32,
    /// Back segment fully extended
    pub back_max: i32,
    /// Added to the mirrored front position to get the back target
    pub back_target_offset: i32,

    pub back_head_start_ms: u64,
    pub coast_ms: u64,
    pub settle_ms: u64,
    pub back_off_ms: u64,
    pub bottom_probe_ms: u64,
    pub stage_timeout_ms: u64,
    pub max_steps: u32,

    pub speed_scale: SpeedScale,
    /// Model of the front IR rangers
    pub ir_model: IrModel,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            loop_interval_ms: 1000 / LOOP_HZ,
            align_interval_ms: 50,
            near_cm: 8.0,
            far_cm: 20.0,
            align_delta_cm: 1.0,
            coarse_delta_cm: 5.0,
            fine_turn_scale: 0.5,
            align_invalid_budget: 60,
            obstacle_delta_cm: 5.0,
            obstacle_near_cm: 10.0,
            obstacle_pause_ms: 500,
            top_distance_cm: 25.0,
            descend_edge_cm: 20.5,
            normalize_rot: -20,
            front_min: -1200,
            front_normal: 0,
            back_min: -200,
            back_max: 1400,
            back_target_offset: 50,
            back_head_start_ms: 1000,
            coast_ms: 1000,
            settle_ms: 300,
            back_off_ms: 500,
            bottom_probe_ms: 2000,
            stage_timeout_ms: 15_000,
            max_steps: 20,
            speed_scale: SpeedScale::Raw,
            ir_model: IrModel::Sharp2D120X,
        }
    }
}

impl Calibration {
    /// Load a calibration file, falling back to defaults for missing keys
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval_ms)
    }

    pub fn align_interval(&self) -> Duration {
        Duration::from_millis(self.align_interval_ms)
    }

    pub fn obstacle_pause(&self) -> Duration {
        Duration::from_millis(self.obstacle_pause_ms)
    }

    pub fn back_head_start(&self) -> Duration {
        Duration::from_millis(self.back_head_start_ms)
    }

    pub fn coast(&self) -> Duration {
        Duration::from_millis(self.coast_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn back_off(&self) -> Duration {
        Duration::from_millis(self.back_off_ms)
    }

    pub fn bottom_probe(&self) -> Duration {
        Duration::from_millis(self.bottom_probe_ms)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_calibration_keeps_defaults() {
        let cal: Calibration =
            serde_json::from_str(r#"{ "near_cm": 6.5, "speed_scale": "percent" }"#).unwrap();
        assert_eq!(cal.near_cm, 6.5);
        assert_eq!(cal.speed_scale, SpeedScale::Percent);
        assert_eq!(cal.far_cm, 20.0);
        assert_eq!(cal.front_min, -1200);
    }

    #[test]
    fn test_thresholds_are_ordered() {
        let cal = Calibration::default();
        assert!(cal.near_cm < cal.far_cm);
        assert!(cal.align_delta_cm < cal.coarse_delta_cm);
        assert!(cal.front_min < cal.normalize_rot);
        assert!(cal.back_min < cal.normalize_rot && cal.back_max > 0);
        assert_eq!(cal.loop_interval(), Duration::from_millis(1000 / LOOP_HZ));
    }
}
