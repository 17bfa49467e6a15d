// Mechanisms, actions and the motor commands they expand to

use std::fmt;

use serde::Serialize;

use crate::config::{
    DRIVE_BACK, DRIVE_LEFT, DRIVE_RIGHT, DRIVE_SIDE_BCK, DRIVE_SIDE_FWD, STEP_BACK,
    STEP_BACK_LIFT, STEP_FRONT, STEP_FRONT_LIFT,
};

/// The three independently latched parts of the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mechanism {
    Drive,
    StepFront,
    StepBack,
}

impl Mechanism {
    pub const ALL: [Mechanism; 3] = [Mechanism::Drive, Mechanism::StepFront, Mechanism::StepBack];
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mechanism::Drive => "drive",
            Mechanism::StepFront => "front lift",
            Mechanism::StepBack => "back lift",
        };
        f.write_str(name)
    }
}

/// Last commanded action of a mechanism.
///
/// Turns carry their speed in percent so a fine turn and a full-speed turn
/// are distinct latch states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    Stop,
    Forward,
    Backward,
    TurnLeft { pct: u8 },
    TurnRight { pct: u8 },
    LiftFront,
    LowerFront,
    LiftBack,
    LowerBack,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Stop => f.write_str("stop"),
            Action::Forward => f.write_str("forward"),
            Action::Backward => f.write_str("backward"),
            Action::TurnLeft { pct } => write!(f, "turn_left({}%)", pct),
            Action::TurnRight { pct } => write!(f, "turn_right({}%)", pct),
            Action::LiftFront => f.write_str("lift_front"),
            Action::LowerFront => f.write_str("lower_front"),
            Action::LiftBack => f.write_str("lift_back"),
            Action::LowerBack => f.write_str("lower_back"),
        }
    }
}

/// Motor writes for one mechanism action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorCommand {
    pub mechanism: Mechanism,
    pub action: Action,
    pub speeds: Vec<(u8, i16)>,
}

impl MotorCommand {
    /// Drive base command. Turns scale the side motors and hold the back wheel.
    pub fn drive(action: Action) -> Self {
        let speeds = match action {
            Action::Forward => vec![
                (DRIVE_LEFT, DRIVE_SIDE_FWD),
                (DRIVE_RIGHT, DRIVE_SIDE_FWD),
                (DRIVE_BACK, DRIVE_SIDE_FWD),
            ],
            Action::Backward => vec![
                (DRIVE_LEFT, DRIVE_SIDE_BCK),
                (DRIVE_RIGHT, DRIVE_SIDE_BCK),
                (DRIVE_BACK, DRIVE_SIDE_BCK),
            ],
            Action::TurnLeft { pct } => vec![
                (DRIVE_LEFT, scaled(DRIVE_SIDE_BCK, pct)),
                (DRIVE_RIGHT, scaled(DRIVE_SIDE_FWD, pct)),
                (DRIVE_BACK, 0),
            ],
            Action::TurnRight { pct } => vec![
                (DRIVE_LEFT, scaled(DRIVE_SIDE_FWD, pct)),
                (DRIVE_RIGHT, scaled(DRIVE_SIDE_BCK, pct)),
                (DRIVE_BACK, 0),
            ],
            _ => Vec::new(),
        };
        Self {
            mechanism: Mechanism::Drive,
            action,
            speeds,
        }
    }

    pub fn step_front(action: Action) -> Self {
        let speeds = match action {
            Action::LiftFront => vec![(STEP_FRONT, STEP_FRONT_LIFT)],
            Action::LowerFront => vec![(STEP_FRONT, -STEP_FRONT_LIFT)],
            _ => Vec::new(),
        };
        Self {
            mechanism: Mechanism::StepFront,
            action,
            speeds,
        }
    }

    pub fn step_back(action: Action) -> Self {
        let speeds = match action {
            Action::LiftBack => vec![(STEP_BACK, STEP_BACK_LIFT)],
            Action::LowerBack => vec![(STEP_BACK, -STEP_BACK_LIFT)],
            _ => Vec::new(),
        };
        Self {
            mechanism: Mechanism::StepBack,
            action,
            speeds,
        }
    }

    /// Motor ids driven by a mechanism
    pub fn motors(mechanism: Mechanism) -> &'static [u8] {
        match mechanism {
            Mechanism::Drive => &[DRIVE_LEFT, DRIVE_RIGHT, DRIVE_BACK],
            Mechanism::StepFront => &[STEP_FRONT],
            Mechanism::StepBack => &[STEP_BACK],
        }
    }
}

fn scaled(speed: i16, pct: u8) -> i16 {
    (i32::from(speed) * i32::from(pct.min(100)) / 100) as i16
}

/// Turn scale 0.0-1.0 to a whole percent
pub fn scale_to_pct(scale: f32) -> u8 {
    (scale.clamp(0.0, 1.0) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_drives_all_wheels() {
        let cmd = MotorCommand::drive(Action::Forward);
        assert_eq!(cmd.speeds.len(), 3);
        assert!(cmd.speeds.iter().all(|&(_, s)| s == DRIVE_SIDE_FWD));
    }

    #[test]
    fn test_turn_scaling() {
        let fine = MotorCommand::drive(Action::TurnLeft { pct: 50 });
        assert_eq!(
            fine.speeds,
            vec![(DRIVE_LEFT, 50), (DRIVE_RIGHT, -50), (DRIVE_BACK, 0)]
        );

        let full = MotorCommand::drive(Action::TurnRight { pct: 100 });
        assert_eq!(
            full.speeds,
            vec![(DRIVE_LEFT, -100), (DRIVE_RIGHT, 100), (DRIVE_BACK, 0)]
        );
    }

    #[test]
    fn test_lift_directions() {
        assert_eq!(
            MotorCommand::step_front(Action::LiftFront).speeds,
            vec![(STEP_FRONT, 100)]
        );
        assert_eq!(
            MotorCommand::step_back(Action::LowerBack).speeds,
            vec![(STEP_BACK, 100)]
        );
        assert!(MotorCommand::step_back(Action::Stop).speeds.is_empty());
    }

    #[test]
    fn test_scale_to_pct() {
        assert_eq!(scale_to_pct(0.5), 50);
        assert_eq!(scale_to_pct(1.0), 100);
        assert_eq!(scale_to_pct(3.0), 100);
        assert_eq!(scale_to_pct(-1.0), 0);
    }
}
