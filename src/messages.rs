// Message types shared by the dispatcher and telemetry

use std::fmt;

use serde::Serialize;

use crate::sequencer::{Operation, Stage};

/// Every sensor reading at one instant.
/// Distances are `None` when out of range or never sampled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub front_left: Option<f32>,
    pub front_right: Option<f32>,
    pub back_ground_dist: Option<f32>,
    pub middle_ground_dist: Option<f32>,
    pub front_ground_touch: bool,
    pub middle_ground_touch: bool,
    pub back_ground_touch: bool,
    pub front_stair_touch: bool,
    pub middle_stair_touch: bool,
    pub back_stair_touch: bool,
    pub front_lifting_normal: bool,
    pub back_lifting_normal: bool,
    pub front_lifting_extended_max: bool,
    pub back_lifting_extended_max: bool,
    pub front_rot: i32,
    pub back_rot: i32,
}

impl SensorSnapshot {
    /// Nearest valid front distance
    pub fn nearest_front(&self) -> Option<f32> {
        match (self.front_left, self.front_right) {
            (Some(l), Some(r)) => Some(l.min(r)),
            (Some(v), None) | (None, Some(v)) => Some(v),
            (None, None) => None,
        }
    }

    /// True when every front reading is out of range or farther than `cm`
    pub fn front_beyond(&self, cm: f32) -> bool {
        [self.front_left, self.front_right]
            .into_iter()
            .all(|d| d.is_none_or(|v| v > cm))
    }
}

/// Progress of an autonomous operation, relayed to clients as status lines
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Progress {
    Started {
        operation: Operation,
    },
    Stage {
        operation: Operation,
        step: u32,
        stage: Stage,
    },
    ObstaclePause {
        operation: Operation,
        step: u32,
    },
    Finished {
        operation: Operation,
        steps: u32,
    },
    Cancelled {
        operation: Operation,
    },
    Failed {
        operation: Operation,
        reason: String,
    },
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Started { operation } => write!(f, "Starting {}", operation),
            Progress::Stage {
                operation,
                step,
                stage,
            } => write!(f, "{} step {}: {}", operation, step, stage),
            Progress::ObstaclePause { operation, step } => {
                write!(f, "{} step {}: obstacle ahead, pausing", operation, step)
            }
            Progress::Finished { operation, steps } => {
                write!(f, "Finished {} after {} step(s)", operation, steps)
            }
            Progress::Cancelled { operation } => write!(f, "Cancelled {}", operation),
            Progress::Failed { operation, reason } => {
                write!(f, "Error: {} failed: {}", operation, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_front() {
        let mut snap = SensorSnapshot::default();
        assert_eq!(snap.nearest_front(), None);
        snap.front_right = Some(12.0);
        assert_eq!(snap.nearest_front(), Some(12.0));
        snap.front_left = Some(9.0);
        assert_eq!(snap.nearest_front(), Some(9.0));
    }

    #[test]
    fn test_front_beyond() {
        let mut snap = SensorSnapshot::default();
        assert!(snap.front_beyond(25.0));
        snap.front_left = Some(27.0);
        assert!(snap.front_beyond(25.0));
        snap.front_right = Some(14.0);
        assert!(!snap.front_beyond(25.0));
    }

    #[test]
    fn test_progress_lines() {
        let line = Progress::Stage {
            operation: Operation::Climb,
            step: 2,
            stage: Stage::RaiseFront,
        }
        .to_string();
        assert_eq!(line, "climb step 2: raise front");

        let json = serde_json::to_string(&Progress::Finished {
            operation: Operation::Descend,
            steps: 3,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"finished","operation":"descend","steps":3}"#);
    }
}
