// Wall alignment
//
// Squares the platform to a wall or step edge using the two front IR rangers,
// then stops close to it. Runs until aligned, cancelled or out of budget.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::controller::{Controller, Motion};
use crate::config::Calibration;
use crate::error::{Error, Result};
use crate::moving::{MovingFlag, pause};
use crate::sensors::SensorData;
use crate::sequencer::Stage;

/// Which way the aligner is facing the stairs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignMode {
    /// Approach the riser until within the near threshold
    Upstairs,
    /// Succeed as soon as the gap to the riser is at least the far threshold
    Downstairs,
}

/// One alignment decision. Turn values are the 0.0-1.0 speed scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlignStep {
    Forward,
    TurnLeft(f32),
    TurnRight(f32),
    Done,
}

/// Decide the next move from the two front distances
pub fn decide(
    left: Option<f32>,
    right: Option<f32>,
    cal: &Calibration,
    mode: AlignMode,
) -> AlignStep {
    match (left, right) {
        (Some(l), None) if l >= cal.far_cm => AlignStep::TurnLeft(1.0),
        (None, Some(r)) if r >= cal.far_cm => AlignStep::TurnRight(1.0),
        (Some(l), Some(r)) => {
            let distance = l.min(r);
            let delta = l - r;

            if distance >= cal.far_cm {
                return match mode {
                    AlignMode::Upstairs => AlignStep::Forward,
                    AlignMode::Downstairs => AlignStep::Done,
                };
            }

            if delta.abs() > cal.align_delta_cm {
                let scale = if delta.abs() > cal.coarse_delta_cm {
                    1.0
                } else {
                    cal.fine_turn_scale
                };
                // turn toward the farther side
                return if delta > 0.0 {
                    AlignStep::TurnLeft(scale)
                } else {
                    AlignStep::TurnRight(scale)
                };
            }

            if distance <= cal.near_cm {
                AlignStep::Done
            } else {
                AlignStep::Forward
            }
        }
        _ => AlignStep::Forward,
    }
}

/// Closed-loop alignment against the front distance sensors
pub struct WallAligner<'a> {
    controller: &'a Controller,
    sensors: &'a SensorData,
    moving: &'a MovingFlag,
    cal: &'a Calibration,
}

impl<'a> WallAligner<'a> {
    pub fn new(
        controller: &'a Controller,
        sensors: &'a SensorData,
        moving: &'a MovingFlag,
        cal: &'a Calibration,
    ) -> Self {
        Self {
            controller,
            sensors,
            moving,
            cal,
        }
    }

    /// Drive up to the riser and square the platform to it
    pub async fn find_wall(&self) -> Result<()> {
        self.run(AlignMode::Upstairs, Stage::Align).await
    }

    /// Square up facing the riser behind a downward step
    pub async fn downstairs_find_wall(&self) -> Result<()> {
        self.run(AlignMode::Downstairs, Stage::Realign).await
    }

    async fn run(&self, mode: AlignMode, stage: Stage) -> Result<()> {
        let start = Instant::now();
        let mut invalid = 0u32;
        let mut last = None;

        loop {
            self.moving.ensure()?;

            let elapsed = start.elapsed();
            if elapsed > self.cal.stage_timeout() {
                return Err(Error::StageTimeout { stage, elapsed });
            }

            let left = self.sensors.front_dist_left.get();
            let right = self.sensors.front_dist_right.get();

            match (left, right) {
                (Some(_), Some(_)) => invalid = 0,
                _ => {
                    invalid += 1;
                    if invalid > self.cal.align_invalid_budget {
                        let sensor = if left.is_none() {
                            self.sensors.front_dist_left.name()
                        } else {
                            self.sensors.front_dist_right.name()
                        };
                        warn!("{} stayed invalid during alignment", sensor);
                        return Err(Error::SensorInvalid {
                            sensor,
                            iterations: invalid,
                        });
                    }
                }
            }

            let motion = self.controller.guarded(self.moving);
            let step = decide(left, right, self.cal, mode);
            if last != Some(step) {
                debug!("align {:?}: left={:?} right={:?}", step, left, right);
                last = Some(step);
            }

            match step {
                AlignStep::Forward => motion.forward()?,
                AlignStep::TurnLeft(scale) => motion.turn_left(scale)?,
                AlignStep::TurnRight(scale) => motion.turn_right(scale)?,
                AlignStep::Done => {
                    motion.stop()?;
                    info!("Aligned to wall ({:?})", mode);
                    return Ok(());
                }
            }

            pause(self.sensors, self.moving, self.cal.align_interval()).await;
        }
    }
}
