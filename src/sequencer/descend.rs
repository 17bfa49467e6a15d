// Descending a flight of stairs backwards

use tracing::{info, warn};

use super::{Operation, Sequencer, Stage};
use crate::control::{Mechanism, Motion};
use crate::error::{Error, Result};
use crate::messages::SensorSnapshot;

const OP: Operation = Operation::Descend;

/// Back or middle of the chassis has lost contact with the ground
fn contact_lost(s: &SensorSnapshot) -> bool {
    !s.back_ground_touch || !s.middle_ground_touch
}

/// A ground touch that was pressed in `start` has since been released
fn contact_released(start: &SensorSnapshot, s: &SensorSnapshot) -> bool {
    (start.back_ground_touch && !s.back_ground_touch)
        || (start.middle_ground_touch && !s.middle_ground_touch)
}

impl Sequencer {
    pub(super) async fn descend_steps(&self) -> Result<u32> {
        let cal = &self.cal;
        let ctl = self.motion();
        let mut over_edge = false;

        for step in 1..=cal.max_steps {
            if !over_edge {
                self.enter(OP, step, Stage::LeaveEdge);
                ctl.backward()?;
                self.until(Stage::LeaveEdge, |s| Ok(contact_lost(s))).await?;
                ctl.stop()?;
            }

            self.enter(OP, step, Stage::PlantFront);
            ctl.lower_front()?;
            self.until(Stage::PlantFront, |s| Ok(s.front_ground_touch))
                .await?;
            ctl.stop()?;

            if step > 1 {
                self.enter(OP, step, Stage::Realign);
                self.aligner().downstairs_find_wall().await?;
            }

            self.enter(OP, step, Stage::LowerBack);
            ctl.lower_back()?;
            self.until(Stage::LowerBack, |s| {
                if s.back_ground_touch {
                    return Ok(true);
                }
                // either the encoder bound or the end stop at full extension
                if s.back_rot >= cal.back_max || s.back_lifting_extended_max {
                    return Err(Error::PhysicalLimitExceeded {
                        mechanism: Mechanism::StepBack,
                        position: s.back_rot,
                        limit: cal.back_max,
                        expected: "back ground touch",
                    });
                }
                Ok(false)
            })
            .await?;
            ctl.stop()?;

            self.enter(OP, step, Stage::ApproachEdge);
            ctl.backward()?;
            self.until(Stage::ApproachEdge, |s| {
                Ok(s.nearest_front().is_none_or(|d| d > cal.descend_edge_cm))
            })
            .await?;
            ctl.stop()?;

            self.enter(OP, step, Stage::LiftBoth);
            ctl.lift_both()?;
            self.until(Stage::LiftBoth, |s| {
                if s.middle_ground_touch {
                    return Ok(true);
                }
                if s.front_rot <= cal.front_min {
                    return Err(Error::PhysicalLimitExceeded {
                        mechanism: Mechanism::StepFront,
                        position: s.front_rot,
                        limit: cal.front_min,
                        expected: "middle ground touch",
                    });
                }
                if s.back_rot <= cal.back_min {
                    return Err(Error::PhysicalLimitExceeded {
                        mechanism: Mechanism::StepBack,
                        position: s.back_rot,
                        limit: cal.back_min,
                        expected: "middle ground touch",
                    });
                }
                Ok(false)
            })
            .await?;
            ctl.stop()?;
            self.hold(cal.settle()).await?;

            self.enter(OP, step, Stage::BackOff);
            ctl.backward()?;
            self.hold(cal.back_off()).await?;
            ctl.stop()?;

            self.enter(OP, step, Stage::SettleFront);
            ctl.lower_front()?;
            self.until(Stage::SettleFront, |s| Ok(s.front_ground_touch))
                .await?;
            ctl.stop()?;
            self.sensors.front_lifting_rot.reset();

            self.enter(OP, step, Stage::BottomProbe);
            let window_start = self.sensors.snapshot();
            ctl.backward()?;
            over_edge = self
                .watch(cal.bottom_probe(), |s| contact_released(&window_start, s))
                .await?;
            ctl.stop()?;

            if !over_edge {
                info!("Bottom of stairs reached after {} step(s)", step);
                self.zero_segments(OP, step).await?;
                return Ok(step);
            }
        }

        warn!("Stopped descending after {} steps", cal.max_steps);
        Ok(cal.max_steps)
    }
}
