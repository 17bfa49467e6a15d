// Climbing one flight of stairs, one step per pass

use tracing::{info, warn};

use super::{Operation, Sequencer, Stage};
use crate::control::Motion;
use crate::error::Result;

const OP: Operation = Operation::Climb;

impl Sequencer {
    pub(super) async fn climb_steps(&self) -> Result<u32> {
        let cal = &self.cal;
        let ctl = self.motion();

        for step in 1..=cal.max_steps {
            self.enter(OP, step, Stage::Normalize);
            self.until(Stage::Normalize, |s| {
                let front_home = s.front_rot <= cal.normalize_rot || s.front_lifting_normal;
                let back_home = s.back_rot <= cal.normalize_rot || s.back_lifting_normal;
                if front_home {
                    ctl.stop_front()?;
                } else {
                    ctl.lift_front()?;
                }
                if back_home {
                    ctl.stop_back()?;
                } else {
                    ctl.lift_back()?;
                }
                Ok(front_home && back_home)
            })
            .await?;

            self.enter(OP, step, Stage::Align);
            self.aligner().find_wall().await?;

            self.enter(OP, step, Stage::RaiseFront);
            ctl.lift_front()?;
            self.until_clear(OP, step, Stage::RaiseFront, || ctl.lift_front(), |s| {
                Ok(s.front_rot <= cal.front_min)
            })
            .await?;
            ctl.stop()?;

            self.enter(OP, step, Stage::Advance);
            ctl.forward()?;
            self.until_clear(OP, step, Stage::Advance, || ctl.forward(), |s| {
                Ok(s.middle_stair_touch)
            })
            .await?;
            ctl.stop()?;

            self.enter(OP, step, Stage::LowerFront);
            ctl.lower_front()?;
            self.until(Stage::LowerFront, |s| {
                Ok(s.front_ground_touch || s.front_rot >= cal.front_normal)
            })
            .await?;
            ctl.stop()?;

            self.enter(OP, step, Stage::BackHeadStart);
            ctl.lower_back()?;
            self.hold(cal.back_head_start()).await?;
            ctl.stop()?;

            self.enter(OP, step, Stage::ClimbBoth);
            let front_start = self.sensors.front_lifting_rot.get();
            let target_back = (cal.back_target_offset - front_start).min(cal.back_max);
            info!("Targeting back lifting of {}", target_back);
            ctl.lower_both()?;
            self.until(Stage::ClimbBoth, |s| {
                if s.middle_ground_touch {
                    return Ok(true);
                }
                let mut drive = false;
                if s.front_rot < cal.front_normal {
                    ctl.lower_front()?;
                } else {
                    ctl.stop_front()?;
                    drive = true;
                }
                if s.back_rot < target_back {
                    ctl.lower_back()?;
                } else {
                    ctl.stop_back()?;
                    drive = true;
                }
                if drive {
                    ctl.forward()?;
                }
                Ok(false)
            })
            .await?;
            ctl.stop()?;

            self.enter(OP, step, Stage::RaiseBack);
            ctl.lift_back()?;
            self.until(Stage::RaiseBack, |s| Ok(s.back_rot <= cal.back_min))
                .await?;
            ctl.stop()?;

            self.enter(OP, step, Stage::Coast);
            ctl.forward()?;
            self.hold(cal.coast()).await?;
            ctl.stop()?;

            if self.sensors.snapshot().front_beyond(cal.top_distance_cm) {
                info!("Top of stairs reached after {} step(s)", step);
                return Ok(step);
            }
        }

        warn!("Stopped climbing after {} steps without reaching the top", cal.max_steps);
        Ok(cal.max_steps)
    }
}
