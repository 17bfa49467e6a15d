// Zeroing the lift encoders against the ground

use tracing::info;

use super::{Operation, Sequencer, Stage};
use crate::control::Motion;
use crate::error::Result;

impl Sequencer {
    /// Lower each segment onto the ground, then reset both rotary counters.
    /// A timeout leaves the counters untouched.
    pub(super) async fn zero_segments(&self, operation: Operation, step: u32) -> Result<()> {
        let ctl = self.motion();

        if !self.sensors.front_ground_touch.get() {
            self.enter(operation, step, Stage::ZeroFront);
            ctl.lower_front()?;
            self.until(Stage::ZeroFront, |s| Ok(s.front_ground_touch))
                .await?;
            ctl.stop()?;
        }

        if !self.sensors.back_ground_touch.get() {
            self.enter(operation, step, Stage::ZeroBack);
            ctl.lower_back()?;
            self.until(Stage::ZeroBack, |s| Ok(s.back_ground_touch))
                .await?;
            ctl.stop()?;
        }

        self.sensors.front_lifting_rot.reset();
        self.sensors.back_lifting_rot.reset();
        info!("Lift encoders zeroed");
        Ok(())
    }
}
