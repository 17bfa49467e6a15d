// Climb/descend sequencer
//
// Runs one autonomous operation at a time as a series of stages. Each stage
// loop re-checks the moving flag, evaluates its exit condition against a
// sensor snapshot, issues controller commands, then suspends until a sensor
// changes, the flag clears, or the loop interval passes.

mod climb;
mod descend;
mod zero;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Calibration;
use crate::control::{Controller, Guarded, Motion, WallAligner};
use crate::error::{Error, Result};
use crate::messages::{Progress, SensorSnapshot};
use crate::moving::{MovingFlag, pause};
use crate::sensors::SensorData;

/// Capacity of the progress channel
const PROGRESS_CAPACITY: usize = 64;

/// Autonomous operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Climb,
    Descend,
    Zero,
    FindWall,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Climb => "climb",
            Operation::Descend => "descend",
            Operation::Zero => "zero",
            Operation::FindWall => "find wall",
        };
        f.write_str(name)
    }
}

/// Stages of the climb, descend and zero sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    // climb
    Normalize,
    Align,
    RaiseFront,
    Advance,
    LowerFront,
    BackHeadStart,
    ClimbBoth,
    RaiseBack,
    Coast,
    // descend
    LeaveEdge,
    PlantFront,
    Realign,
    LowerBack,
    ApproachEdge,
    LiftBoth,
    BackOff,
    SettleFront,
    BottomProbe,
    // zero
    ZeroFront,
    ZeroBack,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Normalize => "normalize",
            Stage::Align => "align",
            Stage::RaiseFront => "raise front",
            Stage::Advance => "advance",
            Stage::LowerFront => "lower front",
            Stage::BackHeadStart => "back head start",
            Stage::ClimbBoth => "climb both",
            Stage::RaiseBack => "raise back",
            Stage::Coast => "coast",
            Stage::LeaveEdge => "leave edge",
            Stage::PlantFront => "plant front",
            Stage::Realign => "realign",
            Stage::LowerBack => "lower back",
            Stage::ApproachEdge => "approach edge",
            Stage::LiftBoth => "lift both",
            Stage::BackOff => "back off",
            Stage::SettleFront => "settle front",
            Stage::BottomProbe => "bottom probe",
            Stage::ZeroFront => "zero front",
            Stage::ZeroBack => "zero back",
        };
        f.write_str(name)
    }
}

/// Orchestrates the controller and the aligner against the sensor readings
pub struct Sequencer {
    controller: Arc<Controller>,
    sensors: Arc<SensorData>,
    moving: MovingFlag,
    cal: Calibration,
    progress: broadcast::Sender<Progress>,
    active: Mutex<Option<Operation>>,
}

impl Sequencer {
    pub fn new(
        controller: Arc<Controller>,
        sensors: Arc<SensorData>,
        moving: MovingFlag,
        cal: Calibration,
    ) -> Self {
        let (progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            controller,
            sensors,
            moving,
            cal,
            progress,
            active: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// The operation currently running, if any
    pub fn active(&self) -> Option<Operation> {
        *self.active.lock()
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn sensors(&self) -> &SensorData {
        &self.sensors
    }

    pub fn moving(&self) -> &MovingFlag {
        &self.moving
    }

    pub fn calibration(&self) -> &Calibration {
        &self.cal
    }

    /// Climb stairs until the top is reached. Returns the number of steps.
    pub async fn climb(&self) -> Result<u32> {
        self.execute(Operation::Climb).await
    }

    /// Descend stairs until the bottom is reached. Returns the number of steps.
    pub async fn descend(&self) -> Result<u32> {
        self.execute(Operation::Descend).await
    }

    /// Lower both segments to the ground and reset the rotary counters
    pub async fn zero(&self) -> Result<()> {
        self.execute(Operation::Zero).await.map(|_| ())
    }

    /// Align to the wall in front as a standalone operation
    pub async fn find_wall(&self) -> Result<()> {
        self.execute(Operation::FindWall).await.map(|_| ())
    }

    /// Claim the sequencer and set the moving flag, then run the operation
    pub async fn execute(&self, operation: Operation) -> Result<u32> {
        self.begin(operation)?;
        self.run(operation).await
    }

    /// Claim the sequencer for `operation` and set the moving flag.
    /// Fails with `Busy` while another operation holds it.
    pub fn begin(&self, operation: Operation) -> Result<()> {
        {
            let mut active = self.active.lock();
            if let Some(current) = *active {
                return Err(Error::Busy(current));
            }
            *active = Some(operation);
        }
        self.moving.set();
        info!("Starting {}", operation);
        self.report(Progress::Started { operation });
        Ok(())
    }

    /// Run an operation claimed with [`Sequencer::begin`] and release it
    pub async fn run(&self, operation: Operation) -> Result<u32> {
        let result = match operation {
            Operation::Climb => self.climb_steps().await,
            Operation::Descend => self.descend_steps().await,
            Operation::Zero => self.zero_segments(Operation::Zero, 0).await.map(|_| 0),
            Operation::FindWall => self.aligner().find_wall().await.map(|_| 0),
        };
        self.finish(operation, result)
    }

    /// Settle the flag and the motors, then release the sequencer.
    /// `active` goes last so a new operation cannot start in between.
    fn finish(&self, operation: Operation, result: Result<u32>) -> Result<u32> {
        let progress = match &result {
            Ok(steps) => {
                self.moving.clear();
                info!("Finished {} after {} step(s)", operation, steps);
                Progress::Finished {
                    operation,
                    steps: *steps,
                }
            }
            Err(e) if e.is_fatal() => {
                error!("{} aborted: {}", operation, e);
                self.moving.clear();
                if let Err(stop_err) = self.controller.emergency_stop() {
                    error!("Failed to stop motors after abort: {}", stop_err);
                }
                Progress::Failed {
                    operation,
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                info!("{} cancelled", operation);
                Progress::Cancelled { operation }
            }
        };
        *self.active.lock() = None;
        self.report(progress);
        result
    }

    fn report(&self, progress: Progress) {
        // no subscribers is fine
        let _ = self.progress.send(progress);
    }

    /// Controller commands that stop going out once the flag is cleared
    fn motion(&self) -> Guarded<'_> {
        self.controller.guarded(&self.moving)
    }

    fn aligner(&self) -> WallAligner<'_> {
        WallAligner::new(&self.controller, &self.sensors, &self.moving, &self.cal)
    }

    fn enter(&self, operation: Operation, step: u32, stage: Stage) {
        info!("{} step {}: {}", operation, step, stage);
        self.report(Progress::Stage {
            operation,
            step,
            stage,
        });
    }

    fn check_timeout(&self, stage: Stage, start: Instant) -> Result<()> {
        let elapsed = start.elapsed();
        if elapsed > self.cal.stage_timeout() {
            return Err(Error::StageTimeout { stage, elapsed });
        }
        Ok(())
    }

    /// Loop until `done` returns true. `done` may issue commands each iteration.
    async fn until<F>(&self, stage: Stage, mut done: F) -> Result<()>
    where
        F: FnMut(&SensorSnapshot) -> Result<bool>,
    {
        let start = Instant::now();
        loop {
            self.moving.ensure()?;
            self.check_timeout(stage, start)?;
            if done(&self.sensors.snapshot())? {
                debug!("{} complete", stage);
                return Ok(());
            }
            pause(&self.sensors, &self.moving, self.cal.loop_interval()).await;
        }
    }

    /// Like [`Sequencer::until`], but pauses the mechanism while an obstacle
    /// is in front and calls `resume` once it is gone.
    async fn until_clear<R, F>(
        &self,
        operation: Operation,
        step: u32,
        stage: Stage,
        resume: R,
        mut done: F,
    ) -> Result<()>
    where
        R: Fn() -> Result<()>,
        F: FnMut(&SensorSnapshot) -> Result<bool>,
    {
        let start = Instant::now();
        let mut paused = false;
        loop {
            self.moving.ensure()?;
            self.check_timeout(stage, start)?;

            let snapshot = self.sensors.snapshot();
            if self.obstacle(&snapshot) {
                if !paused {
                    warn!("Obstacle ahead during {}, pausing", stage);
                    self.report(Progress::ObstaclePause { operation, step });
                    self.motion().stop()?;
                    paused = true;
                }
                self.hold(self.cal.obstacle_pause()).await?;
                continue;
            }
            if paused {
                info!("Obstacle cleared, resuming {}", stage);
                resume()?;
                paused = false;
            }

            if done(&snapshot)? {
                debug!("{} complete", stage);
                return Ok(());
            }
            pause(&self.sensors, &self.moving, self.cal.loop_interval()).await;
        }
    }

    /// Front readings disagree sharply while something is close
    fn obstacle(&self, snapshot: &SensorSnapshot) -> bool {
        match (snapshot.front_left, snapshot.front_right) {
            (Some(l), Some(r)) => {
                (l - r).abs() > self.cal.obstacle_delta_cm && l.min(r) <= self.cal.obstacle_near_cm
            }
            _ => false,
        }
    }

    /// Wait a fixed time. Returns early with `Cancelled` if the flag clears.
    async fn hold(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.moving.cleared() => {}
        }
        self.moving.ensure()
    }

    /// Watch `condition` for up to `duration`. True if it was seen.
    async fn watch<F>(&self, duration: Duration, mut condition: F) -> Result<bool>
    where
        F: FnMut(&SensorSnapshot) -> bool,
    {
        let deadline = Instant::now() + duration;
        loop {
            self.moving.ensure()?;
            if condition(&self.sensors.snapshot()) {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let wait = self.cal.loop_interval().min(deadline - now);
            pause(&self.sensors, &self.moving, wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MOTOR_BOARD_ADDR;
    use crate::motor::{MockBus, MotorActuator, SpeedScale, shared};

    fn sequencer() -> (MockBus, Sequencer) {
        let mock = MockBus::new();
        let actuator = MotorActuator::new(shared(mock.clone()), SpeedScale::Raw);
        let seq = Sequencer::new(
            Arc::new(Controller::new(actuator)),
            Arc::new(SensorData::new()),
            MovingFlag::new(),
            Calibration::default(),
        );
        (mock, seq)
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::BackHeadStart.to_string(), "back head start");
        assert_eq!(Operation::FindWall.to_string(), "find wall");
        assert_eq!(
            serde_json::to_string(&Stage::ClimbBoth).unwrap(),
            r#""climb_both""#
        );
    }

    #[test]
    fn test_second_operation_is_busy() {
        let (_mock, seq) = sequencer();
        seq.begin(Operation::Climb).unwrap();
        assert!(seq.moving().is_moving());
        assert!(matches!(
            seq.begin(Operation::Descend),
            Err(Error::Busy(Operation::Climb))
        ));
    }

    #[test]
    fn test_abort_settles_before_release() {
        let (mock, seq) = sequencer();
        let mut progress = seq.subscribe();
        seq.begin(Operation::Zero).unwrap();
        seq.controller().lift_front().unwrap();
        mock.clear_writes();

        let aborted = seq.finish(
            Operation::Zero,
            Err(Error::StageTimeout {
                stage: Stage::ZeroFront,
                elapsed: Duration::from_secs(16),
            }),
        );
        assert!(aborted.is_err());
        assert_eq!(mock.writes_to(MOTOR_BOARD_ADDR).len(), 6);
        assert!(!seq.moving().is_moving());
        assert_eq!(seq.active(), None);

        // the next operation keeps its flag
        seq.begin(Operation::Climb).unwrap();
        assert!(seq.moving().is_moving());

        let events: Vec<Progress> = std::iter::from_fn(|| progress.try_recv().ok()).collect();
        assert!(matches!(
            events.as_slice(),
            [
                Progress::Started { .. },
                Progress::Failed { .. },
                Progress::Started {
                    operation: Operation::Climb
                }
            ]
        ));
    }

    #[test]
    fn test_cancelled_finish_leaves_flag_alone() {
        let (mock, seq) = sequencer();
        seq.begin(Operation::FindWall).unwrap();
        let cancelled = seq.finish(Operation::FindWall, Err(Error::Cancelled));
        assert!(matches!(cancelled, Err(Error::Cancelled)));
        assert!(mock.writes().is_empty());
        assert_eq!(seq.active(), None);
    }

    #[test]
    fn test_obstacle_detection() {
        let (_mock, seq) = sequencer();
        let mut snap = SensorSnapshot {
            front_left: Some(6.0),
            front_right: Some(18.0),
            ..Default::default()
        };
        assert!(seq.obstacle(&snap));

        snap.front_left = Some(16.0);
        assert!(!seq.obstacle(&snap));

        snap.front_left = None;
        assert!(!seq.obstacle(&snap));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_resets_counters() {
        let (_mock, seq) = sequencer();
        seq.sensors().front_ground_touch.set(true);
        seq.sensors().back_ground_touch.set(true);
        seq.sensors().front_lifting_rot.change(-300);
        seq.sensors().back_lifting_rot.change(120);

        seq.zero().await.unwrap();
        assert_eq!(seq.sensors().front_lifting_rot.get(), 0);
        assert_eq!(seq.sensors().back_lifting_rot.get(), 0);
        assert_eq!(seq.active(), None);
        assert!(!seq.moving().is_moving());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_aborts_without_reset() {
        let (mock, seq) = sequencer();
        seq.sensors().front_lifting_rot.change(-300);
        let mut progress = seq.subscribe();

        let result = seq.zero().await;
        assert!(matches!(
            result,
            Err(Error::StageTimeout {
                stage: Stage::ZeroFront,
                ..
            })
        ));
        assert_eq!(seq.sensors().front_lifting_rot.get(), -300);
        assert!(!seq.moving().is_moving());
        // abort ends with every motor braked
        assert!(!seq.controller().latch().any_active());
        assert!(!mock.writes().is_empty());

        let mut failed = false;
        while let Ok(event) = progress.try_recv() {
            failed |= matches!(event, Progress::Failed { .. });
        }
        assert!(failed);
    }
}
