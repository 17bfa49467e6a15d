// Drive/lift controller for Spencer
//
// Primitive mechanism actions built on the motor actuator. Each action checks
// the state latch for its mechanism and is a no-op when nothing changes.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::command::{Action, Mechanism, MotorCommand, scale_to_pct};
use super::latch::StateLatch;
use crate::error::Result;
use crate::motor::MotorActuator;
use crate::moving::MovingFlag;

/// Motion state of one lift segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SegmentState {
    #[default]
    Idle,
    MovingUp,
    MovingDown,
}

impl SegmentState {
    fn for_action(action: Action) -> Self {
        match action {
            Action::LiftFront | Action::LiftBack => SegmentState::MovingUp,
            Action::LowerFront | Action::LowerBack => SegmentState::MovingDown,
            _ => SegmentState::Idle,
        }
    }

    fn reverses(self, next: SegmentState) -> bool {
        matches!(
            (self, next),
            (SegmentState::MovingUp, SegmentState::MovingDown)
                | (SegmentState::MovingDown, SegmentState::MovingUp)
        )
    }
}

#[derive(Default)]
struct ControlState {
    latch: StateLatch,
    front: SegmentState,
    back: SegmentState,
}

impl ControlState {
    fn segment_mut(&mut self, mechanism: Mechanism) -> Option<&mut SegmentState> {
        match mechanism {
            Mechanism::Drive => None,
            Mechanism::StepFront => Some(&mut self.front),
            Mechanism::StepBack => Some(&mut self.back),
        }
    }

    fn reset(&mut self) {
        self.latch.reset_all();
        self.front = SegmentState::Idle;
        self.back = SegmentState::Idle;
    }
}

/// Mechanism primitives. Implemented by the controller itself for manual
/// driving and by [`Guarded`] for autonomous operations.
pub trait Motion {
    /// Issue one mechanism command, unless the latch already holds it
    fn command(&self, command: MotorCommand) -> Result<()>;

    /// Latch every mechanism to stop. Brakes every motor unless all of them
    /// were already stopped.
    fn stop(&self) -> Result<()>;

    fn forward(&self) -> Result<()> {
        self.command(MotorCommand::drive(Action::Forward))
    }

    fn backward(&self) -> Result<()> {
        self.command(MotorCommand::drive(Action::Backward))
    }

    /// Rotate left on the spot. `scale` is 0.0-1.0 of full turning speed.
    fn turn_left(&self, scale: f32) -> Result<()> {
        let pct = scale_to_pct(scale);
        self.command(MotorCommand::drive(Action::TurnLeft { pct }))
    }

    fn turn_right(&self, scale: f32) -> Result<()> {
        let pct = scale_to_pct(scale);
        self.command(MotorCommand::drive(Action::TurnRight { pct }))
    }

    /// Brake only the drive wheels
    fn stop_drive(&self) -> Result<()> {
        self.command(MotorCommand::drive(Action::Stop))
    }

    fn lift_front(&self) -> Result<()> {
        self.command(MotorCommand::step_front(Action::LiftFront))
    }

    fn lower_front(&self) -> Result<()> {
        self.command(MotorCommand::step_front(Action::LowerFront))
    }

    fn stop_front(&self) -> Result<()> {
        self.command(MotorCommand::step_front(Action::Stop))
    }

    fn lift_back(&self) -> Result<()> {
        self.command(MotorCommand::step_back(Action::LiftBack))
    }

    fn lower_back(&self) -> Result<()> {
        self.command(MotorCommand::step_back(Action::LowerBack))
    }

    fn stop_back(&self) -> Result<()> {
        self.command(MotorCommand::step_back(Action::Stop))
    }

    fn lift_both(&self) -> Result<()> {
        self.lift_back()?;
        self.lift_front()
    }

    fn lower_both(&self) -> Result<()> {
        self.lower_back()?;
        self.lower_front()
    }
}

/// Owns the latch and segment states. Methods take `&self` so the controller
/// can be shared between the sequencer and the dispatcher.
pub struct Controller {
    actuator: MotorActuator,
    state: Mutex<ControlState>,
}

impl Controller {
    pub fn new(actuator: MotorActuator) -> Self {
        Self {
            actuator,
            state: Mutex::new(ControlState::default()),
        }
    }

    /// A view whose commands fail with `Cancelled` once `moving` is clear
    pub fn guarded<'a>(&'a self, moving: &'a MovingFlag) -> Guarded<'a> {
        Guarded {
            controller: self,
            moving,
        }
    }

    /// Brake every motor regardless of the latch
    pub fn emergency_stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        warn!("Emergency stop");
        let result = self.actuator.stop_all();
        state.reset();
        result?;
        Ok(())
    }

    /// Coast every motor. Shutdown only.
    pub fn float_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.actuator.float_all()?;
        state.reset();
        Ok(())
    }

    pub fn latch(&self) -> StateLatch {
        self.state.lock().latch.clone()
    }

    fn halt(&self, gate: Option<&MovingFlag>) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(moving) = gate {
            moving.ensure()?;
        }
        if !state.latch.any_active() {
            debug!("stop suppressed, already stopped");
            return Ok(());
        }
        info!("Stopping motors");
        self.actuator.stop_all()?;
        state.reset();
        Ok(())
    }

    fn issue(&self, gate: Option<&MovingFlag>, command: MotorCommand) -> Result<()> {
        let mut state = self.state.lock();
        // checked under the lock: a stop clears the flag before braking
        if let Some(moving) = gate {
            moving.ensure()?;
        }
        let mechanism = command.mechanism;
        if !state.latch.differs(mechanism, command.action) {
            debug!("{} {} suppressed by latch", mechanism, command.action);
            return Ok(());
        }

        let next = SegmentState::for_action(command.action);
        let current = state.segment_mut(mechanism).map(|s| *s);

        if command.action == Action::Stop {
            for &motor_id in MotorCommand::motors(mechanism) {
                self.actuator.stop(motor_id)?;
            }
        } else {
            if current.is_some_and(|s| s.reverses(next)) {
                debug!("{} reversing, braking first", mechanism);
                for &motor_id in MotorCommand::motors(mechanism) {
                    self.actuator.stop(motor_id)?;
                }
            }
            self.actuator.apply(&command)?;
        }

        state.latch.record(mechanism, command.action);
        if let Some(segment) = state.segment_mut(mechanism) {
            *segment = next;
        }
        Ok(())
    }
}

impl Motion for Controller {
    fn command(&self, command: MotorCommand) -> Result<()> {
        self.issue(None, command)
    }

    fn stop(&self) -> Result<()> {
        self.halt(None)
    }
}

/// Controller access for an autonomous operation.
///
/// Every command re-checks the moving flag while holding the controller
/// lock, so nothing is issued after a stop has cleared the flag.
#[derive(Clone, Copy)]
pub struct Guarded<'a> {
    controller: &'a Controller,
    moving: &'a MovingFlag,
}

impl Motion for Guarded<'_> {
    fn command(&self, command: MotorCommand) -> Result<()> {
        self.controller.issue(Some(self.moving), command)
    }

    fn stop(&self) -> Result<()> {
        self.controller.halt(Some(self.moving))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MOTOR_BOARD_ADDR, STEP_FRONT};
    use crate::error::Error;
    use crate::motor::protocol::{MOTOR_COUNT, encode_brake};
    use crate::motor::{MockBus, SpeedScale, shared};

    fn controller() -> (MockBus, Controller) {
        let mock = MockBus::new();
        let actuator = MotorActuator::new(shared(mock.clone()), SpeedScale::Raw);
        (mock, Controller::new(actuator))
    }

    #[test]
    fn test_repeated_action_is_suppressed() {
        let (mock, controller) = controller();
        controller.lift_front().unwrap();
        controller.lift_front().unwrap();
        assert_eq!(mock.writes_to(MOTOR_BOARD_ADDR).len(), 1);
        assert_eq!(controller.state.lock().front, SegmentState::MovingUp);
    }

    #[test]
    fn test_stop_brakes_everything_once() {
        let (mock, controller) = controller();
        controller.stop().unwrap();
        let frames = mock.writes_to(MOTOR_BOARD_ADDR);
        assert_eq!(frames.len(), MOTOR_COUNT as usize);

        mock.clear_writes();
        controller.stop().unwrap();
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn test_stop_after_motion() {
        let (mock, controller) = controller();
        controller.stop().unwrap();
        controller.forward().unwrap();
        mock.clear_writes();

        controller.stop().unwrap();
        assert_eq!(mock.writes_to(MOTOR_BOARD_ADDR).len(), MOTOR_COUNT as usize);
        assert!(!controller.latch().any_active());
    }

    #[test]
    fn test_reversal_brakes_first() {
        let (mock, controller) = controller();
        controller.lift_front().unwrap();
        mock.clear_writes();

        controller.lower_front().unwrap();
        let frames = mock.writes_to(MOTOR_BOARD_ADDR);
        assert_eq!(frames[0], vec![encode_brake(STEP_FRONT)]);
        assert_eq!(frames.len(), 2);
        assert_eq!(controller.state.lock().front, SegmentState::MovingDown);
    }

    #[test]
    fn test_turn_scale_is_part_of_the_latch() {
        let (mock, controller) = controller();
        controller.turn_left(0.5).unwrap();
        controller.turn_left(0.5).unwrap();
        assert_eq!(mock.writes().len(), 3);
        controller.turn_left(1.0).unwrap();
        assert_eq!(mock.writes().len(), 6);
    }

    #[test]
    fn test_failed_write_is_not_latched() {
        let (mock, controller) = controller();
        mock.set_fail_writes(true);
        assert!(controller.forward().is_err());
        assert_eq!(controller.latch().current(Mechanism::Drive), None);

        mock.set_fail_writes(false);
        controller.forward().unwrap();
        assert_eq!(controller.latch().current(Mechanism::Drive), Some(Action::Forward));
    }

    #[test]
    fn test_guarded_refuses_after_flag_cleared() {
        let (mock, controller) = controller();
        let moving = MovingFlag::new();
        moving.set();
        let guarded = controller.guarded(&moving);
        guarded.lift_front().unwrap();

        // a stop lands between the flag check and the next command
        moving.clear();
        controller.emergency_stop().unwrap();
        mock.clear_writes();

        assert!(matches!(guarded.lower_back(), Err(Error::Cancelled)));
        assert!(matches!(guarded.stop(), Err(Error::Cancelled)));
        assert!(mock.writes().is_empty());
        assert!(!controller.latch().any_active());

        // manual driving is not gated
        controller.forward().unwrap();
        assert_eq!(mock.writes_to(MOTOR_BOARD_ADDR).len(), 3);
    }

    #[test]
    fn test_emergency_stop_is_unconditional() {
        let (mock, controller) = controller();
        controller.emergency_stop().unwrap();
        controller.emergency_stop().unwrap();
        assert_eq!(
            mock.writes_to(MOTOR_BOARD_ADDR).len(),
            2 * MOTOR_COUNT as usize
        );
    }
}
