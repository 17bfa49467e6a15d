// Motor actuator for Spencer
//
// Turns signed speeds for a motor id into motor board frames, and reads the
// encoder deltas back from the encoder board.

use tracing::{debug, info};

use super::bus::{Result, SharedBus};
use super::protocol::{
    COAST_ALL, ENCODER_REQUEST, MOTOR_COUNT, SpeedScale, decode_delta, encode_brake, encode_set,
};
use crate::config::{ENCODER_BOARD_ADDR, MOTOR_BOARD_ADDR};
use crate::control::MotorCommand;

/// Low-level motor access. Cheap to clone; clones share the bus.
#[derive(Clone)]
pub struct MotorActuator {
    bus: SharedBus,
    scale: SpeedScale,
}

impl MotorActuator {
    pub fn new(bus: SharedBus, scale: SpeedScale) -> Self {
        Self { bus, scale }
    }

    /// Spin a motor. Positive is forwards, negative backwards.
    pub fn set(&self, motor_id: u8, speed: i16) -> Result<()> {
        let frame = encode_set(motor_id, speed, self.scale);
        debug!("Motor {} -> {} ({:02X?})", motor_id, speed, frame);
        self.bus.lock().write(MOTOR_BOARD_ADDR, &frame)
    }

    /// Issue every (motor, speed) pair of a mechanism command
    pub fn apply(&self, command: &MotorCommand) -> Result<()> {
        debug!("{} -> {}", command.mechanism, command.action);
        for &(motor_id, speed) in &command.speeds {
            self.set(motor_id, speed)?;
        }
        Ok(())
    }

    /// Brake a single motor
    pub fn stop(&self, motor_id: u8) -> Result<()> {
        debug!("Braking motor {}", motor_id);
        self.bus
            .lock()
            .write(MOTOR_BOARD_ADDR, &[encode_brake(motor_id)])
    }

    /// Brake every motor on the board
    pub fn stop_all(&self) -> Result<()> {
        debug!("Braking all motors");
        let mut bus = self.bus.lock();
        for id in 0..MOTOR_COUNT {
            bus.write(MOTOR_BOARD_ADDR, &[encode_brake(id)])?;
        }
        Ok(())
    }

    /// Let every motor coast. Only used at shutdown.
    pub fn float_all(&self) -> Result<()> {
        info!("Floating all motors");
        self.bus.lock().write(MOTOR_BOARD_ADDR, &[COAST_ALL])
    }

    /// Latch the encoder counts, then read one signed byte per channel
    pub fn read_encoder_deltas(&self, deltas: &mut [i8]) -> Result<()> {
        let mut bus = self.bus.lock();
        bus.write(ENCODER_BOARD_ADDR, &[ENCODER_REQUEST])?;
        for delta in deltas.iter_mut() {
            let mut byte = [0u8; 1];
            bus.read(ENCODER_BOARD_ADDR, &mut byte)?;
            *delta = decode_delta(byte[0]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::bus::{MockBus, shared};

    fn actuator() -> (MockBus, MotorActuator) {
        let mock = MockBus::new();
        let actuator = MotorActuator::new(shared(mock.clone()), SpeedScale::Raw);
        (mock, actuator)
    }

    #[test]
    fn test_set_writes_one_frame() {
        let (mock, actuator) = actuator();
        actuator.set(2, 100).unwrap();
        assert_eq!(mock.writes(), vec![(MOTOR_BOARD_ADDR, vec![92, 100])]);
    }

    #[test]
    fn test_apply_writes_each_pair() {
        let (mock, actuator) = actuator();
        let command = MotorCommand::step_back(crate::control::Action::LowerBack);
        actuator.apply(&command).unwrap();
        assert_eq!(
            mock.writes_to(MOTOR_BOARD_ADDR),
            vec![encode_set(3, 100, SpeedScale::Raw).to_vec()]
        );
    }

    #[test]
    fn test_stop_all_brakes_every_motor() {
        let (mock, actuator) = actuator();
        actuator.stop_all().unwrap();
        let frames = mock.writes_to(MOTOR_BOARD_ADDR);
        assert_eq!(frames.len(), MOTOR_COUNT as usize);
        for (id, frame) in frames.iter().enumerate() {
            assert_eq!(frame, &vec![encode_brake(id as u8)]);
        }
    }

    #[test]
    fn test_float_all_writes_sentinel() {
        let (mock, actuator) = actuator();
        actuator.float_all().unwrap();
        assert_eq!(mock.writes_to(MOTOR_BOARD_ADDR), vec![vec![COAST_ALL]]);
    }

    #[test]
    fn test_read_encoder_deltas() {
        let (mock, actuator) = actuator();
        for byte in [0, 5, 0xFE, 3, 0, 0] {
            mock.inject_read(ENCODER_BOARD_ADDR, &[byte]);
        }

        let mut deltas = [0i8; 6];
        actuator.read_encoder_deltas(&mut deltas).unwrap();
        assert_eq!(deltas, [0, 5, -2, 3, 0, 0]);
        assert_eq!(mock.writes_to(ENCODER_BOARD_ADDR), vec![vec![ENCODER_REQUEST]]);
    }

    #[test]
    fn test_bus_failure_propagates() {
        let (mock, actuator) = actuator();
        mock.set_fail_writes(true);
        assert!(actuator.set(1, 50).is_err());
        assert!(actuator.stop_all().is_err());
    }
}
