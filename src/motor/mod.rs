// Motor and bus access for Spencer
//
// Provides:
// - Addressed bus abstraction over Linux I2C, with an in-memory mock
// - Motor board framing (two-byte speed commands, brake and coast bytes)
// - Motor actuator API (set/stop/stop_all/float_all, encoder deltas)

mod actuator;
pub mod bus;
pub mod i2c;
pub mod protocol;

pub use actuator::MotorActuator;
pub use bus::{Bus, BusError, MockBus, SharedBus, shared};
pub use i2c::I2cBus;
pub use protocol::SpeedScale;
