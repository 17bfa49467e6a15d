// Sensors for Spencer
//
// Provides:
// - Latest-value readings for touch, distance and rotary sensors
// - Sharp IR ranger conversion
// - The full sensor set with change notification
// - Polling threads feeding the readings from the bus

pub mod data;
pub mod distance;
pub mod poller;
pub mod reading;

pub use data::SensorData;
pub use distance::IrModel;
pub use poller::SensorPollers;
pub use reading::{Distance, Rotary, Sample, SensorReading, Touch};
