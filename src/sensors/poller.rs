// Sensor polling threads
//
// One OS thread per sensor group (encoders, touch board, analog board). Each
// thread polls its board at a fixed interval and pushes the result into the
// shared `SensorData`. Bus failures are logged and retried on the next cycle.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::data::SensorData;
use super::distance::IrModel;
use crate::config::{
    ANALOG_BACK_GROUND, ANALOG_BOARD_ADDR, ANALOG_CHANNELS, ANALOG_FRONT_LEFT,
    ANALOG_FRONT_RIGHT, ANALOG_MIDDLE_GROUND, ENCODER_BACK_CHANNEL, ENCODER_CHANNELS, ENCODER_FRONT_CHANNEL, TOUCH_BOARD_ADDR,
};
use crate::motor::bus::{Result, SharedBus};
use crate::motor::MotorActuator;

/// Consecutive failures between repeated warnings
const FAILURE_LOG_EVERY: u32 = 50;

/// Handles to the running poller threads
pub struct SensorPollers {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl SensorPollers {
    /// Start the encoder, touch and distance pollers
    pub fn spawn(
        actuator: MotorActuator,
        bus: SharedBus,
        sensors: Arc<SensorData>,
        ir_model: IrModel,
        interval: Duration,
    ) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(3);

        let encoder_sensors = sensors.clone();
        handles.push(spawn_group("encoders", shutdown.clone(), interval, move || {
            poll_encoders(&actuator, &encoder_sensors)
        })?);

        let touch_bus = bus.clone();
        let touch_sensors = sensors.clone();
        handles.push(spawn_group("touch", shutdown.clone(), interval, move || {
            poll_touch(&touch_bus, &touch_sensors)
        })?);

        handles.push(spawn_group("distance", shutdown.clone(), interval, move || {
            poll_distance(&bus, &sensors, ir_model)
        })?);

        info!("Sensor pollers started ({}ms interval)", interval.as_millis());
        Ok(Self { shutdown, handles })
    }

    /// Signal every poller and wait for them to exit
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles {
            if handle.join().is_err() {
                warn!("Sensor poller panicked");
            }
        }
        info!("Sensor pollers stopped");
    }
}

fn spawn_group<F>(
    group: &'static str,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
    mut poll: F,
) -> io::Result<JoinHandle<()>>
where
    F: FnMut() -> Result<()> + Send + 'static,
{
    thread::Builder::new()
        .name(format!("poll-{}", group))
        .spawn(move || {
            debug!("{} poller started", group);
            let mut failures = 0u32;

            while !shutdown.load(Ordering::Relaxed) {
                let cycle_start = Instant::now();

                match poll() {
                    Ok(()) => {
                        if failures > 0 {
                            info!("{} poller recovered after {} failure(s)", group, failures);
                        }
                        failures = 0;
                    }
                    Err(e) => {
                        failures += 1;
                        if failures == 1 || failures % FAILURE_LOG_EVERY == 0 {
                            warn!("{} poll failed ({} in a row): {}", group, failures, e);
                        }
                    }
                }

                let elapsed = cycle_start.elapsed();
                if elapsed < interval {
                    thread::sleep(interval - elapsed);
                }
            }

            debug!("{} poller stopped", group);
        })
}

/// Read one set of encoder deltas and accumulate the lift positions
pub fn poll_encoders(actuator: &MotorActuator, sensors: &SensorData) -> Result<()> {
    let mut deltas = [0i8; ENCODER_CHANNELS];
    actuator.read_encoder_deltas(&mut deltas)?;
    sensors
        .front_lifting_rot
        .change(i32::from(deltas[ENCODER_FRONT_CHANNEL]));
    sensors
        .back_lifting_rot
        .change(i32::from(deltas[ENCODER_BACK_CHANNEL]));
    Ok(())
}

/// Read the touch board bitmask and update every touch reading
pub fn poll_touch(bus: &SharedBus, sensors: &SensorData) -> Result<()> {
    let mut raw = [0u8; 2];
    bus.lock().read(TOUCH_BOARD_ADDR, &mut raw)?;
    let mask = u16::from_le_bytes(raw);
    for (channel, touch) in sensors.touch_channels() {
        touch.set(mask & (1 << channel) != 0);
    }
    Ok(())
}

/// Read every IR ranger on the analog board and convert to centimetres
pub fn poll_distance(bus: &SharedBus, sensors: &SensorData, model: IrModel) -> Result<()> {
    let mut raw = [0u8; ANALOG_CHANNELS * 2];
    bus.lock().read(ANALOG_BOARD_ADDR, &mut raw)?;

    let value = |channel: usize| u16::from_le_bytes([raw[channel * 2], raw[channel * 2 + 1]]);
    for (channel, reading) in [
        (ANALOG_FRONT_LEFT, &sensors.front_dist_left),
        (ANALOG_FRONT_RIGHT, &sensors.front_dist_right),
        (ANALOG_BACK_GROUND, &sensors.back_ground_dist),
        (ANALOG_MIDDLE_GROUND, &sensors.middle_ground_dist),
    ] {
        match model.to_centimetres(value(channel)) {
            Some(cm) => reading.update(cm),
            None => reading.invalidate(),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENCODER_BOARD_ADDR;
    use crate::motor::{MockBus, SpeedScale, shared};

    fn setup() -> (MockBus, SharedBus, SensorData) {
        let mock = MockBus::new();
        let bus = shared(mock.clone());
        (mock, bus, SensorData::new())
    }

    #[test]
    fn test_poll_encoders_accumulates() {
        let (mock, bus, sensors) = setup();
        let actuator = MotorActuator::new(bus, SpeedScale::Raw);

        for byte in [0, 0, 0xF6, 4, 0, 0, 0, 0, 0xFB, 1, 0, 0] {
            mock.inject_read(ENCODER_BOARD_ADDR, &[byte]);
        }
        poll_encoders(&actuator, &sensors).unwrap();
        poll_encoders(&actuator, &sensors).unwrap();

        assert_eq!(sensors.front_lifting_rot.get(), -15);
        assert_eq!(sensors.back_lifting_rot.get(), 5);
    }

    #[test]
    fn test_poll_touch_decodes_bitmask() {
        let (mock, bus, sensors) = setup();
        // channels 4 (front ground), 7 (front extended max) and 9 (middle ground)
        let mask: u16 = (1 << 4) | (1 << 7) | (1 << 9);
        mock.inject_read(TOUCH_BOARD_ADDR, &mask.to_le_bytes());
        poll_touch(&bus, &sensors).unwrap();

        assert!(sensors.front_ground_touch.get());
        assert!(sensors.middle_ground_touch.get());
        assert!(sensors.front_lifting_extended_max.get());
        assert!(!sensors.back_lifting_extended_max.get());
        assert!(!sensors.back_ground_touch.get());
        assert!(!sensors.front_stair_touch.get());
    }

    #[test]
    fn test_poll_distance_converts_and_invalidates() {
        let (mock, bus, sensors) = setup();
        let mut raw = Vec::new();
        raw.extend_from_slice(&219u16.to_le_bytes());
        raw.extend_from_slice(&0u16.to_le_bytes());
        raw.extend_from_slice(&300u16.to_le_bytes());
        raw.extend_from_slice(&219u16.to_le_bytes());
        mock.inject_read(ANALOG_BOARD_ADDR, &raw);
        poll_distance(&bus, &sensors, IrModel::Sharp2D120X).unwrap();

        let left = sensors.front_dist_left.get().unwrap();
        assert!((left - 9.98).abs() < 0.01);
        assert_eq!(sensors.front_dist_right.get(), None);
        assert_eq!(sensors.front_dist_right.sample().valid, Some(false));
        let back = sensors.back_ground_dist.get().unwrap();
        assert!((back - 7.18).abs() < 0.01);
        assert!(sensors.middle_ground_dist.get().is_some());
    }

    #[test]
    fn test_pollers_stop_cleanly() {
        let (_mock, bus, sensors) = setup();
        let actuator = MotorActuator::new(bus.clone(), SpeedScale::Raw);
        let pollers = SensorPollers::spawn(
            actuator,
            bus,
            Arc::new(sensors),
            IrModel::default(),
            Duration::from_millis(5),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        pollers.stop();
    }
}
