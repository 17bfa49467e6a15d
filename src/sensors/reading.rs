// Latest-value holders for touch, distance and rotary sensors
//
// Each reading is written by exactly one poller thread and read by the
// sequencer. The lock is only held long enough to copy or replace the sample.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Distance changes smaller than this are treated as noise (cm)
pub const DISTANCE_EPSILON: f32 = 0.05;

/// One sensor value together with its validity.
///
/// `valid` is `None` until the first sample arrives, `Some(false)` while the
/// sensor reports out of range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<T> {
    pub value: T,
    pub valid: Option<bool>,
    pub last_update: Option<Instant>,
}

impl<T: Default> Default for Sample<T> {
    fn default() -> Self {
        Self {
            value: T::default(),
            valid: None,
            last_update: None,
        }
    }
}

impl<T: Copy> Sample<T> {
    /// The value, if the last sample was in range
    pub fn valid_value(&self) -> Option<T> {
        match self.valid {
            Some(true) => Some(self.value),
            _ => None,
        }
    }
}

pub struct SensorReading<T> {
    name: &'static str,
    sample: Mutex<Sample<T>>,
    changed: Arc<Notify>,
}

pub type Touch = SensorReading<bool>;
pub type Distance = SensorReading<f32>;
pub type Rotary = SensorReading<i32>;

impl<T: Copy + Default + PartialEq> SensorReading<T> {
    pub fn new(name: &'static str, changed: Arc<Notify>) -> Self {
        Self {
            name,
            sample: Mutex::new(Sample::default()),
            changed,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Copy of the current sample
    pub fn sample(&self) -> Sample<T> {
        *self.sample.lock()
    }

    /// Replace the sample, waking the sequencer if anything changed
    fn publish(&self, value: T, valid: bool) {
        let changed = {
            let mut sample = self.sample.lock();
            let changed = sample.value != value || sample.valid != Some(valid);
            sample.value = value;
            sample.valid = Some(valid);
            sample.last_update = Some(Instant::now());
            changed
        };
        if changed {
            self.changed.notify_waiters();
        }
    }
}

impl SensorReading<bool> {
    /// Touch state; a touch sensor that has never been sampled reads as open
    pub fn get(&self) -> bool {
        self.sample().valid_value().unwrap_or(false)
    }

    pub fn set(&self, pressed: bool) {
        if self.sample().value != pressed {
            debug!("{} = {}", self.name, pressed);
        }
        self.publish(pressed, true);
    }
}

impl SensorReading<f32> {
    /// Distance in centimetres, or `None` when out of range or never sampled
    pub fn get(&self) -> Option<f32> {
        self.sample().valid_value()
    }

    /// Store an in-range reading. Changes below `DISTANCE_EPSILON` are dropped
    /// while the reading is already valid.
    pub fn update(&self, centimetres: f32) {
        let current = self.sample();
        if current.valid == Some(true) && (current.value - centimetres).abs() <= DISTANCE_EPSILON {
            return;
        }
        debug!("{} = {:.2}cm", self.name, centimetres);
        self.publish(centimetres, true);
    }

    /// Mark the reading as out of range, keeping the last value
    pub fn invalidate(&self) {
        let current = self.sample();
        if current.valid != Some(false) {
            warn!("{} is out of bounds", self.name);
            self.publish(current.value, false);
        }
    }
}

impl SensorReading<i32> {
    /// Accumulated position since the last reset
    pub fn get(&self) -> i32 {
        self.sample().value
    }

    /// Accumulate a signed encoder delta
    pub fn change(&self, delta: i32) {
        if delta == 0 {
            return;
        }
        let value = {
            let mut sample = self.sample.lock();
            sample.value += delta;
            sample.valid = Some(true);
            sample.last_update = Some(Instant::now());
            sample.value
        };
        debug!("{} = {}", self.name, value);
        self.changed.notify_waiters();
    }

    /// Re-baseline to zero. Only the sequencer does this, with the segment at home.
    pub(crate) fn reset(&self) {
        self.publish(0, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notify() -> Arc<Notify> {
        Arc::new(Notify::new())
    }

    #[test]
    fn test_rotary_accumulates_without_drift() {
        let rot = Rotary::new("front_lifting_rot", notify());
        rot.reset();
        for delta in [5, -2, 3] {
            rot.change(delta);
        }
        assert_eq!(rot.get(), 6);

        rot.reset();
        assert_eq!(rot.get(), 0);
        rot.change(-7);
        assert_eq!(rot.get(), -7);
    }

    #[test]
    fn test_distance_validity() {
        let dist = Distance::new("front_distance_left", notify());
        assert_eq!(dist.sample().valid, None);
        assert_eq!(dist.get(), None);

        dist.update(12.5);
        assert_eq!(dist.get(), Some(12.5));

        dist.invalidate();
        assert_eq!(dist.get(), None);
        assert_eq!(dist.sample().valid, Some(false));
        assert_eq!(dist.sample().value, 12.5);
    }

    #[test]
    fn test_distance_ignores_noise() {
        let dist = Distance::new("front_distance_left", notify());
        dist.update(10.0);
        dist.update(10.03);
        assert_eq!(dist.get(), Some(10.0));
        dist.update(10.2);
        assert_eq!(dist.get(), Some(10.2));
    }

    #[test]
    fn test_touch_defaults_open() {
        let touch = Touch::new("middle_ground_touch", notify());
        assert!(!touch.get());
        touch.set(true);
        assert!(touch.get());
        assert!(touch.sample().last_update.is_some());
    }

    #[tokio::test]
    async fn test_change_wakes_waiters() {
        let changed = notify();
        let touch = Touch::new("front_ground_touch", changed.clone());
        let waiter = changed.notified();
        tokio::pin!(waiter);
        waiter.as_mut().enable();

        touch.set(true);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("touch update should notify");
    }
}
