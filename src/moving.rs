// Process-wide moving flag
//
// Set when an autonomous operation begins. Cleared by a `stop` command, by a
// hard abort, or when the controlling client disconnects. Every stage loop
// checks it before issuing further motion.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{Error, Result};
use crate::sensors::SensorData;

#[derive(Clone, Default)]
pub struct MovingFlag {
    inner: Arc<FlagInner>,
}

#[derive(Default)]
struct FlagInner {
    moving: Mutex<bool>,
    cleared: Notify,
}

impl MovingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        *self.inner.moving.lock() = true;
        debug!("Moving flag set");
    }

    /// Clear the flag and wake every waiting stage loop
    pub fn clear(&self) {
        let was_moving = std::mem::replace(&mut *self.inner.moving.lock(), false);
        if was_moving {
            debug!("Moving flag cleared");
        }
        self.inner.cleared.notify_waiters();
    }

    pub fn is_moving(&self) -> bool {
        *self.inner.moving.lock()
    }

    /// `Err(Cancelled)` once the flag has been cleared
    pub fn ensure(&self) -> Result<()> {
        if self.is_moving() {
            Ok(())
        } else {
            Err(Error::Cancelled)
        }
    }

    /// Resolves once the flag is clear
    pub async fn cleared(&self) {
        loop {
            let notified = self.inner.cleared.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_moving() {
                return;
            }
            notified.await;
        }
    }
}

/// Suspend one loop iteration: until a sensor changes, the flag is cleared,
/// or `interval` elapses, whichever comes first.
pub async fn pause(sensors: &SensorData, moving: &MovingFlag, interval: Duration) {
    tokio::select! {
        _ = sensors.changed() => {}
        _ = moving.cleared() => {}
        _ = tokio::time::sleep(interval) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_follows_flag() {
        let flag = MovingFlag::new();
        assert!(matches!(flag.ensure(), Err(Error::Cancelled)));
        flag.set();
        assert!(flag.ensure().is_ok());
        flag.clone().clear();
        assert!(!flag.is_moving());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_wakes_waiter() {
        let flag = MovingFlag::new();
        flag.set();

        let waiter = flag.clone();
        let task = tokio::spawn(async move { waiter.cleared().await });
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        flag.clear();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_falls_back_to_interval() {
        let sensors = SensorData::new();
        let flag = MovingFlag::new();
        flag.set();

        let start = tokio::time::Instant::now();
        pause(&sensors, &flag, Duration::from_millis(50)).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
