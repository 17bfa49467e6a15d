// The platform's sensor set

use std::sync::Arc;

use tokio::sync::Notify;

use super::reading::{Distance, Rotary, Touch};
use crate::config::{
    TOUCH_BACK_GROUND, TOUCH_BACK_LIFTING_EXTENDED_MAX, TOUCH_BACK_LIFTING_NORMAL,
    TOUCH_BACK_STAIR, TOUCH_FRONT_GROUND, TOUCH_FRONT_LIFTING_EXTENDED_MAX,
    TOUCH_FRONT_LIFTING_NORMAL, TOUCH_FRONT_STAIR, TOUCH_MIDDLE_GROUND, TOUCH_MIDDLE_STAIR,
};
use crate::messages::SensorSnapshot;

/// Latest readings for every sensor on Spencer.
///
/// Pollers write, the sequencer reads. Any change wakes tasks waiting in
/// [`SensorData::changed`].
pub struct SensorData {
    pub front_dist_left: Distance,
    pub front_dist_right: Distance,
    pub back_ground_dist: Distance,
    pub middle_ground_dist: Distance,

    pub front_ground_touch: Touch,
    pub middle_ground_touch: Touch,
    pub back_ground_touch: Touch,
    pub front_stair_touch: Touch,
    pub middle_stair_touch: Touch,
    pub back_stair_touch: Touch,
    pub front_lifting_normal: Touch,
    pub back_lifting_normal: Touch,
    /// End stops at full extension of each lift
    pub front_lifting_extended_max: Touch,
    pub back_lifting_extended_max: Touch,

    pub front_lifting_rot: Rotary,
    pub back_lifting_rot: Rotary,

    changed: Arc<Notify>,
}

impl SensorData {
    pub fn new() -> Self {
        let changed = Arc::new(Notify::new());
        Self {
            front_dist_left: Distance::new("front_distance_left", changed.clone()),
            front_dist_right: Distance::new("front_distance_right", changed.clone()),
            back_ground_dist: Distance::new("back_ground_dist", changed.clone()),
            middle_ground_dist: Distance::new("middle_ground_dist", changed.clone()),
            front_ground_touch: Touch::new("front_ground_touch", changed.clone()),
            middle_ground_touch: Touch::new("middle_ground_touch", changed.clone()),
            back_ground_touch: Touch::new("back_ground_touch", changed.clone()),
            front_stair_touch: Touch::new("front_stair_touch", changed.clone()),
            middle_stair_touch: Touch::new("middle_stair_touch", changed.clone()),
            back_stair_touch: Touch::new("back_stair_touch", changed.clone()),
            front_lifting_normal: Touch::new("front_lifting_normal", changed.clone()),
            back_lifting_normal: Touch::new("back_lifting_normal", changed.clone()),
            front_lifting_extended_max: Touch::new("front_lifting_extended_max", changed.clone()),
            back_lifting_extended_max: Touch::new("back_lifting_extended_max", changed.clone()),
            front_lifting_rot: Rotary::new("front_lifting_rot", changed.clone()),
            back_lifting_rot: Rotary::new("back_lifting_rot", changed.clone()),
            changed,
        }
    }

    /// Copy every reading. Each lock is taken only for its own copy.
    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            front_left: self.front_dist_left.get(),
            front_right: self.front_dist_right.get(),
            back_ground_dist: self.back_ground_dist.get(),
            middle_ground_dist: self.middle_ground_dist.get(),
            front_ground_touch: self.front_ground_touch.get(),
            middle_ground_touch: self.middle_ground_touch.get(),
            back_ground_touch: self.back_ground_touch.get(),
            front_stair_touch: self.front_stair_touch.get(),
            middle_stair_touch: self.middle_stair_touch.get(),
            back_stair_touch: self.back_stair_touch.get(),
            front_lifting_normal: self.front_lifting_normal.get(),
            back_lifting_normal: self.back_lifting_normal.get(),
            front_lifting_extended_max: self.front_lifting_extended_max.get(),
            back_lifting_extended_max: self.back_lifting_extended_max.get(),
            front_rot: self.front_lifting_rot.get(),
            back_rot: self.back_lifting_rot.get(),
        }
    }

    /// Resolves on the next sensor change
    pub async fn changed(&self) {
        self.changed.notified().await
    }

    /// Touch readings keyed by their channel on the touch board
    pub fn touch_channels(&self) -> [(u8, &Touch); 10] {
        [
            (TOUCH_BACK_GROUND, &self.back_ground_touch),
            (TOUCH_BACK_LIFTING_NORMAL, &self.back_lifting_normal),
            (TOUCH_BACK_LIFTING_EXTENDED_MAX, &self.back_lifting_extended_max),
            (TOUCH_BACK_STAIR, &self.back_stair_touch),
            (TOUCH_FRONT_GROUND, &self.front_ground_touch),
            (TOUCH_FRONT_STAIR, &self.front_stair_touch),
            (TOUCH_FRONT_LIFTING_NORMAL, &self.front_lifting_normal),
            (TOUCH_FRONT_LIFTING_EXTENDED_MAX, &self.front_lifting_extended_max),
            (TOUCH_MIDDLE_STAIR, &self.middle_stair_touch),
            (TOUCH_MIDDLE_GROUND, &self.middle_ground_touch),
        ]
    }
}

impl Default for SensorData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_updates() {
        let data = SensorData::new();
        data.front_dist_left.update(14.0);
        data.middle_ground_touch.set(true);
        data.back_lifting_rot.change(-40);

        let snap = data.snapshot();
        assert_eq!(snap.front_left, Some(14.0));
        assert_eq!(snap.front_right, None);
        assert!(snap.middle_ground_touch);
        assert!(!snap.front_ground_touch);
        assert_eq!(snap.back_rot, -40);
    }

    #[test]
    fn test_touch_channels_are_unique() {
        let data = SensorData::new();
        let channels = data.touch_channels();
        assert_eq!(channels.len(), 10);
        for (i, (a, _)) in channels.iter().enumerate() {
            assert!(channels[i + 1..].iter().all(|(b, _)| a != b));
        }
    }
}
