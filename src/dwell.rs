//! Dwell tracking.
//!
//! `DwellTracker` owns the mapping from identity key to tracked object and
//! classifies every observation as Fresh or Forgotten. Time is a `Duration`
//! since an arbitrary epoch (the worker uses the Unix epoch) so callers and
//! tests control it directly.
//!
//! `first_seen` is the dwell anchor and never moves once set. Continuous
//! presence therefore always ends in Forgotten; only eviction resets a key.

use std::collections::HashMap;
use std::time::Duration;

use crate::resolve::IdentityKey;

/// Classification of one observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DwellState {
    Fresh,
    Forgotten,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackedObject {
    pub first_seen: Duration,
    pub last_seen: Duration,
}

impl TrackedObject {
    pub fn dwell(&self, now: Duration) -> Duration {
        now.saturating_sub(self.first_seen)
    }
}

pub struct DwellTracker {
    forgotten_time: Duration,
    objects: HashMap<IdentityKey, TrackedObject>,
}

impl DwellTracker {
    pub fn new(forgotten_time: Duration) -> Self {
        Self {
            forgotten_time,
            objects: HashMap::new(),
        }
    }

    /// Record an observation of `key` at `now` and classify it.
    ///
    /// Forgotten iff strictly more than `forgotten_time` has passed since the
    /// first observation. Call at most once per key per frame.
    pub fn observe(&mut self, key: &IdentityKey, now: Duration) -> DwellState {
        let object = self
            .objects
            .entry(key.clone())
            .or_insert(TrackedObject {
                first_seen: now,
                last_seen: now,
            });
        object.last_seen = object.last_seen.max(now);
        if object.dwell(now) > self.forgotten_time {
            DwellState::Forgotten
        } else {
            DwellState::Fresh
        }
    }

    /// Re-anchor `key` onto the nearest tracked key with the same label whose
    /// center is within `radius` pixels. Returns `key` unchanged when it is
    /// already tracked or nothing is close enough.
    pub fn anchor(&self, key: IdentityKey, radius: u32) -> IdentityKey {
        if self.objects.contains_key(&key) {
            return key;
        }
        self.objects
            .keys()
            .filter_map(|existing| {
                key.distance(existing)
                    .filter(|d| *d <= radius)
                    .map(|d| (d, existing))
            })
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
            .map(|(_, existing)| existing.clone())
            .unwrap_or(key)
    }

    /// Drop objects not observed for longer than `idle`. Returns how many went.
    pub fn evict_idle(&mut self, now: Duration, idle: Duration) -> usize {
        let before = self.objects.len();
        self.objects
            .retain(|_, object| now.saturating_sub(object.last_seen) <= idle);
        before - self.objects.len()
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&TrackedObject> {
        self.objects.get(key)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn backpack() -> IdentityKey {
        IdentityKey::new(125, 125, "backpack")
    }

    #[test]
    fn first_observation_is_fresh_and_anchors_first_seen() {
        let mut tracker = DwellTracker::new(secs(10));
        assert_eq!(tracker.observe(&backpack(), secs(100)), DwellState::Fresh);
        tracker.observe(&backpack(), secs(104));
        tracker.observe(&backpack(), secs(109));
        let object = tracker.get(&backpack()).expect("tracked");
        assert_eq!(object.first_seen, secs(100));
        assert_eq!(object.last_seen, secs(109));
    }

    #[test]
    fn threshold_is_a_strict_lower_bound() {
        let mut tracker = DwellTracker::new(secs(10));
        tracker.observe(&backpack(), secs(0));
        assert_eq!(tracker.observe(&backpack(), secs(5)), DwellState::Fresh);
        assert_eq!(tracker.observe(&backpack(), secs(10)), DwellState::Fresh);
        assert_eq!(
            tracker.observe(&backpack(), secs(10) + Duration::from_millis(1)),
            DwellState::Forgotten
        );
        assert_eq!(tracker.observe(&backpack(), secs(11)), DwellState::Forgotten);
    }

    #[test]
    fn observation_is_idempotent_within_an_instant() {
        let mut tracker = DwellTracker::new(secs(0));
        assert_eq!(tracker.observe(&backpack(), secs(3)), DwellState::Fresh);
        assert_eq!(tracker.observe(&backpack(), secs(3)), DwellState::Fresh);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn earlier_clock_reading_does_not_underflow() {
        let mut tracker = DwellTracker::new(secs(1));
        tracker.observe(&backpack(), secs(50));
        assert_eq!(tracker.observe(&backpack(), secs(40)), DwellState::Fresh);
        assert_eq!(tracker.get(&backpack()).map(|o| o.last_seen), Some(secs(50)));
    }

    #[test]
    fn anchor_snaps_to_nearest_key_with_same_label() {
        let mut tracker = DwellTracker::new(secs(10));
        tracker.observe(&IdentityKey::new(100, 100, "bag"), secs(0));
        tracker.observe(&IdentityKey::new(110, 100, "bag"), secs(0));
        tracker.observe(&IdentityKey::new(101, 101, "book"), secs(0));

        let jittered = tracker.anchor(IdentityKey::new(102, 99, "bag"), 4);
        assert_eq!(jittered, IdentityKey::new(100, 100, "bag"));

        let far = tracker.anchor(IdentityKey::new(130, 130, "bag"), 4);
        assert_eq!(far, IdentityKey::new(130, 130, "bag"));
    }

    #[test]
    fn eviction_removes_only_idle_objects() {
        let mut tracker = DwellTracker::new(secs(10));
        tracker.observe(&IdentityKey::new(1, 1, "bag"), secs(0));
        tracker.observe(&IdentityKey::new(2, 2, "bag"), secs(0));
        tracker.observe(&IdentityKey::new(2, 2, "bag"), secs(25));

        assert_eq!(tracker.evict_idle(secs(30), secs(20)), 1);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get(&IdentityKey::new(2, 2, "bag")).is_some());

        // A returning object starts a new dwell clock.
        assert_eq!(
            tracker.observe(&IdentityKey::new(1, 1, "bag"), secs(31)),
            DwellState::Fresh
        );
        assert_eq!(
            tracker.get(&IdentityKey::new(1, 1, "bag")).map(|o| o.first_seen),
            Some(secs(31))
        );
    }
}
