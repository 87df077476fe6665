use std::collections::HashSet;

use crate::resolve::IdentityKey;

/// One-shot gate in front of notification dispatch.
///
/// Records are never removed, so a key that has alerted once stays silent for
/// the lifetime of the deduplicator, even if the dwell tracker later evicts
/// and re-learns it.
#[derive(Debug, Default)]
pub struct AlertDeduplicator {
    alerted: HashSet<IdentityKey>,
}

impl AlertDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once per key; the key is recorded as alerted in the same call.
    pub fn should_alert(&mut self, key: &IdentityKey) -> bool {
        if self.alerted.contains(key) {
            return false;
        }
        self.alerted.insert(key.clone())
    }

    pub fn is_alerted(&self, key: &IdentityKey) -> bool {
        self.alerted.contains(key)
    }

    /// Number of keys that have alerted.
    pub fn len(&self) -> usize {
        self.alerted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_alert_is_one_shot_per_key() {
        let mut dedup = AlertDeduplicator::new();
        let bag = IdentityKey::new(125, 125, "backpack");
        let other = IdentityKey::new(125, 126, "backpack");

        assert!(dedup.should_alert(&bag));
        for _ in 0..5 {
            assert!(!dedup.should_alert(&bag));
        }
        assert!(dedup.is_alerted(&bag));
        assert!(!dedup.is_alerted(&other));
        assert!(dedup.should_alert(&other));
        assert_eq!(dedup.len(), 2);
    }
}
