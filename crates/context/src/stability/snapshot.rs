//! Exportable tracker state.
//!
//! Tier state can outlive a process: the session serializes a
//! [`TrackerSnapshot`] wherever it keeps its own state and restores it on the
//! next start, instead of re-clustering from the reference graph. The tracker
//! itself never touches the filesystem.

use super::StabilityTracker;
use chrono::{DateTime, Utc};
use ripplecache_core::{ItemKey, Result, SnapshotError, Tier, TrackedItem};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Format version written by [`StabilityTracker::snapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable copy of a tracker's durable state.
///
/// Per-cycle scratch state (this cycle's broken tiers, pending changes) is not
/// included; tiers vacated since the last update are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub cache_target_tokens: usize,
    pub items: Vec<TrackedItem>,
    /// Keys of the last update's active set, needed for graduation.
    #[serde(default)]
    pub last_active: Vec<ItemKey>,
    /// Cached tiers emptied by `remove`/`purge_history` since the last update.
    #[serde(default)]
    pub carried_broken: Vec<Tier>,
}

impl TrackerSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl StabilityTracker {
    /// Capture the tracker's durable state.
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            cache_target_tokens: self.cache_target_tokens,
            items: self.items.values().cloned().collect(),
            last_active: self.last_active.iter().cloned().collect(),
            carried_broken: self.carried_broken.iter().copied().collect(),
        }
    }

    /// Rebuild a tracker from a snapshot.
    pub fn restore(snapshot: TrackerSnapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            }
            .into());
        }

        let mut items = BTreeMap::new();
        for item in snapshot.items {
            let key = item.key.clone();
            if items.insert(key.clone(), item).is_some() {
                return Err(SnapshotError::DuplicateKey(key.to_string()).into());
            }
        }

        // Only keys still tracked can graduate.
        let last_active: BTreeSet<ItemKey> = snapshot
            .last_active
            .into_iter()
            .filter(|key| items.contains_key(key))
            .collect();

        let carried_broken: BTreeSet<Tier> = snapshot
            .carried_broken
            .into_iter()
            .filter(|tier| tier.is_cached())
            .collect();

        tracing::debug!(items = items.len(), "Restored tracker from snapshot");
        Ok(Self {
            items,
            cache_target_tokens: snapshot.cache_target_tokens,
            last_active,
            carried_broken,
            ..Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use ripplecache_core::{Error, TierChange};

    #[test]
    fn snapshot_restores_items_and_target() {
        let mut tracker = StabilityTracker::new(512);
        let a = ItemKey::file("a.py");
        place(&mut tracker, a.clone(), Tier::L2, 7, 40);
        place(&mut tracker, ItemKey::history(3), Tier::Active, 1, 5);

        let restored = StabilityTracker::restore(tracker.snapshot()).unwrap();

        assert_eq!(restored.cache_target_tokens(), 512);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(&a), tracker.get(&a));
    }

    #[test]
    fn restored_tracker_still_graduates_last_active_items() {
        let mut tracker = StabilityTracker::new(0);
        let a = ItemKey::file("a.py");
        let items = active(&[(&a, "H", 10)]);
        let known = paths(&["a.py"]);
        for _ in 0..4 {
            tracker.update(&items, &none(), &known);
        }

        let json = tracker.snapshot().to_json().unwrap();
        let mut restored = StabilityTracker::restore(TrackerSnapshot::from_json(&json).unwrap()).unwrap();
        let changes = restored.update(&Default::default(), &none(), &known);

        assert_eq!(changes.len(), 1);
        assert_eq!(restored.tier_of(&a), Some(Tier::L3));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut snapshot = StabilityTracker::new(0).snapshot();
        snapshot.version = 99;
        let err = StabilityTracker::restore(snapshot).unwrap_err();
        assert!(matches!(
            err,
            Error::Snapshot(SnapshotError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut tracker = StabilityTracker::new(0);
        place(&mut tracker, ItemKey::file("a.py"), Tier::L3, 3, 1);
        let mut snapshot = tracker.snapshot();
        snapshot.items.push(snapshot.items[0].clone());

        let err = StabilityTracker::restore(snapshot).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Snapshot error: duplicate key in snapshot: file:a.py"
        );
        assert!(matches!(err, Error::Snapshot(SnapshotError::DuplicateKey(ref key)) if key == "file:a.py"));
    }

    #[test]
    fn garbage_json_is_a_serialization_error() {
        let err = TrackerSnapshot::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn vacated_tier_stays_broken_across_restore() {
        let mut tracker = StabilityTracker::new(0);
        let v = ItemKey::file("v.py");
        place(&mut tracker, ItemKey::history(0), Tier::L2, 7, 10);
        place(&mut tracker, v.clone(), Tier::L3, 6, 10);
        tracker.purge_history();

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.carried_broken, vec![Tier::L2]);
        let json = snapshot.to_json().unwrap();
        let mut restored = StabilityTracker::restore(TrackerSnapshot::from_json(&json).unwrap()).unwrap();
        let changes = restored.update(&Default::default(), &none(), &paths(&["v.py"]));

        assert_eq!(changes, vec![TierChange::new(v.clone(), Tier::L3, Tier::L2)]);
    }

    #[test]
    fn snapshot_without_carried_tiers_still_parses() {
        let json = StabilityTracker::new(0).snapshot().to_json().unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value.as_object_mut().unwrap().remove("carried_broken");

        let snapshot = TrackerSnapshot::from_json(&value.to_string()).unwrap();
        assert!(snapshot.carried_broken.is_empty());
    }
}
