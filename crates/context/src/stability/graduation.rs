//! Phase 2: choosing which `Active` items move into `L3`.
//!
//! Files and symbols graduate when the caller stops asking for them verbatim,
//! provided they were stable long enough before leaving. History is immutable,
//! so it graduates either for free alongside another `L3` change (piggyback)
//! or once enough old turns pile up to fill a cache block on their own.

use super::{ActiveItems, StabilityTracker};
use ripplecache_core::{ItemKey, ItemType, Tier, TrackedItem};
use tracing::debug;

/// Stability an `Active` item needs before it may leave for `L3`.
fn graduation_threshold() -> u32 {
    // Active's promotion value; equals L3's entry value.
    Tier::L3.entry_value()
}

impl StabilityTracker {
    pub(super) fn select_graduates(&mut self, active_items: &ActiveItems) -> Vec<ItemKey> {
        let threshold = graduation_threshold();

        let mut graduates: Vec<ItemKey> = self
            .last_active
            .iter()
            .filter(|key| key.item_type().is_file_backed() && !active_items.contains_key(*key))
            .filter(|key| {
                self.items
                    .get(*key)
                    .is_some_and(|item| item.tier == Tier::Active && item.stability >= threshold)
            })
            .cloned()
            .collect();

        if !graduates.is_empty() {
            self.broken.insert(Tier::L3);
        }

        let history = if self.broken.contains(&Tier::L3) {
            self.piggyback_history(threshold)
        } else {
            self.overflowing_history(active_items, threshold)
        };

        debug!(
            files = graduates.len(),
            history = history.len(),
            "Selected graduates"
        );
        graduates.extend(history);
        graduates
    }

    /// `L3` is being rebuilt anyway: take every stable `Active` history turn.
    fn piggyback_history(&self, threshold: u32) -> Vec<ItemKey> {
        self.items
            .values()
            .filter(|item| is_stable_active_history(item, threshold))
            .map(|item| item.key.clone())
            .collect()
    }

    /// Graduate the oldest stable history once it exceeds the cache target,
    /// keeping the newest target's worth active.
    fn overflowing_history(&self, active_items: &ActiveItems, threshold: u32) -> Vec<ItemKey> {
        let target = self.cache_target_tokens;
        if target == 0 {
            return Vec::new();
        }

        // Oldest first: history keys order by index.
        let eligible: Vec<&TrackedItem> = self
            .items
            .values()
            .filter(|item| is_stable_active_history(item, threshold))
            .filter(|item| !active_items.contains_key(&item.key))
            .collect();

        let total: usize = eligible.iter().map(|item| item.tokens).sum();
        if total <= target {
            return Vec::new();
        }

        let mut kept = 0;
        let mut cut = 0;
        for (index, item) in eligible.iter().enumerate().rev() {
            if kept + item.tokens > target {
                cut = index + 1;
                break;
            }
            kept += item.tokens;
        }

        eligible[..cut].iter().map(|item| item.key.clone()).collect()
    }
}

fn is_stable_active_history(item: &TrackedItem, threshold: u32) -> bool {
    item.item_type() == ItemType::History
        && item.tier == Tier::Active
        && item.stability >= threshold
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use ripplecache_core::TierChange;

    #[test]
    fn file_graduates_after_three_stable_turns() {
        let mut tracker = StabilityTracker::new(0);
        let a = ItemKey::file("a.py");
        let items = active(&[(&a, "H1", 10)]);
        let known = paths(&["a.py"]);
        for _ in 0..4 {
            tracker.update(&items, &none(), &known);
        }
        assert_eq!(tracker.get(&a).unwrap().stability, 3);

        let changes = tracker.update(&ActiveItems::new(), &none(), &known);

        assert_eq!(changes, vec![TierChange::new(a.clone(), Tier::Active, Tier::L3)]);
        let item = tracker.get(&a).unwrap();
        assert_eq!(item.tier, Tier::L3);
        assert_eq!(item.stability, 3);
    }

    #[test]
    fn unstable_file_stays_active_when_dropped() {
        let mut tracker = StabilityTracker::new(0);
        let a = ItemKey::file("a.py");
        let items = active(&[(&a, "H1", 10)]);
        let known = paths(&["a.py"]);
        tracker.update(&items, &none(), &known);
        tracker.update(&items, &none(), &known);

        let changes = tracker.update(&ActiveItems::new(), &none(), &known);

        assert!(changes.is_empty());
        let item = tracker.get(&a).unwrap();
        assert_eq!(item.tier, Tier::Active);
        assert_eq!(item.stability, 1);

        // Absent for a second turn: no longer "just left", still nothing.
        assert!(tracker.update(&ActiveItems::new(), &none(), &known).is_empty());
    }

    #[test]
    fn history_waits_without_l3_activity_or_overflow() {
        let mut tracker = StabilityTracker::new(1000);
        place(&mut tracker, ItemKey::history(0), Tier::Active, 3, 50);

        for _ in 0..3 {
            assert!(tracker.update(&ActiveItems::new(), &none(), &paths(&[])).is_empty());
        }
        assert_eq!(tracker.get(&ItemKey::history(0)).unwrap().tier, Tier::Active);
    }

    #[test]
    fn history_piggybacks_on_file_graduation() {
        let mut tracker = StabilityTracker::new(1000);
        let a = ItemKey::file("a.py");
        let h = ItemKey::history(0);
        place(&mut tracker, a.clone(), Tier::Active, 3, 2000);
        place(&mut tracker, h.clone(), Tier::Active, 5, 10);
        tracker.last_active.insert(a.clone());

        let changes = tracker.update(&ActiveItems::new(), &none(), &paths(&["a.py"]));

        assert!(changes.contains(&TierChange::new(a, Tier::Active, Tier::L3)));
        assert!(changes.contains(&TierChange::new(h.clone(), Tier::Active, Tier::L3)));
        assert_eq!(tracker.get(&h).unwrap().tier, Tier::L3);
    }

    #[test]
    fn history_piggybacks_on_stale_removal() {
        let mut tracker = StabilityTracker::new(1000);
        let h = ItemKey::history(0);
        place(&mut tracker, ItemKey::file("gone.py"), Tier::L3, 3, 10);
        place(&mut tracker, h.clone(), Tier::Active, 3, 10);

        let changes = tracker.update(&ActiveItems::new(), &none(), &paths(&[]));

        assert_eq!(changes, vec![TierChange::new(h.clone(), Tier::Active, Tier::L3)]);
        assert_eq!(tracker.get(&h).unwrap().stability, Tier::L3.entry_value());
    }

    #[test]
    fn history_piggybacks_on_cached_reset() {
        let mut tracker = StabilityTracker::new(1000);
        let a = ItemKey::file("a.py");
        let h = ItemKey::history(0);
        place(&mut tracker, a.clone(), Tier::L3, 4, 10);
        place(&mut tracker, h.clone(), Tier::Active, 3, 10);

        let changes = tracker.update(&active(&[(&a, "edited", 10)]), &none(), &paths(&["a.py"]));

        assert_eq!(
            changes,
            vec![
                TierChange::new(a, Tier::L3, Tier::Active),
                TierChange::new(h.clone(), Tier::Active, Tier::L3),
            ]
        );
        assert_eq!(tracker.tier_of(&h), Some(Tier::L3));
    }

    #[test]
    fn piggyback_skips_young_history() {
        let mut tracker = StabilityTracker::new(0);
        let a = ItemKey::file("a.py");
        place(&mut tracker, a.clone(), Tier::Active, 4, 10);
        place(&mut tracker, ItemKey::history(0), Tier::Active, 2, 10);
        tracker.last_active.insert(a);

        tracker.update(&ActiveItems::new(), &none(), &paths(&["a.py"]));

        assert_eq!(tracker.get(&ItemKey::history(0)).unwrap().tier, Tier::Active);
    }

    #[test]
    fn overflowing_history_graduates_oldest() {
        let mut tracker = StabilityTracker::new(100);
        for index in 0..5 {
            place(&mut tracker, ItemKey::history(index), Tier::Active, 3, 40);
        }

        let changes = tracker.update(&ActiveItems::new(), &none(), &paths(&[]));

        // 200 tokens eligible; newest two (80) fit the 100 budget, the third
        // would overflow, so indices 0..=2 graduate.
        let moved: Vec<ItemKey> = changes.iter().map(|c| c.key.clone()).collect();
        assert_eq!(
            moved,
            vec![ItemKey::history(0), ItemKey::history(1), ItemKey::history(2)]
        );
        assert_eq!(tracker.get(&ItemKey::history(3)).unwrap().tier, Tier::Active);
        assert_eq!(tracker.get(&ItemKey::history(4)).unwrap().tier, Tier::Active);
    }

    #[test]
    fn history_in_active_set_is_not_threshold_eligible() {
        let mut tracker = StabilityTracker::new(10);
        let h0 = ItemKey::history(0);
        let h1 = ItemKey::history(1);
        place(&mut tracker, h0.clone(), Tier::Active, 3, 40);
        place(&mut tracker, h1.clone(), Tier::Active, 3, 40);

        let items = active(&[(&h0, "h", 40), (&h1, "h", 40)]);
        let changes = tracker.update(&items, &none(), &paths(&[]));

        assert!(changes.is_empty());
    }

    #[test]
    fn zero_target_disables_threshold_graduation() {
        let mut tracker = StabilityTracker::new(0);
        for index in 0..5 {
            place(&mut tracker, ItemKey::history(index), Tier::Active, 9, 10_000);
        }
        assert!(tracker.update(&ActiveItems::new(), &none(), &paths(&[])).is_empty());
    }
}
