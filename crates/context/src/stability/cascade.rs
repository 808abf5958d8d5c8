//! Phases 3 and 4: ripple promotion and underfill demotion.

use super::{MAX_CASCADE_SWEEPS, StabilityTracker};
use ripplecache_core::{ItemKey, Tier, TierChange};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Cached tiers in cascade order, least stable first.
const BOTTOM_UP: [Tier; 4] = [Tier::L3, Tier::L2, Tier::L1, Tier::L0];

/// Per-update cascade bookkeeping.
#[derive(Debug, Default)]
struct CascadeState {
    /// Items that entered a tier during this update; never veterans.
    placed: BTreeSet<ItemKey>,
    /// Veterans already aged during this update.
    aged: BTreeSet<ItemKey>,
    /// Tiers that received items during this update.
    entered: BTreeSet<Tier>,
}

impl StabilityTracker {
    /// Place graduates into `L3`, then sweep bottom-up until nothing moves.
    pub(super) fn cascade(&mut self, graduates: Vec<ItemKey>) {
        let mut state = CascadeState::default();

        for key in graduates {
            let Some(item) = self.items.get_mut(&key) else {
                continue;
            };
            let old_tier = item.tier;
            item.enter(Tier::L3);
            self.changes
                .push(TierChange::new(key.clone(), old_tier, Tier::L3));
            state.placed.insert(key);
        }
        if !state.placed.is_empty() {
            self.broken.insert(Tier::L3);
            state.entered.insert(Tier::L3);
        }

        for sweep in 1..=MAX_CASCADE_SWEEPS {
            let promoted: usize = BOTTOM_UP
                .iter()
                .map(|&tier| self.sweep_tier(tier, &mut state))
                .sum();
            if promoted == 0 {
                debug!(sweeps = sweep, "Cascade settled");
                return;
            }
        }
        warn!(
            sweeps = MAX_CASCADE_SWEEPS,
            "Cascade hit its sweep cap before settling"
        );
    }

    /// Age and possibly promote the veterans of one tier. Returns the number
    /// of promotions.
    fn sweep_tier(&mut self, tier: Tier, state: &mut CascadeState) -> usize {
        let destination = tier.promotes_to();
        let destination_broken = destination.is_some_and(|d| self.broken.contains(&d));

        // Untouched tiers stay put: nothing entered them and the tier above
        // has no room opening up.
        if !state.entered.contains(&tier) && !destination_broken {
            return 0;
        }

        let mut veterans: Vec<(ItemKey, u32, usize)> = self
            .items
            .values()
            .filter(|item| item.tier == tier && !state.placed.contains(&item.key))
            .map(|item| (item.key.clone(), item.stability, item.tokens))
            .collect();
        veterans.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let anchored = self.anchored_veterans(tier, &veterans);
        let threshold = tier.promotion_value();
        let mut promoted = 0;

        for (key, _, _) in &veterans {
            if anchored.contains(key) {
                continue;
            }

            let destination_open = destination.is_some_and(|d| self.is_open(d));
            let Some(item) = self.items.get_mut(key) else {
                continue;
            };

            if state.aged.insert(key.clone()) {
                // Don't race ahead of a stable, populated tier above.
                let capped = !destination_open && threshold.is_some_and(|t| item.stability >= t);
                if !capped {
                    item.stability += 1;
                }
            }

            let (Some(destination), Some(threshold)) = (destination, threshold) else {
                continue;
            };
            if destination_open && item.stability >= threshold {
                item.enter(destination);
                self.changes
                    .push(TierChange::new(key.clone(), tier, destination));
                self.broken.insert(tier);
                self.broken.insert(destination);
                state.entered.insert(destination);
                state.placed.insert(key.clone());
                promoted += 1;
            }
        }

        if promoted > 0 {
            debug!(tier = %tier, promoted, "Promoted veterans");
        }
        promoted
    }

    /// Veterans that keep the tier at a cache-worthy size: the least stable
    /// ones, up to the cache target. `veterans` must be sorted by stability.
    fn anchored_veterans(&self, tier: Tier, veterans: &[(ItemKey, u32, usize)]) -> BTreeSet<ItemKey> {
        let target = self.cache_target_tokens;
        if target == 0 || tier == Tier::L0 {
            return BTreeSet::new();
        }

        let mut cumulative = 0;
        veterans
            .iter()
            .take_while(|(_, _, tokens)| {
                cumulative += tokens;
                cumulative <= target
            })
            .map(|(key, _, _)| key.clone())
            .collect()
    }

    /// A tier accepts promotions when it is already changing or has no members.
    fn is_open(&self, tier: Tier) -> bool {
        self.broken.contains(&tier) || self.items.values().all(|item| item.tier != tier)
    }

    /// Move every member of an undersized `L1`/`L2` one tier down.
    pub(super) fn demote_underfilled(&mut self) {
        let target = self.cache_target_tokens;
        if target == 0 {
            return;
        }

        let mut received: BTreeSet<Tier> = BTreeSet::new();
        for tier in [Tier::L1, Tier::L2] {
            if received.contains(&tier) {
                continue;
            }
            let Some(destination) = tier.demotes_to() else {
                continue;
            };

            let members: Vec<ItemKey> = self
                .items_in_tier(tier)
                .iter()
                .map(|item| item.key.clone())
                .collect();
            if members.is_empty() || self.tier_tokens(tier) >= target {
                continue;
            }

            for key in &members {
                if let Some(item) = self.items.get_mut(key) {
                    // Stability is kept so the item can climb back quickly.
                    item.tier = destination;
                    self.changes
                        .push(TierChange::new(key.clone(), tier, destination));
                }
            }
            debug!(tier = %tier, demoted = members.len(), "Demoted underfilled tier");
            self.broken.insert(tier);
            self.broken.insert(destination);
            received.insert(destination);
        }
    }
}
