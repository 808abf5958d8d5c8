//! Stability tracking: the per-turn tier-assignment engine.
//!
//! Every content unit of the prompt carries a stability counter: the number
//! of consecutive turns it was observed unchanged. Stable content drifts
//! upward through the cached tiers, changed content drops straight back to
//! `Active`. One call to [`StabilityTracker::update`] per conversation turn
//! runs five phases, strictly in order:
//!
//! | Phase | What happens |
//! |-------|--------------|
//! | 0. Stale removal | File/symbol items whose path is gone are dropped |
//! | 1. Active processing | New items enter `Active`; changed items reset; unchanged items age |
//! | 2. Graduation | Items leaving the active set (and old history) move to `L3` |
//! | 3. Cascade | Bottom-up ripple promotion through the broken tiers |
//! | 4. Underfill demotion | `L1`/`L2` too small to be worth a boundary move down one level |
//!
//! A tier whose membership changed during the cycle is **broken**: its cache
//! prefix is invalidated anyway, so promotions into it cost nothing extra.
//! Promotion into a stable, populated tier is never allowed.
//!
//! The tracker is synchronous and owns all of its state. `update` takes
//! `&mut self` and cannot fail, so callers never observe a half-applied cycle.

mod cascade;
mod graduation;
mod snapshot;

pub use snapshot::{SNAPSHOT_VERSION, TrackerSnapshot};

use crate::cluster::{self, ReferenceGraph};
use ripplecache_config::AppConfig;
use ripplecache_core::{ActiveItem, ItemKey, ItemType, Tier, TierChange, TrackedItem};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Upper bound on bottom-up cascade sweeps per update.
///
/// Each sweep either promotes something or ends the cascade, so the cap only
/// bounds pathological ripple chains.
pub const MAX_CASCADE_SWEEPS: usize = 10;

/// Items the caller wants verbatim in context this turn.
pub type ActiveItems = BTreeMap<ItemKey, ActiveItem>;

/// Size of one tier, for logging and UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSummary {
    pub tier: Tier,
    pub items: usize,
    pub tokens: usize,
}

/// Tracks tier and stability for every content unit of one session.
#[derive(Debug, Clone, Default)]
pub struct StabilityTracker {
    items: BTreeMap<ItemKey, TrackedItem>,

    /// Minimum worthwhile size of a cached tier. `0` disables anchoring,
    /// threshold history graduation and underfill demotion.
    cache_target_tokens: usize,

    /// Keys of the previous update's active set.
    last_active: BTreeSet<ItemKey>,

    /// Tiers whose membership changed during the current cycle.
    broken: BTreeSet<Tier>,

    /// Tiers vacated between updates (purge/remove); broken next cycle.
    carried_broken: BTreeSet<Tier>,

    /// Changes emitted during the current cycle.
    changes: Vec<TierChange>,
}

impl StabilityTracker {
    /// Create an empty tracker with the given cache target.
    pub fn new(cache_target_tokens: usize) -> Self {
        Self {
            cache_target_tokens,
            ..Self::default()
        }
    }

    /// Create an empty tracker sized for the configured model.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.cache_target_tokens())
    }

    pub fn cache_target_tokens(&self) -> usize {
        self.cache_target_tokens
    }

    /// Change the cache target; takes effect on the next update.
    pub fn set_cache_target_tokens(&mut self, tokens: usize) {
        self.cache_target_tokens = tokens;
    }

    /// Run one update cycle and return the tier changes it produced.
    ///
    /// - `active_items`: everything the caller wants verbatim in context this
    ///   turn, with its current hash and token estimate.
    /// - `modified_keys`: items known to have been edited; treated as changed
    ///   even when the hash matches. Keys absent from `active_items` are ignored.
    /// - `known_file_paths`: every path that currently exists; file and
    ///   symbol items outside it are dropped.
    pub fn update(
        &mut self,
        active_items: &ActiveItems,
        modified_keys: &BTreeSet<ItemKey>,
        known_file_paths: &BTreeSet<String>,
    ) -> Vec<TierChange> {
        self.broken = std::mem::take(&mut self.carried_broken);
        self.changes.clear();

        let removed = self.remove_stale(known_file_paths);
        let reset = self.process_active(active_items, modified_keys);
        debug!(removed, reset, active = active_items.len(), "Processed active items");

        let graduates = self.select_graduates(active_items);
        self.cascade(graduates);
        self.demote_underfilled();

        self.last_active = active_items.keys().cloned().collect();
        self.broken.clear();

        let changes = std::mem::take(&mut self.changes);
        if !changes.is_empty() {
            let promotions = changes.iter().filter(|c| c.is_promotion()).count();
            info!(
                promotions,
                demotions = changes.len() - promotions,
                tracked = self.items.len(),
                "Cache tiers updated"
            );
        }
        changes
    }

    // ── Phase 0: stale removal ─────────────────────────────────────────

    fn remove_stale(&mut self, known_file_paths: &BTreeSet<String>) -> usize {
        let stale: Vec<ItemKey> = self
            .items
            .keys()
            .filter(|key| key.path().is_some_and(|path| !known_file_paths.contains(path)))
            .cloned()
            .collect();

        for key in &stale {
            if let Some(item) = self.items.remove(key) {
                if item.tier.is_cached() {
                    self.broken.insert(item.tier);
                }
                debug!(key = %key, tier = %item.tier, "Dropped item for deleted path");
            }
            self.last_active.remove(key);
        }
        stale.len()
    }

    // ── Phase 1: active items ──────────────────────────────────────────

    fn process_active(
        &mut self,
        active_items: &ActiveItems,
        modified_keys: &BTreeSet<ItemKey>,
    ) -> usize {
        let mut reset = 0;

        for (key, observed) in active_items {
            let Some(item) = self.items.get_mut(key) else {
                self.items.insert(
                    key.clone(),
                    TrackedItem::new(key.clone(), observed.content_hash.clone(), observed.tokens),
                );
                continue;
            };

            // A placeholder hash outside Active means the item was seeded at
            // cold start and its real content has never been compared.
            let changed = item.content_hash != observed.content_hash
                || modified_keys.contains(key)
                || (item.has_placeholder_hash() && item.tier.is_cached());

            item.content_hash.clone_from(&observed.content_hash);
            item.tokens = observed.tokens;

            if !changed {
                item.stability += 1;
                continue;
            }

            let old_tier = item.tier;
            item.enter(Tier::Active);
            reset += 1;
            if old_tier.is_cached() {
                self.broken.insert(old_tier);
                self.changes
                    .push(TierChange::new(key.clone(), old_tier, Tier::Active));
            }
        }
        reset
    }

    // ── Out-of-band removal ────────────────────────────────────────────

    /// Drop every history item, e.g. after the conversation was compacted.
    ///
    /// Cached tiers that lose members are treated as broken on the next update.
    pub fn purge_history(&mut self) -> usize {
        let history: Vec<ItemKey> = self
            .items
            .keys()
            .filter(|key| key.item_type() == ItemType::History)
            .cloned()
            .collect();
        for key in &history {
            self.remove(key);
        }
        if !history.is_empty() {
            info!(purged = history.len(), "Purged history items");
        }
        history.len()
    }

    /// Drop a single item. Its tier, if cached, is broken on the next update.
    pub fn remove(&mut self, key: &ItemKey) -> Option<TrackedItem> {
        let item = self.items.remove(key)?;
        self.last_active.remove(key);
        if item.tier.is_cached() {
            self.carried_broken.insert(item.tier);
        }
        Some(item)
    }

    // ── Cold start ─────────────────────────────────────────────────────

    /// Seed an empty tracker from a reference graph.
    ///
    /// Returns the number of seeded items; does nothing (and returns 0) if the
    /// tracker already holds state. Seeded items carry a placeholder hash until
    /// their real content is observed.
    pub fn initialize_from_graph(&mut self, graph: &ReferenceGraph) -> usize {
        if !self.items.is_empty() {
            debug!("Tracker already populated, skipping cold-start clustering");
            return 0;
        }

        let clusters = cluster::cluster(graph, self.cache_target_tokens);
        let mut seeded = 0;
        for group in &clusters {
            for key in &group.keys {
                let tokens = key.path().map_or(0, |path| graph.tokens_for(path));
                self.items
                    .insert(key.clone(), TrackedItem::seeded(key.clone(), group.tier, tokens));
                seeded += 1;
            }
        }

        if seeded > 0 {
            info!(seeded, clusters = clusters.len(), "Seeded tiers from reference graph");
        }
        seeded
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn get(&self, key: &ItemKey) -> Option<&TrackedItem> {
        self.items.get(key)
    }

    /// Tier of `key`, or `None` if untracked.
    pub fn tier_of(&self, key: &ItemKey) -> Option<Tier> {
        self.items.get(key).map(|item| item.tier)
    }

    /// Items resident in `tier`, sorted by key.
    pub fn items_in_tier(&self, tier: Tier) -> Vec<&TrackedItem> {
        self.items.values().filter(|item| item.tier == tier).collect()
    }

    pub fn tier_len(&self, tier: Tier) -> usize {
        self.items.values().filter(|item| item.tier == tier).count()
    }

    /// Total token estimate of the items in `tier`.
    pub fn tier_tokens(&self, tier: Tier) -> usize {
        self.items
            .values()
            .filter(|item| item.tier == tier)
            .map(|item| item.tokens)
            .sum()
    }

    /// Tier of every tracked history turn, by conversation index.
    pub fn history_tiers(&self) -> BTreeMap<usize, Tier> {
        self.items
            .values()
            .filter_map(|item| item.key.history_index().map(|index| (index, item.tier)))
            .collect()
    }

    /// Item count and token total for every tier, most stable first.
    pub fn tier_summary(&self) -> Vec<TierSummary> {
        Tier::ALL
            .iter()
            .map(|&tier| TierSummary {
                tier,
                items: self.tier_len(tier),
                tokens: self.tier_tokens(tier),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedItem> {
        self.items.values()
    }
}
