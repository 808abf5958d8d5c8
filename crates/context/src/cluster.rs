//! Cold-start clustering from a reference graph.
//!
//! A session opened with no prior tier state would otherwise start with every
//! unit in `Active` and need several turns before anything is cached. Instead,
//! files that reference each other are grouped and spread over `L1`–`L3` so
//! the first request already has usable cache blocks.
//!
//! Only *mutual* references count: a shared utility that dozens of files
//! import (but which imports none of them back) says nothing about which of
//! those files change together.

use ripplecache_core::{ItemKey, Tier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Tiers that receive clusters, in tie-break order.
const BINS: [Tier; 3] = [Tier::L1, Tier::L2, Tier::L3];

/// Which files reference which, plus each file's token estimate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceGraph {
    /// `path -> paths it references`.
    pub edges: BTreeMap<String, BTreeSet<String>>,
    /// Token estimate per path; missing paths count as 0.
    pub tokens: BTreeMap<String, usize>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `from` references `to`.
    pub fn add_reference(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.edges.entry(from.into()).or_default().insert(to.into());
    }

    pub fn set_tokens(&mut self, path: impl Into<String>, tokens: usize) {
        self.tokens.insert(path.into(), tokens);
    }

    pub fn tokens_for(&self, path: &str) -> usize {
        self.tokens.get(path).copied().unwrap_or(0)
    }

    /// Whether `a` and `b` reference each other.
    pub fn is_mutual(&self, a: &str, b: &str) -> bool {
        a != b && self.references(a, b) && self.references(b, a)
    }

    fn references(&self, from: &str, to: &str) -> bool {
        self.edges.get(from).is_some_and(|targets| targets.contains(to))
    }

    /// Every path mentioned anywhere in the graph.
    pub fn nodes(&self) -> BTreeSet<&str> {
        self.edges
            .iter()
            .flat_map(|(from, targets)| {
                std::iter::once(from.as_str()).chain(targets.iter().map(String::as_str))
            })
            .chain(self.tokens.keys().map(String::as_str))
            .collect()
    }

    /// Mutually-referencing pairs, each reported once with `a < b`.
    pub fn mutual_pairs(&self) -> Vec<(&str, &str)> {
        self.edges
            .iter()
            .flat_map(|(from, targets)| targets.iter().map(move |to| (from.as_str(), to.as_str())))
            .filter(|(a, b)| a < b && self.is_mutual(a, b))
            .collect()
    }
}

/// One initial tier bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub tier: Tier,
    /// Symbol keys of the member paths, sorted.
    pub keys: Vec<ItemKey>,
    pub tokens: usize,
}

#[derive(Debug, Default)]
struct Bin {
    paths: Vec<String>,
    tokens: usize,
    received_merge: bool,
}

/// Partition the graph's paths into initial `L1`/`L2`/`L3` buckets.
///
/// Returns no clusters when the graph has no mutual references at all.
pub fn cluster(graph: &ReferenceGraph, cache_target_tokens: usize) -> Vec<Cluster> {
    let pairs = graph.mutual_pairs();
    if pairs.is_empty() {
        debug!("No mutual references, skipping cold-start clustering");
        return Vec::new();
    }

    let mut components = connected_components(&graph.nodes(), &pairs)
        .into_iter()
        .map(|paths| {
            let tokens = paths.iter().map(|p| graph.tokens_for(p)).sum::<usize>();
            (paths, tokens)
        })
        .collect::<Vec<_>>();
    // Largest first; members are sorted, so the first path breaks ties.
    components.sort_by(|(a_paths, a_tokens), (b_paths, b_tokens)| {
        b_tokens.cmp(a_tokens).then_with(|| a_paths.cmp(b_paths))
    });

    let mut bins: [Bin; 3] = Default::default();
    for (paths, tokens) in components {
        let lightest = (0..bins.len())
            .min_by_key(|&i| bins[i].tokens)
            .unwrap_or(0);
        bins[lightest].paths.extend(paths);
        bins[lightest].tokens += tokens;
    }

    if cache_target_tokens > 0 {
        merge_small_bins(&mut bins, cache_target_tokens);
    }

    let clusters: Vec<Cluster> = BINS
        .iter()
        .zip(bins)
        .filter(|(_, bin)| !bin.paths.is_empty())
        .map(|(&tier, bin)| {
            let mut keys: Vec<ItemKey> = bin.paths.into_iter().map(ItemKey::Symbol).collect();
            keys.sort();
            Cluster {
                tier,
                keys,
                tokens: bin.tokens,
            }
        })
        .collect();

    debug!(
        pairs = pairs.len(),
        clusters = clusters.len(),
        "Clustered reference graph"
    );
    clusters
}

/// Fold each undersized bin into the currently smallest other bin. A bin
/// receives at most one merge.
fn merge_small_bins(bins: &mut [Bin; 3], target: usize) {
    let mut order: Vec<usize> = (0..bins.len()).collect();
    order.sort_by_key(|&i| (bins[i].tokens, i));

    for source in order {
        if bins[source].paths.is_empty() || bins[source].tokens >= target {
            continue;
        }
        let destination = (0..bins.len())
            .filter(|&j| j != source && !bins[j].paths.is_empty() && !bins[j].received_merge)
            .min_by_key(|&j| (bins[j].tokens, j));
        let Some(destination) = destination else {
            continue;
        };

        let moved = std::mem::take(&mut bins[source].paths);
        let moved_tokens = std::mem::take(&mut bins[source].tokens);
        bins[destination].paths.extend(moved);
        bins[destination].tokens += moved_tokens;
        bins[destination].received_merge = true;
    }
}

/// Connected components over `pairs`, each sorted; every node appears in
/// exactly one component.
fn connected_components(nodes: &BTreeSet<&str>, pairs: &[(&str, &str)]) -> Vec<Vec<String>> {
    let index: BTreeMap<&str, usize> = nodes.iter().enumerate().map(|(i, &n)| (n, i)).collect();
    let mut parent: Vec<usize> = (0..nodes.len()).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for (a, b) in pairs {
        if let (Some(&ia), Some(&ib)) = (index.get(a), index.get(b)) {
            let (ra, rb) = (find(&mut parent, ia), find(&mut parent, ib));
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (&node, &i) in &index {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(node.to_string());
    }
    groups.into_values().collect()
}
