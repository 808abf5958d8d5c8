//! Tiered prompt layout.
//!
//! Reads the tracker's tier assignments and lays the prompt out most stable
//! first, so each cached tier is a prefix of the next:
//!
//! 1. **L0**: system text plus `L0` symbol/file blocks, then `L0` history
//! 2. **L1..L3**: one user/acknowledgement pair of the tier's blocks, then the
//!    tier's history turns; empty tiers are skipped
//! 3. **Active tail** (never cached): file listing, external-document context,
//!    active files, active history, the new user prompt
//!
//! Every non-empty cached tier ends with a cache boundary, so a layout never
//! carries more than four.
//!
//! # Determinism
//!
//! Identical tracker state and inputs always produce identical layouts: every
//! collection is iterated in key order and nothing time-dependent is read.

use crate::stability::StabilityTracker;
use crate::token;
use ripplecache_core::{HistoryMessage, ItemKey, Role, Segment, Tier};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::debug;

/// Assistant reply that closes every user/acknowledgement pair.
pub const DEFAULT_ACKNOWLEDGEMENT: &str = "Ok, I have that context.";

// ── Types ─────────────────────────────────────────────────────────────────

/// Everything the builder lays out besides tracker state.
#[derive(Debug, Clone, Copy)]
pub struct BuildInput<'a> {
    /// System instructions; always the first segment.
    pub system_text: &'a str,
    /// Symbol summaries, by path.
    pub symbol_blocks: &'a BTreeMap<String, String>,
    /// Full file contents, by path.
    pub file_contents: &'a BTreeMap<String, String>,
    /// Prior conversation turns; a turn's index is its history key.
    pub history: &'a [HistoryMessage],
    /// Repository file listing.
    pub file_listing: Option<&'a str>,
    /// Fetched external documents.
    pub url_context: Option<&'a str>,
    /// The new user turn.
    pub user_prompt: &'a str,
}

/// The laid-out prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptLayout {
    pub segments: Vec<Segment>,
    /// One entry per tier that contributed segments, in layout order.
    pub stats: Vec<TierBlockStats>,
}

/// Size of one tier's block in the layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBlockStats {
    pub tier: Tier,
    /// Estimated tokens across the block's segments.
    pub tokens: usize,
    pub segments: usize,
}

impl PromptLayout {
    pub fn boundary_count(&self) -> usize {
        self.segments.iter().filter(|s| s.cache_boundary).count()
    }

    pub fn total_tokens(&self) -> usize {
        self.stats.iter().map(|s| s.tokens).sum()
    }

    /// Render as an Anthropic Messages API body fragment.
    ///
    /// System segments become `system` text blocks; consecutive segments of
    /// the same role share one message. Boundary segments carry an ephemeral
    /// `cache_control` marker.
    pub fn to_messages_json(&self) -> Value {
        let mut system: Vec<Value> = Vec::new();
        let mut messages: Vec<(Role, Vec<Value>)> = Vec::new();

        for segment in &self.segments {
            let block = text_block(segment);
            match segment.role {
                Role::System => system.push(block),
                role => match messages.last_mut() {
                    Some((last_role, blocks)) if *last_role == role => blocks.push(block),
                    _ => messages.push((role, vec![block])),
                },
            }
        }

        let messages: Vec<Value> = messages
            .into_iter()
            .map(|(role, content)| json!({ "role": role.to_string(), "content": content }))
            .collect();

        json!({ "system": system, "messages": messages })
    }
}

fn text_block(segment: &Segment) -> Value {
    let mut block = json!({ "type": "text", "text": segment.content });
    if segment.cache_boundary {
        block["cache_control"] = json!({ "type": "ephemeral" });
    }
    block
}

/// Symbol, file and history content resident in one tier.
#[derive(Default)]
struct TierContent<'a> {
    symbols: Vec<(&'a str, &'a str)>,
    files: Vec<(&'a str, &'a str)>,
    history: Vec<&'a HistoryMessage>,
}

impl TierContent<'_> {
    fn render_symbols(&self) -> String {
        render_section("Symbol map", &self.symbols, |path, text| {
            format!("## {path}\n{text}")
        })
    }

    fn render_files(&self) -> String {
        render_section("Files", &self.files, |path, text| {
            format!("## {path}\n```\n{text}\n```")
        })
    }

    /// Files then symbols (item key order), as one block.
    fn render_blocks(&self) -> String {
        [self.render_files(), self.render_symbols()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn render_section(
    header: &str,
    entries: &[(&str, &str)],
    render: impl Fn(&str, &str) -> String,
) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let body: Vec<String> = entries.iter().map(|(path, text)| render(path, text)).collect();
    format!("# {header}\n\n{}", body.join("\n\n"))
}

// ── Builder ───────────────────────────────────────────────────────────────

/// Lays out prompts from tracker state. Stateless; create one and reuse it.
#[derive(Debug, Clone)]
pub struct TieredPromptBuilder {
    acknowledgement: String,
}

impl Default for TieredPromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TieredPromptBuilder {
    pub fn new() -> Self {
        Self::with_acknowledgement(DEFAULT_ACKNOWLEDGEMENT)
    }

    /// Use a custom assistant reply for user/acknowledgement pairs.
    pub fn with_acknowledgement(acknowledgement: impl Into<String>) -> Self {
        Self {
            acknowledgement: acknowledgement.into(),
        }
    }

    /// Lay out one request. Content the tracker does not know is `Active`.
    pub fn build(&self, tracker: &StabilityTracker, input: &BuildInput<'_>) -> PromptLayout {
        let tiers = Self::partition(tracker, input);
        let empty = TierContent::default();
        let content = |tier: Tier| tiers.get(&tier).unwrap_or(&empty);

        let mut layout = PromptLayout {
            segments: Vec::new(),
            stats: Vec::new(),
        };

        // ── L0: system segment, then L0 history ────────────────────────────
        let l0 = content(Tier::L0);
        let blocks = l0.render_blocks();
        let system = if blocks.is_empty() {
            input.system_text.to_string()
        } else {
            format!("{}\n\n{}", input.system_text, blocks)
        };
        let mut group = vec![Segment::system(system)];
        group.extend(l0.history.iter().map(|&msg| Segment::from(msg)));
        Self::push_cached(&mut layout, Tier::L0, group);

        // ── L1..L3: block pair, then the tier's history ────────────────────
        for tier in [Tier::L1, Tier::L2, Tier::L3] {
            let tier_content = content(tier);
            let mut group = self.pair(tier_content.render_blocks());
            group.extend(tier_content.history.iter().map(|&msg| Segment::from(msg)));
            Self::push_cached(&mut layout, tier, group);
        }

        // ── Active tail ────────────────────────────────────────────────────
        let active = content(Tier::Active);
        let listing = [
            input.file_listing.unwrap_or_default().to_string(),
            active.render_symbols(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

        let mut tail = self.pair(listing);
        tail.extend(self.pair(input.url_context.unwrap_or_default().to_string()));
        tail.extend(self.pair(active.render_files()));
        tail.extend(active.history.iter().map(|&msg| Segment::from(msg)));
        tail.push(Segment::user(input.user_prompt));
        Self::push_block(&mut layout, Tier::Active, tail);

        debug!(
            segments = layout.segments.len(),
            boundaries = layout.boundary_count(),
            tokens = layout.total_tokens(),
            "Built tiered prompt"
        );
        layout
    }

    /// Sort every input unit into its tracked tier.
    fn partition<'a>(
        tracker: &StabilityTracker,
        input: &BuildInput<'a>,
    ) -> BTreeMap<Tier, TierContent<'a>> {
        let tier_of = |key: &ItemKey| tracker.tier_of(key).unwrap_or(Tier::Active);
        let history_tiers = tracker.history_tiers();
        let mut tiers: BTreeMap<Tier, TierContent<'a>> = BTreeMap::new();

        for (path, text) in input.symbol_blocks {
            let tier = tier_of(&ItemKey::symbol(path.as_str()));
            tiers.entry(tier).or_default().symbols.push((path.as_str(), text.as_str()));
        }
        for (path, text) in input.file_contents {
            let tier = tier_of(&ItemKey::file(path.as_str()));
            tiers.entry(tier).or_default().files.push((path.as_str(), text.as_str()));
        }
        for (index, msg) in input.history.iter().enumerate() {
            let tier = history_tiers.get(&index).copied().unwrap_or(Tier::Active);
            tiers.entry(tier).or_default().history.push(msg);
        }
        tiers
    }

    /// User segment carrying `content` plus the acknowledgement; nothing if
    /// `content` is empty.
    fn pair(&self, content: String) -> Vec<Segment> {
        if content.is_empty() {
            return Vec::new();
        }
        vec![
            Segment::user(content),
            Segment::assistant(self.acknowledgement.clone()),
        ]
    }

    /// Append a cached tier's group with a boundary on its last segment.
    fn push_cached(layout: &mut PromptLayout, tier: Tier, mut group: Vec<Segment>) {
        if let Some(last) = group.last_mut() {
            last.cache_boundary = true;
        }
        Self::push_block(layout, tier, group);
    }

    fn push_block(layout: &mut PromptLayout, tier: Tier, group: Vec<Segment>) {
        if group.is_empty() {
            return;
        }
        layout.stats.push(TierBlockStats {
            tier,
            tokens: group.iter().map(|s| token::estimate_tokens(&s.content)).sum(),
            segments: group.len(),
        });
        layout.segments.extend(group);
    }
}
