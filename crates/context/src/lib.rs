//! Prompt-cache tiering: the per-turn stability engine and its consumers.
//!
//! Data flows one way per conversation turn:
//!
//! ```text
//! caller ──▶ StabilityTracker::update ──▶ Vec<TierChange>
//!                    │
//!                    ▼
//!          TieredPromptBuilder::build ──▶ ordered segments + cache boundaries
//! ```
//!
//! [`cluster`] seeds a fresh tracker from a reference graph before the first
//! update of a session. Everything here is synchronous pure computation: no
//! I/O, no blocking, one tracker per session.

pub mod builder;
pub mod cluster;
pub mod hash;
pub mod stability;
pub mod token;

pub use builder::{BuildInput, PromptLayout, TierBlockStats, TieredPromptBuilder};
pub use cluster::{Cluster, ReferenceGraph, cluster};
pub use hash::{content_hash, observe};
pub use stability::{
    ActiveItems, MAX_CASCADE_SWEEPS, SNAPSHOT_VERSION, StabilityTracker, TierSummary,
    TrackerSnapshot,
};
pub use token::estimate_tokens;
