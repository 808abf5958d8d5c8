//! # ripplecache core
//!
//! Domain types and error definitions for the ripplecache prompt-cache tier
//! engine. This crate holds **no algorithm code**; it defines the model
//! that the tracker, clusterer and builder in `ripplecache-context` operate on.
//!
//! ## Model
//!
//! - [`Tier`]: five ordered stability classes, `L0` (most stable) to `Active`.
//! - [`ItemKey`]: a content unit: a file, a file's symbol summary, or a
//!   conversation turn.
//! - [`TrackedItem`]: the tracker's per-unit state (tier, stability, hash).
//! - [`TierChange`]: one tier transition emitted by an update cycle.
//! - [`Segment`]: one ordered prompt segment with an optional cache boundary.

pub mod error;
pub mod item;
pub mod message;
pub mod tier;

// Re-export key types at crate root for ergonomics
pub use error::{Error, KeyParseError, Result, SnapshotError};
pub use item::{ActiveItem, ItemKey, ItemType, PLACEHOLDER_HASH, TierChange, TrackedItem};
pub use message::{HistoryMessage, Role, Segment};
pub use tier::{Tier, TierConfig};
