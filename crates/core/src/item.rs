//! Content units and their tracked state.
//!
//! Callers hand keys in as strings (`"file:src/lib.rs"`, `"symbol:src/lib.rs"`,
//! `"history:12"`). They are parsed once into an [`ItemKey`] at the boundary;
//! the tracker never re-splits strings.

use crate::error::KeyParseError;
use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Content hash stored for items seeded at cold start, before their real
/// content has been observed.
pub const PLACEHOLDER_HASH: &str = "";

/// The kind of content a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    /// Full file content.
    File,
    /// Structural summary (symbol map block) of a file.
    Symbol,
    /// A prior conversation turn.
    History,
}

impl ItemType {
    /// The tag used in the string form of a key.
    pub fn tag(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Symbol => "symbol",
            Self::History => "history",
        }
    }

    /// Whether items of this type are backed by a repository path.
    pub fn is_file_backed(self) -> bool {
        matches!(self, Self::File | Self::Symbol)
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Unique identifier of a content unit.
///
/// The derived ordering sorts files, then symbols, then history; history
/// indices compare numerically, so history keys sort oldest first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ItemKey {
    File(String),
    Symbol(String),
    History(usize),
}

impl ItemKey {
    pub fn file(path: impl Into<String>) -> Self {
        Self::File(path.into())
    }

    pub fn symbol(path: impl Into<String>) -> Self {
        Self::Symbol(path.into())
    }

    pub fn history(index: usize) -> Self {
        Self::History(index)
    }

    /// Parse a caller-supplied `"type:rest"` key.
    pub fn parse(key: &str) -> crate::Result<Self> {
        Ok(key.parse::<Self>()?)
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            Self::File(_) => ItemType::File,
            Self::Symbol(_) => ItemType::Symbol,
            Self::History(_) => ItemType::History,
        }
    }

    /// The repository path backing this key, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::File(path) | Self::Symbol(path) => Some(path),
            Self::History(_) => None,
        }
    }

    /// The conversation index of a history key.
    pub fn history_index(&self) -> Option<usize> {
        match self {
            Self::History(index) => Some(*index),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "file:{path}"),
            Self::Symbol(path) => write!(f, "symbol:{path}"),
            Self::History(index) => write!(f, "history:{index}"),
        }
    }
}

impl FromStr for ItemKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, rest) = s
            .split_once(':')
            .ok_or_else(|| KeyParseError::MissingTag(s.to_string()))?;
        match tag {
            "file" | "symbol" if rest.is_empty() => Err(KeyParseError::EmptyPath(s.to_string())),
            "file" => Ok(Self::File(rest.to_string())),
            "symbol" => Ok(Self::Symbol(rest.to_string())),
            "history" => rest
                .parse()
                .map(Self::History)
                .map_err(|_| KeyParseError::BadHistoryIndex(rest.to_string())),
            _ => Err(KeyParseError::UnknownTag {
                tag: tag.to_string(),
                key: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ItemKey {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemKey> for String {
    fn from(key: ItemKey) -> Self {
        key.to_string()
    }
}

/// What the caller observed for one item this turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveItem {
    /// Short fingerprint of the item's current content.
    pub content_hash: String,
    /// Approximate size in model tokens.
    pub tokens: usize,
}

impl ActiveItem {
    pub fn new(content_hash: impl Into<String>, tokens: usize) -> Self {
        Self {
            content_hash: content_hash.into(),
            tokens,
        }
    }
}

/// The tracker's state for one content unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub key: ItemKey,
    pub tier: Tier,
    /// Consecutive turns observed unchanged in the current tier lineage.
    pub stability: u32,
    pub content_hash: String,
    pub tokens: usize,
}

impl TrackedItem {
    /// A brand-new item: `Active`, stability 0.
    pub fn new(key: ItemKey, content_hash: impl Into<String>, tokens: usize) -> Self {
        Self {
            key,
            tier: Tier::Active,
            stability: Tier::Active.entry_value(),
            content_hash: content_hash.into(),
            tokens,
        }
    }

    /// An item seeded directly into `tier` at its entry value, with a
    /// placeholder hash.
    pub fn seeded(key: ItemKey, tier: Tier, tokens: usize) -> Self {
        Self {
            key,
            tier,
            stability: tier.entry_value(),
            content_hash: PLACEHOLDER_HASH.to_string(),
            tokens,
        }
    }

    pub fn item_type(&self) -> ItemType {
        self.key.item_type()
    }

    pub fn has_placeholder_hash(&self) -> bool {
        self.content_hash == PLACEHOLDER_HASH
    }

    /// Move into `tier`, taking its entry value.
    pub fn enter(&mut self, tier: Tier) {
        self.tier = tier;
        self.stability = tier.entry_value();
    }
}

/// One tier transition emitted during an update cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierChange {
    pub key: ItemKey,
    pub item_type: ItemType,
    pub old_tier: Tier,
    pub new_tier: Tier,
}

impl TierChange {
    pub fn new(key: ItemKey, old_tier: Tier, new_tier: Tier) -> Self {
        Self {
            item_type: key.item_type(),
            key,
            old_tier,
            new_tier,
        }
    }

    /// Moved toward `L0`.
    pub fn is_promotion(&self) -> bool {
        self.new_tier < self.old_tier
    }

    /// Moved toward `Active`.
    pub fn is_demotion(&self) -> bool {
        self.new_tier > self.old_tier
    }
}

impl std::fmt::Display for TierChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = if self.is_promotion() { "promoted" } else { "demoted" };
        write!(f, "{} {verb} {} -> {}", self.key, self.old_tier, self.new_tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_key_kinds() {
        assert_eq!("file:src/a.py".parse::<ItemKey>().unwrap(), ItemKey::file("src/a.py"));
        assert_eq!("symbol:b.rs".parse::<ItemKey>().unwrap(), ItemKey::symbol("b.rs"));
        assert_eq!("history:42".parse::<ItemKey>().unwrap(), ItemKey::history(42));
    }

    #[test]
    fn path_may_contain_colons() {
        let key: ItemKey = "file:C:/repo/main.rs".parse().unwrap();
        assert_eq!(key.path(), Some("C:/repo/main.rs"));
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(
            "nocolon".parse::<ItemKey>(),
            Err(KeyParseError::MissingTag("nocolon".into()))
        );
        assert!(matches!(
            "dir:src".parse::<ItemKey>(),
            Err(KeyParseError::UnknownTag { .. })
        ));
        assert_eq!(
            "history:abc".parse::<ItemKey>(),
            Err(KeyParseError::BadHistoryIndex("abc".into()))
        );
        assert!(matches!("file:".parse::<ItemKey>(), Err(KeyParseError::EmptyPath(_))));
    }

    #[test]
    fn parse_lifts_key_errors_into_crate_error() {
        assert_eq!(ItemKey::parse("symbol:lib.rs").unwrap(), ItemKey::symbol("lib.rs"));
        let err = ItemKey::parse("dir:src").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Key(KeyParseError::UnknownTag { ref tag, .. }) if tag == "dir"
        ));
    }

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(ItemKey::symbol("x/y.rs").to_string(), "symbol:x/y.rs");
        assert_eq!(ItemKey::history(3).to_string(), "history:3");
    }

    #[test]
    fn history_keys_sort_numerically() {
        let mut keys = vec![ItemKey::history(10), ItemKey::history(2), ItemKey::history(1)];
        keys.sort();
        assert_eq!(keys, vec![ItemKey::history(1), ItemKey::history(2), ItemKey::history(10)]);
    }

    #[test]
    fn key_serializes_as_string() {
        let json = serde_json::to_string(&ItemKey::file("a.py")).unwrap();
        assert_eq!(json, "\"file:a.py\"");
        let back: ItemKey = serde_json::from_str("\"history:7\"").unwrap();
        assert_eq!(back, ItemKey::history(7));
        assert!(serde_json::from_str::<ItemKey>("\"bogus\"").is_err());
    }

    #[test]
    fn only_files_and_symbols_have_paths() {
        assert!(ItemType::File.is_file_backed());
        assert!(ItemType::Symbol.is_file_backed());
        assert!(!ItemType::History.is_file_backed());
        assert_eq!(ItemKey::history(0).path(), None);
        assert_eq!(ItemKey::history(5).history_index(), Some(5));
    }

    #[test]
    fn seeded_item_has_placeholder_and_entry_value() {
        let item = TrackedItem::seeded(ItemKey::symbol("a.rs"), Tier::L2, 100);
        assert!(item.has_placeholder_hash());
        assert_eq!(item.stability, 6);
        assert_eq!(item.item_type(), ItemType::Symbol);
    }

    #[test]
    fn tier_change_direction() {
        let up = TierChange::new(ItemKey::file("a"), Tier::L3, Tier::L2);
        let down = TierChange::new(ItemKey::file("a"), Tier::L2, Tier::Active);
        assert!(up.is_promotion() && !up.is_demotion());
        assert!(down.is_demotion() && !down.is_promotion());
        assert_eq!(up.item_type, ItemType::File);
    }
}
