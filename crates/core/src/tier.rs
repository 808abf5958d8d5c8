//! Cache tiers and their static stability thresholds.
//!
//! Tiers are ordered from most stable to least stable:
//!
//! | Tier | Entry value | Promotion value |
//! |------|-------------|-----------------|
//! | `L0` | 12 | none (terminal) |
//! | `L1` | 9 | 12 |
//! | `L2` | 6 | 9 |
//! | `L3` | 3 | 6 |
//! | `Active` | 0 | 3 |
//!
//! "Promotion" always moves an item toward `L0`; "demotion" toward `Active`.

use serde::{Deserialize, Serialize};

/// Static per-tier stability configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierConfig {
    /// Stability an item is given the instant it enters the tier.
    pub entry_value: u32,
    /// Stability an item must reach while resident to be eligible for the
    /// next more-stable tier. `None` for `L0`.
    pub promotion_value: Option<u32>,
}

/// One of the five ordered stability classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "L0")]
    L0,
    #[serde(rename = "L1")]
    L1,
    #[serde(rename = "L2")]
    L2,
    #[serde(rename = "L3")]
    L3,
    #[serde(rename = "active")]
    Active,
}

const L0_CONFIG: TierConfig = TierConfig {
    entry_value: 12,
    promotion_value: None,
};
const L1_CONFIG: TierConfig = TierConfig {
    entry_value: 9,
    promotion_value: Some(12),
};
const L2_CONFIG: TierConfig = TierConfig {
    entry_value: 6,
    promotion_value: Some(9),
};
const L3_CONFIG: TierConfig = TierConfig {
    entry_value: 3,
    promotion_value: Some(6),
};
const ACTIVE_CONFIG: TierConfig = TierConfig {
    entry_value: 0,
    promotion_value: Some(3),
};

impl Tier {
    /// Every tier, most stable first.
    pub const ALL: [Tier; 5] = [Tier::L0, Tier::L1, Tier::L2, Tier::L3, Tier::Active];

    /// The cached tiers, most stable first.
    pub const CACHED: [Tier; 4] = [Tier::L0, Tier::L1, Tier::L2, Tier::L3];

    pub fn config(self) -> TierConfig {
        match self {
            Tier::L0 => L0_CONFIG,
            Tier::L1 => L1_CONFIG,
            Tier::L2 => L2_CONFIG,
            Tier::L3 => L3_CONFIG,
            Tier::Active => ACTIVE_CONFIG,
        }
    }

    pub fn entry_value(self) -> u32 {
        self.config().entry_value
    }

    pub fn promotion_value(self) -> Option<u32> {
        self.config().promotion_value
    }

    /// The next more-stable tier, or `None` for `L0`.
    pub fn promotes_to(self) -> Option<Tier> {
        match self {
            Tier::L0 => None,
            Tier::L1 => Some(Tier::L0),
            Tier::L2 => Some(Tier::L1),
            Tier::L3 => Some(Tier::L2),
            Tier::Active => Some(Tier::L3),
        }
    }

    /// The next less-stable tier, or `None` for `Active`.
    pub fn demotes_to(self) -> Option<Tier> {
        match self {
            Tier::L0 => Some(Tier::L1),
            Tier::L1 => Some(Tier::L2),
            Tier::L2 => Some(Tier::L3),
            Tier::L3 => Some(Tier::Active),
            Tier::Active => None,
        }
    }

    /// Whether content in this tier sits behind a cache boundary.
    pub fn is_cached(self) -> bool {
        self != Tier::Active
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::L0 => write!(f, "L0"),
            Self::L1 => write!(f, "L1"),
            Self::L2 => write!(f, "L2"),
            Self::L3 => write!(f, "L3"),
            Self::Active => write!(f, "active"),
        }
    }
}
