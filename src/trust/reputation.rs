//! Reputation Tiers
//!
//! A tier is a pure function of a player's finalized roll count and
//! violation count. It is recomputed on demand and never stored, so it
//! cannot drift from its inputs.

use serde::{Deserialize, Serialize};

/// Tier thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationRules {
    /// Violations at which a player is Flagged.
    pub flag_threshold: u32,
    /// Violations at which a player is Suspended.
    pub suspend_threshold: u32,
    /// Finalized rolls at which a clean player is Trusted.
    pub trusted_threshold: u32,
}

impl Default for ReputationRules {
    fn default() -> Self {
        Self {
            flag_threshold: 1,
            suspend_threshold: 5,
            trusted_threshold: 10,
        }
    }
}

/// Trust classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationTier {
    /// Few rolls, no violations.
    New,
    /// Enough clean rolls.
    Trusted,
    /// At least one violation.
    Flagged,
    /// Too many violations; may not play.
    Suspended,
}

impl ReputationTier {
    /// Whether a player in this tier may act.
    pub fn can_play(&self) -> bool {
        !matches!(self, Self::Suspended)
    }
}

/// Derive the tier.
pub fn tier(roll_count: u32, violation_count: u32, rules: &ReputationRules) -> ReputationTier {
    if violation_count >= rules.suspend_threshold {
        ReputationTier::Suspended
    } else if violation_count >= rules.flag_threshold {
        ReputationTier::Flagged
    } else if roll_count >= rules.trusted_threshold {
        ReputationTier::Trusted
    } else {
        ReputationTier::New
    }
}
