//! Protocol Configuration
//!
//! The single source of every protocol constant. Components receive the
//! slice they need (`EvidenceRules`, `FairnessRules`, `ReputationRules`).

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::proof::evidence::EvidenceRules;
use crate::trust::fairness::{FairnessRules, CHI2_CRITICAL_P05, CHI2_CRITICAL_P10};
use crate::trust::reputation::ReputationRules;

/// Protocol constants for a room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Maximum time from reveal (or reroll) to evidence.
    pub detection_window_ms: i64,
    /// Maximum reported settling time.
    pub stabilization_max_ms: i64,
    /// Motion score above which the camera is considered moved.
    pub camera_move_threshold: f64,
    /// Matching detections needed for a verified value.
    pub consensus_min_match: usize,
    /// Rerolls allowed per turn.
    pub max_rerolls: u32,
    /// Maximum time from commitment to reveal.
    pub commit_reveal_window_ms: i64,
    /// Violations at which a player is Flagged.
    pub flag_threshold: u32,
    /// Violations at which a player is Suspended.
    pub suspend_threshold: u32,
    /// Finalized rolls at which a clean player is Trusted.
    pub trusted_threshold: u32,
    /// Samples before the fairness test applies.
    pub fairness_min_samples: u32,
    /// Outcomes kept by the fairness monitor.
    pub fairness_window: usize,
    /// Chain events included in `getState`.
    pub recent_events: usize,
    /// Finalized turns after which the game completes (None = endless).
    pub max_turns: Option<u32>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            detection_window_ms: 10_000,
            stabilization_max_ms: 5_000,
            camera_move_threshold: 0.15,
            consensus_min_match: 2,
            max_rerolls: 3,
            commit_reveal_window_ms: 60_000,
            flag_threshold: 1,
            suspend_threshold: 5,
            trusted_threshold: 10,
            fairness_min_samples: 30,
            fairness_window: 600,
            recent_events: 20,
            max_turns: None,
        }
    }
}

impl ProtocolConfig {
    /// Defaults overridden by `DICE_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            detection_window_ms: env_or("DICE_DETECTION_WINDOW_MS", d.detection_window_ms),
            stabilization_max_ms: env_or("DICE_STABILIZATION_MAX_MS", d.stabilization_max_ms),
            camera_move_threshold: env_or("DICE_CAMERA_MOVE_THRESHOLD", d.camera_move_threshold),
            consensus_min_match: env_or("DICE_CONSENSUS_MIN_MATCH", d.consensus_min_match),
            max_rerolls: env_or("DICE_MAX_REROLLS", d.max_rerolls),
            commit_reveal_window_ms: env_or("DICE_COMMIT_REVEAL_WINDOW_MS", d.commit_reveal_window_ms),
            flag_threshold: env_or("DICE_FLAG_THRESHOLD", d.flag_threshold),
            suspend_threshold: env_or("DICE_SUSPEND_THRESHOLD", d.suspend_threshold),
            trusted_threshold: env_or("DICE_TRUSTED_THRESHOLD", d.trusted_threshold),
            fairness_min_samples: env_or("DICE_FAIRNESS_MIN_SAMPLES", d.fairness_min_samples),
            fairness_window: env_or("DICE_FAIRNESS_WINDOW", d.fairness_window),
            recent_events: env_or("DICE_RECENT_EVENTS", d.recent_events),
            max_turns: std::env::var("DICE_MAX_TURNS")
                .ok()
                .and_then(|v| parse_or_warn("DICE_MAX_TURNS", &v)),
        }
    }

    /// Evidence validator thresholds.
    pub fn evidence_rules(&self) -> EvidenceRules {
        EvidenceRules {
            detection_window_ms: self.detection_window_ms,
            stabilization_max_ms: self.stabilization_max_ms,
            camera_move_threshold: self.camera_move_threshold,
            consensus_min_match: self.consensus_min_match,
        }
    }

    /// Fairness monitor thresholds.
    pub fn fairness_rules(&self) -> FairnessRules {
        FairnessRules {
            min_samples: self.fairness_min_samples,
            window: self.fairness_window,
            observe_threshold: CHI2_CRITICAL_P10,
            suspect_threshold: CHI2_CRITICAL_P05,
        }
    }

    /// Reputation thresholds.
    pub fn reputation_rules(&self) -> ReputationRules {
        ReputationRules {
            flag_threshold: self.flag_threshold,
            suspend_threshold: self.suspend_threshold,
            trusted_threshold: self.trusted_threshold,
        }
    }
}

pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => parse_or_warn(key, &raw).unwrap_or(default),
        Err(_) => default,
    }
}

pub(crate) fn parse_or_warn<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key = key, value = raw, "ignoring unparseable configuration value");
            None
        }
    }
}
