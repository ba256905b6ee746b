//! Evidence Consensus Validation
//!
//! An evidence package carries three independent detections of the settled
//! die, produced by an external recognizer that this engine never trusts.
//! Validation runs in order and stops at the first failing stage:
//!
//! 1. structural  - shape and ranges of every field
//! 2. timing      - evidence inside the detection window after the reveal
//! 3. motion      - camera did not move between baseline and roll
//! 4. duplication - no frame reused inside the package or from earlier turns
//!
//! Only then are the three values put to a majority vote.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::canonical::to_canonical_string;
use crate::core::clock::TimestampMs;
use crate::core::hash::{is_hex_digest, HexDigest};

/// Number of frames/detections in a package.
pub const SAMPLE_COUNT: usize = 3;

/// Highest face value. Detections use 0 for "uncertain".
pub const MAX_FACE: u8 = 6;

/// Evidence as submitted by a client.
///
/// Fields are kept loosely typed so that malformed input reaches the
/// structural check instead of failing deserialization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvidencePackage {
    /// Turn this evidence belongs to.
    pub turn_number: i64,
    /// Hash of the rolling surface baseline.
    pub surface_hash: String,
    /// Hashes of the three captured frames.
    pub frame_hashes: Vec<String>,
    /// Detector value per frame (0 = uncertain).
    pub dice_values: Vec<i64>,
    /// Time the die took to settle.
    pub stabilization_time_ms: i64,
    /// Camera motion between baseline and roll, 0.0-1.0.
    pub residual_motion_score: f64,
    /// Recognizer version, for audit only.
    pub algorithm_version: String,
    /// Capture time (Unix ms).
    pub timestamp: Option<TimestampMs>,
}

impl EvidencePackage {
    /// Digest of the canonical rendering, used to reference the package
    /// from chain events.
    pub fn digest(&self) -> Result<HexDigest, serde_json::Error> {
        Ok(HexDigest::of(to_canonical_string(self)?.as_bytes()))
    }
}

/// A single detection from the external recognizer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionSample {
    /// Detected face (1-6) or 0 when the recognizer could not tell.
    pub value: u8,
    /// Recognizer confidence, 0.0-1.0.
    pub confidence: f64,
}

/// Assembles a package from recognizer output.
///
/// Samples below `min_confidence` are recorded as 0 so the vote treats
/// them as uncertain.
#[derive(Clone, Debug)]
pub struct EvidenceBuilder {
    package: EvidencePackage,
    min_confidence: f64,
}

impl EvidenceBuilder {
    /// Start a package for a turn.
    pub fn new(turn_number: u32, surface_hash: HexDigest) -> Self {
        Self {
            package: EvidencePackage {
                turn_number: i64::from(turn_number),
                surface_hash: surface_hash.to_hex(),
                ..Default::default()
            },
            min_confidence: 0.5,
        }
    }

    /// Minimum confidence for a sample to count.
    pub fn min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = min;
        self
    }

    /// Add one captured frame and its detection.
    pub fn sample(mut self, frame: HexDigest, detection: DetectionSample) -> Self {
        let value = if detection.confidence >= self.min_confidence && detection.value <= MAX_FACE {
            detection.value
        } else {
            0
        };
        self.package.frame_hashes.push(frame.to_hex());
        self.package.dice_values.push(i64::from(value));
        self
    }

    /// Settling and motion metadata.
    pub fn motion(mut self, stabilization_time_ms: i64, residual_motion_score: f64) -> Self {
        self.package.stabilization_time_ms = stabilization_time_ms;
        self.package.residual_motion_score = residual_motion_score;
        self
    }

    /// Finish the package.
    pub fn build(mut self, algorithm_version: &str, timestamp: TimestampMs) -> EvidencePackage {
        self.package.algorithm_version = algorithm_version.to_string();
        self.package.timestamp = Some(timestamp);
        self.package
    }
}

/// Thresholds used by the validator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRules {
    /// Maximum time between reveal and evidence.
    pub detection_window_ms: i64,
    /// Maximum settling time.
    pub stabilization_max_ms: i64,
    /// Motion score above which the camera is considered moved.
    pub camera_move_threshold: f64,
    /// Matching detections needed for a verified value.
    pub consensus_min_match: usize,
}

impl Default for EvidenceRules {
    fn default() -> Self {
        Self {
            detection_window_ms: 10_000,
            stabilization_max_ms: 5_000,
            camera_move_threshold: 0.15,
            consensus_min_match: 2,
        }
    }
}

/// Per-turn context the package is checked against.
#[derive(Clone, Copy, Debug)]
pub struct EvidenceContext<'a> {
    /// Turn currently being played.
    pub turn_number: u32,
    /// Start of the detection window (reveal, or the latest reroll).
    pub window_start: TimestampMs,
    /// Frames already used by earlier packages in the room.
    pub seen_frames: &'a BTreeSet<HexDigest>,
}

/// Outcome class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    /// Majority agrees on a face.
    Verified,
    /// No usable majority; opponent must confirm.
    Uncertain,
    /// Rejected by a structural, timing, motion or duplication rule.
    Flagged,
}

/// Why a package was flagged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FlagReason {
    /// A field is missing or out of range.
    Malformed {
        /// Description of the first problem found.
        detail: String,
    },
    /// Evidence timestamp precedes the reveal.
    EvidenceBeforeReveal {
        /// Evidence minus window start.
        delta_ms: i64,
    },
    /// Evidence arrived after the detection window closed.
    DetectionWindowExceeded {
        /// Evidence minus window start.
        delta_ms: i64,
        /// Configured window.
        window_ms: i64,
    },
    /// Die took too long to settle.
    StabilizationTooSlow {
        /// Reported settling time.
        stabilization_time_ms: i64,
        /// Configured maximum.
        max_ms: i64,
    },
    /// Camera moved between baseline and roll.
    CameraMoved {
        /// Reported motion.
        score: f64,
        /// Configured threshold.
        threshold: f64,
    },
    /// A frame hash was reused.
    DuplicateFrame {
        /// The repeated frame.
        frame_hash: HexDigest,
    },
}

impl FlagReason {
    /// Whether this is a malformed-input rejection rather than a rule
    /// violation by the player.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

impl std::fmt::Display for FlagReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { detail } => write!(f, "malformed evidence: {}", detail),
            Self::EvidenceBeforeReveal { delta_ms } => {
                write!(f, "evidence predates reveal by {} ms", delta_ms.saturating_neg())
            }
            Self::DetectionWindowExceeded { delta_ms, window_ms } => {
                write!(f, "evidence {} ms after reveal exceeds {} ms window", delta_ms, window_ms)
            }
            Self::StabilizationTooSlow { stabilization_time_ms, max_ms } => {
                write!(f, "stabilization {} ms exceeds {} ms", stabilization_time_ms, max_ms)
            }
            Self::CameraMoved { score, threshold } => {
                write!(f, "camera moved (motion {:.3} > {:.3})", score, threshold)
            }
            Self::DuplicateFrame { frame_hash } => {
                write!(f, "frame {} already used", frame_hash.short())
            }
        }
    }
}

/// Validator verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceResult {
    /// Outcome class.
    pub status: EvidenceStatus,
    /// Majority face, when one reached the minimum match.
    pub value: Option<u8>,
    /// `match_count / 3` for Verified, 0 otherwise.
    pub confidence: f64,
    /// Occurrences of the most frequent detection.
    pub match_count: usize,
    /// Flag reasons (Flagged only).
    pub reasons: Vec<FlagReason>,
}

impl EvidenceResult {
    fn flagged(reasons: Vec<FlagReason>) -> Self {
        Self {
            status: EvidenceStatus::Flagged,
            value: None,
            confidence: 0.0,
            match_count: 0,
            reasons,
        }
    }

    /// Whether the package was rejected for shape rather than conduct.
    pub fn is_structural(&self) -> bool {
        self.reasons.iter().any(FlagReason::is_structural)
    }
}

/// Frames and values extracted by a passing structural check.
struct CheckedEvidence {
    frames: Vec<HexDigest>,
    values: Vec<u8>,
    timestamp: TimestampMs,
}

/// Run all checks and the consensus vote.
pub fn validate(
    evidence: &EvidencePackage,
    ctx: &EvidenceContext<'_>,
    rules: &EvidenceRules,
) -> EvidenceResult {
    let checked = match check_structure(evidence, ctx.turn_number) {
        Ok(checked) => checked,
        Err(detail) => return EvidenceResult::flagged(vec![FlagReason::Malformed { detail }]),
    };

    let timing = check_timing(evidence, checked.timestamp, ctx.window_start, rules);
    if !timing.is_empty() {
        return EvidenceResult::flagged(timing);
    }

    if evidence.residual_motion_score > rules.camera_move_threshold {
        return EvidenceResult::flagged(vec![FlagReason::CameraMoved {
            score: evidence.residual_motion_score,
            threshold: rules.camera_move_threshold,
        }]);
    }

    if let Some(frame_hash) = first_duplicate(&checked.frames, ctx.seen_frames) {
        return EvidenceResult::flagged(vec![FlagReason::DuplicateFrame { frame_hash }]);
    }

    consensus(&checked.values, rules.consensus_min_match)
}

fn check_structure(evidence: &EvidencePackage, turn_number: u32) -> Result<CheckedEvidence, String> {
    if evidence.turn_number <= 0 {
        return Err("turn number must be a positive integer".into());
    }
    if evidence.turn_number != i64::from(turn_number) {
        return Err(format!(
            "evidence is for turn {}, current turn is {}",
            evidence.turn_number, turn_number
        ));
    }
    if !is_hex_digest(&evidence.surface_hash) {
        return Err("surface hash must be a 64-character hex digest".into());
    }
    if evidence.frame_hashes.len() != SAMPLE_COUNT {
        return Err(format!(
            "expected {} frame hashes, got {}",
            SAMPLE_COUNT,
            evidence.frame_hashes.len()
        ));
    }
    let mut frames = Vec::with_capacity(SAMPLE_COUNT);
    for hash in &evidence.frame_hashes {
        if !is_hex_digest(hash) {
            return Err(format!("frame hash {:?} is not a 64-character hex digest", hash));
        }
        frames.push(hash.parse::<HexDigest>().map_err(|e| e.to_string())?);
    }
    if evidence.dice_values.len() != SAMPLE_COUNT {
        return Err(format!(
            "expected {} dice values, got {}",
            SAMPLE_COUNT,
            evidence.dice_values.len()
        ));
    }
    let mut values = Vec::with_capacity(SAMPLE_COUNT);
    for &value in &evidence.dice_values {
        if !(0..=i64::from(MAX_FACE)).contains(&value) {
            return Err(format!("dice value {} outside 0-{}", value, MAX_FACE));
        }
        values.push(value as u8);
    }
    if evidence.stabilization_time_ms < 0 {
        return Err("stabilization time must not be negative".into());
    }
    if !(0.0..=1.0).contains(&evidence.residual_motion_score) {
        return Err(format!(
            "residual motion score {} outside 0.0-1.0",
            evidence.residual_motion_score
        ));
    }
    if evidence.algorithm_version.trim().is_empty() {
        return Err("algorithm version is required".into());
    }
    let timestamp = evidence.timestamp.ok_or_else(|| "timestamp is required".to_string())?;

    Ok(CheckedEvidence { frames, values, timestamp })
}

fn check_timing(
    evidence: &EvidencePackage,
    timestamp: TimestampMs,
    window_start: TimestampMs,
    rules: &EvidenceRules,
) -> Vec<FlagReason> {
    let mut reasons = Vec::new();
    // Saturates so an extreme client timestamp lands on the matching side.
    let delta_ms = timestamp.saturating_sub(window_start);

    if delta_ms < 0 {
        reasons.push(FlagReason::EvidenceBeforeReveal { delta_ms });
    } else if delta_ms > rules.detection_window_ms {
        reasons.push(FlagReason::DetectionWindowExceeded {
            delta_ms,
            window_ms: rules.detection_window_ms,
        });
    }

    if evidence.stabilization_time_ms > rules.stabilization_max_ms {
        reasons.push(FlagReason::StabilizationTooSlow {
            stabilization_time_ms: evidence.stabilization_time_ms,
            max_ms: rules.stabilization_max_ms,
        });
    }

    reasons
}

fn first_duplicate(frames: &[HexDigest], seen: &BTreeSet<HexDigest>) -> Option<HexDigest> {
    let mut local = BTreeSet::new();
    frames
        .iter()
        .find(|frame| seen.contains(*frame) || !local.insert(**frame))
        .copied()
}

/// Majority vote over detections.
///
/// The most frequent value wins; ties go to the value seen first. A zero
/// winner, or a winner below `min_match`, is Uncertain. Empty input is
/// Flagged.
pub fn consensus(values: &[u8], min_match: usize) -> EvidenceResult {
    if values.is_empty() {
        return EvidenceResult::flagged(vec![FlagReason::Malformed {
            detail: "no detections".into(),
        }]);
    }

    // (value, count) in first-seen order
    let mut tally: Vec<(u8, usize)> = Vec::with_capacity(values.len());
    for &value in values {
        match tally.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => tally.push((value, 1)),
        }
    }

    let mut best = tally[0];
    for &(value, count) in &tally[1..] {
        if count > best.1 {
            best = (value, count);
        }
    }
    let (value, count) = best;

    if value != 0 && count >= min_match {
        EvidenceResult {
            status: EvidenceStatus::Verified,
            value: Some(value),
            confidence: count as f64 / values.len() as f64,
            match_count: count,
            reasons: Vec::new(),
        }
    } else {
        EvidenceResult {
            status: EvidenceStatus::Uncertain,
            value: None,
            confidence: 0.0,
            match_count: count,
            reasons: Vec::new(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
