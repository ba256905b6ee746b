//! Tamper-Evident Event Chain
//!
//! Append-only log of every room transition. Each event commits to its
//! predecessor:
//!
//! ```text
//! hash_i = SHA256(canonical({type, data, timestamp, previousHash, index}))
//! previousHash_i = hash_{i-1}        (previousHash_0 = 00..00)
//! ```
//!
//! Events are never edited or removed. `verify()` walks from genesis and
//! reports the first index whose hash or link does not check out.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::canonical::canonical_json;
use crate::core::clock::TimestampMs;
use crate::core::hash::HexDigest;

/// Event vocabulary of the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainEventType {
    /// Second player seated; turn 1 begins.
    GameStarted,
    /// Acting player published the pre-roll frame hash.
    PreRollFrameSubmitted,
    /// Acting player published a commitment hash.
    CommitmentMade,
    /// Salt revealed and verified.
    CommitmentRevealed,
    /// Revealed salt did not match or arrived late.
    RevealRejected,
    /// Acting player declared a value.
    RollDeclared,
    /// Evidence accepted (Verified or Uncertain).
    EvidenceSubmitted,
    /// Evidence broke a timing, motion or duplication rule.
    EvidenceFlagged,
    /// Opponent agreed with uncertain evidence.
    EvidenceConfirmed,
    /// Opponent disagreed with uncertain evidence.
    EvidenceRejected,
    /// Declaration and evidence cleared for a reroll.
    RerollRequested,
    /// Turn closed; outcome counted.
    RollFinalized,
    /// A player disputed the game.
    GameDisputed,
}

impl ChainEventType {
    /// Wire name (same as the serde rendering).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GameStarted => "game_started",
            Self::PreRollFrameSubmitted => "pre_roll_frame_submitted",
            Self::CommitmentMade => "commitment_made",
            Self::CommitmentRevealed => "commitment_revealed",
            Self::RevealRejected => "reveal_rejected",
            Self::RollDeclared => "roll_declared",
            Self::EvidenceSubmitted => "evidence_submitted",
            Self::EvidenceFlagged => "evidence_flagged",
            Self::EvidenceConfirmed => "evidence_confirmed",
            Self::EvidenceRejected => "evidence_rejected",
            Self::RerollRequested => "reroll_requested",
            Self::RollFinalized => "roll_finalized",
            Self::GameDisputed => "game_disputed",
        }
    }
}

/// A single chain entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    /// Position in the chain, starting at 0.
    pub index: u64,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: ChainEventType,
    /// Type-specific payload.
    pub data: Value,
    /// Unix milliseconds when appended.
    pub timestamp: TimestampMs,
    /// Hash of the preceding event.
    pub previous_hash: HexDigest,
    /// Hash of this event.
    pub hash: HexDigest,
}

impl ChainEvent {
    /// Recompute this event's hash from its contents.
    pub fn compute_hash(&self) -> HexDigest {
        event_hash(
            self.event_type,
            &self.data,
            self.timestamp,
            &self.previous_hash,
            self.index,
        )
    }
}

/// Hash of an event preimage.
pub fn event_hash(
    event_type: ChainEventType,
    data: &Value,
    timestamp: TimestampMs,
    previous_hash: &HexDigest,
    index: u64,
) -> HexDigest {
    let preimage = json!({
        "type": event_type.as_str(),
        "data": data,
        "timestamp": timestamp,
        "previousHash": previous_hash.to_hex(),
        "index": index,
    });
    HexDigest::of(canonical_json(&preimage).as_bytes())
}

/// Why an event failed verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFaultKind {
    /// Stored hash differs from the recomputed one.
    HashMismatch,
    /// `previous_hash` does not match the prior event.
    LinkMismatch,
    /// Stored index differs from the position.
    IndexMismatch,
}

/// A verification failure at a given index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainFault {
    /// Index of the offending event.
    pub index: u64,
    /// What failed.
    pub kind: ChainFaultKind,
}

/// Result of `HashChain::verify`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    /// Whether every event checks out.
    pub valid: bool,
    /// First failing index, if any.
    pub first_bad_index: Option<u64>,
}

/// Chain import errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// An event failed verification.
    #[error("chain invalid at index {}: {:?}", .0.index, .0.kind)]
    Invalid(ChainFault),

    /// Stored tip disagrees with the last event.
    #[error("chain tip {stored} does not match last event hash {expected}")]
    TipMismatch {
        /// Tip recorded in the snapshot.
        stored: HexDigest,
        /// Hash of the last event.
        expected: HexDigest,
    },
}

/// Serialized form of a chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// All events, genesis first.
    pub events: Vec<ChainEvent>,
    /// Hash of the last event (zero when empty).
    pub tip: HexDigest,
}

/// Append-only hash chain.
///
/// Deserializing goes through `import_snapshot`, so a tampered snapshot
/// can never be loaded.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "ChainSnapshot", into = "ChainSnapshot")]
pub struct HashChain {
    events: Vec<ChainEvent>,
    tip: HexDigest,
}

impl HashChain {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return it.
    pub fn append(
        &mut self,
        event_type: ChainEventType,
        data: Value,
        timestamp: TimestampMs,
    ) -> ChainEvent {
        let index = self.events.len() as u64;
        let previous_hash = self.tip;
        let hash = event_hash(event_type, &data, timestamp, &previous_hash, index);

        let event = ChainEvent {
            index,
            event_type,
            data,
            timestamp,
            previous_hash,
            hash,
        };

        self.tip = hash;
        self.events.push(event.clone());
        event
    }

    /// Hash of the most recent event.
    pub fn tip(&self) -> HexDigest {
        self.tip
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the chain has no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events, genesis first.
    pub fn events(&self) -> &[ChainEvent] {
        &self.events
    }

    /// The last `n` events, oldest first.
    pub fn recent(&self, n: usize) -> &[ChainEvent] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    /// Walk from genesis and report the first failing index.
    pub fn verify(&self) -> ChainVerification {
        let first = verify_events(&self.events).into_iter().next();
        ChainVerification {
            valid: first.is_none(),
            first_bad_index: first.map(|f| f.index),
        }
    }

    /// Export events and tip.
    pub fn export_snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            events: self.events.clone(),
            tip: self.tip,
        }
    }

    /// Restore from a snapshot, rejecting it unless it verifies.
    pub fn import_snapshot(snapshot: ChainSnapshot) -> Result<Self, ChainError> {
        if let Some(fault) = verify_events(&snapshot.events).into_iter().next() {
            return Err(ChainError::Invalid(fault));
        }

        let expected = snapshot.events.last().map(|e| e.hash).unwrap_or(HexDigest::ZERO);
        if snapshot.tip != expected {
            return Err(ChainError::TipMismatch {
                stored: snapshot.tip,
                expected,
            });
        }

        Ok(Self {
            events: snapshot.events,
            tip: snapshot.tip,
        })
    }
}

impl TryFrom<ChainSnapshot> for HashChain {
    type Error = ChainError;

    fn try_from(snapshot: ChainSnapshot) -> Result<Self, Self::Error> {
        Self::import_snapshot(snapshot)
    }
}

impl From<HashChain> for ChainSnapshot {
    fn from(chain: HashChain) -> Self {
        ChainSnapshot {
            events: chain.events,
            tip: chain.tip,
        }
    }
}

/// Every fault in a sequence of events, in index order.
///
/// The link of event `i + 1` is checked against both the stored and the
/// recomputed hash of event `i`, so editing any field of `i` also breaks
/// `i + 1`.
pub fn verify_events(events: &[ChainEvent]) -> Vec<ChainFault> {
    let mut faults = Vec::new();
    let mut prev_stored = HexDigest::ZERO;
    let mut prev_computed = HexDigest::ZERO;

    for (position, event) in events.iter().enumerate() {
        let index = position as u64;
        let computed = event.compute_hash();

        if event.index != index {
            faults.push(ChainFault { index, kind: ChainFaultKind::IndexMismatch });
        } else if computed != event.hash {
            faults.push(ChainFault { index, kind: ChainFaultKind::HashMismatch });
        }

        if event.previous_hash != prev_stored || event.previous_hash != prev_computed {
            faults.push(ChainFault { index, kind: ChainFaultKind::LinkMismatch });
        }

        prev_stored = event.hash;
        prev_computed = computed;
    }

    faults
}

// =============================================================================
// TESTS
// =============================================================================
