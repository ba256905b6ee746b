//! Room, Player and Turn State
//!
//! A `Room` is owned by exactly one actor and mutated only through the
//! transitions in `turn.rs`. Turn progress is an explicit tagged phase:
//! each variant carries exactly the data that has been established so far,
//! so a declaration can never be read before the reveal that unlocks it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::clock::TimestampMs;
use crate::core::hash::HexDigest;
use crate::proof::chain::HashChain;
use crate::proof::evidence::{EvidencePackage, EvidenceResult};
use crate::trust::fairness::FairnessMonitor;
use crate::trust::reputation::{tier, ReputationRules, ReputationTier};

/// Players per room.
pub const ROOM_CAPACITY: usize = 2;

/// Maximum identifier length.
pub const MAX_ID_LEN: usize = 64;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Invalid identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("identifier must be 1-{} characters of [A-Za-z0-9_-], got {:?}", MAX_ID_LEN, .0)]
pub struct IdError(pub String);

fn check_id(raw: &str) -> Result<(), IdError> {
    let ok = !raw.is_empty()
        && raw.len() <= MAX_ID_LEN
        && raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if ok {
        Ok(())
    } else {
        Err(IdError(raw.to_string()))
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap.
            pub fn parse(raw: &str) -> Result<Self, IdError> {
                check_id(raw)?;
                Ok(Self(raw.to_string()))
            }

            /// Borrow as `&str`.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                check_id(&raw)?;
                Ok(Self(raw))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

string_id!(
    /// Player identifier.
    PlayerId
);

string_id!(
    /// Room identifier.
    RoomId
);

// =============================================================================
// ROOM
// =============================================================================

/// Room lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Waiting for the second player.
    Pending,
    /// Turns in progress.
    Active,
    /// Turn limit reached.
    Completed,
    /// A player raised a dispute; needs external arbitration.
    Disputed,
}

/// Pre-roll setup checklist. All four items must hold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    /// Rolling surface is flat and clear.
    pub surface_clear: bool,
    /// Camera is fixed and framing the surface.
    pub camera_fixed: bool,
    /// Lighting makes pips readable.
    pub lighting_adequate: bool,
    /// A single standard die is in view.
    pub single_die_visible: bool,
}

impl Checklist {
    /// Names of unchecked items.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.surface_clear {
            missing.push("surfaceClear");
        }
        if !self.camera_fixed {
            missing.push("cameraFixed");
        }
        if !self.lighting_adequate {
            missing.push("lightingAdequate");
        }
        if !self.single_die_visible {
            missing.push("singleDieVisible");
        }
        missing
    }

    /// Whether every item is checked.
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// A seated player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Identifier.
    pub id: PlayerId,
    /// Unix ms of first join.
    pub joined_at: TimestampMs,
    /// Finalized rolls.
    pub roll_count: u32,
    /// Recorded protocol violations.
    pub violation_count: u32,
    /// Whether the setup checklist passed.
    pub checklist_complete: bool,
    /// Display metadata (camera angle label etc.); not protocol relevant.
    pub perspective: Option<String>,
    /// This player's own outcome distribution.
    #[serde(default)]
    pub fairness: FairnessMonitor,
}

impl Player {
    /// New player with clean record.
    pub fn new(id: PlayerId, joined_at: TimestampMs, perspective: Option<String>) -> Self {
        Self {
            id,
            joined_at,
            roll_count: 0,
            violation_count: 0,
            checklist_complete: false,
            perspective,
            fairness: FairnessMonitor::new(),
        }
    }

    /// Derived trust tier.
    pub fn tier(&self, rules: &ReputationRules) -> ReputationTier {
        tier(self.roll_count, self.violation_count, rules)
    }
}

// =============================================================================
// TURN PHASES
// =============================================================================

/// Pre-roll frame published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreRoll {
    /// Baseline frame before the roll.
    pub pre_roll_frame_hash: HexDigest,
    /// When it was published.
    pub submitted_at: TimestampMs,
}

/// Commitment published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Committed {
    /// Earlier stage.
    pub pre_roll: PreRoll,
    /// `H(salt | player | turn)`.
    pub commitment_hash: HexDigest,
    /// When the commitment arrived.
    pub commit_timestamp: TimestampMs,
}

/// Salt revealed and verified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revealed {
    /// Earlier stage.
    pub committed: Committed,
    /// The verified salt.
    pub revealed_salt: String,
    /// When the reveal arrived.
    pub reveal_timestamp: TimestampMs,
    /// Start of the evidence window: the reveal, or the latest reroll.
    pub window_start: TimestampMs,
}

/// Value declared.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declared {
    /// Earlier stage.
    pub revealed: Revealed,
    /// Face the player reports (1-6).
    pub declared_value: u8,
    /// Frame of the settled die.
    pub post_roll_frame_hash: HexDigest,
    /// When the declaration arrived.
    pub declare_timestamp: TimestampMs,
}

/// Phase names, including the derived checklist gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    /// Acting player has not passed the checklist.
    AwaitingChecklist,
    /// Waiting for the baseline frame.
    AwaitingPreRollFrame,
    /// Waiting for the commitment.
    AwaitingCommitment,
    /// Waiting for the salt.
    AwaitingReveal,
    /// Waiting for the declared value.
    AwaitingDeclaration,
    /// Waiting for evidence.
    AwaitingEvidence,
    /// Uncertain evidence awaiting the opponent.
    AwaitingConfirmation,
    /// Evidence accepted; turn can be closed.
    AwaitingFinalize,
    /// Turn closed.
    Finalized,
    /// Turn halted by a dispute.
    Disputed,
}

/// Stored turn phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TurnPhase {
    /// Waiting for the baseline frame.
    AwaitingPreRollFrame,
    /// Waiting for the commitment.
    AwaitingCommitment(PreRoll),
    /// Waiting for the salt.
    AwaitingReveal(Committed),
    /// Waiting for the declared value.
    AwaitingDeclaration(Revealed),
    /// Waiting for evidence.
    AwaitingEvidence(Declared),
    /// Uncertain evidence awaiting the opponent.
    AwaitingConfirmation {
        /// Declaration under review.
        declared: Declared,
        /// Opponent has disagreed; reroll is now available.
        disagreed: bool,
    },
    /// Evidence accepted.
    AwaitingFinalize {
        /// Accepted declaration.
        declared: Declared,
    },
    /// Turn closed.
    Finalized {
        /// Accepted declaration.
        declared: Declared,
        /// Outcome counted.
        value: u8,
        /// When the turn closed.
        finalized_at: TimestampMs,
    },
    /// Turn halted by a dispute.
    Disputed {
        /// Who disputed.
        disputed_by: PlayerId,
        /// Free-text reason.
        reason: String,
        /// Phase the turn was in.
        from: PhaseName,
        /// When.
        disputed_at: TimestampMs,
    },
}

impl TurnPhase {
    /// Phase name.
    pub fn name(&self) -> PhaseName {
        match self {
            Self::AwaitingPreRollFrame => PhaseName::AwaitingPreRollFrame,
            Self::AwaitingCommitment(_) => PhaseName::AwaitingCommitment,
            Self::AwaitingReveal(_) => PhaseName::AwaitingReveal,
            Self::AwaitingDeclaration(_) => PhaseName::AwaitingDeclaration,
            Self::AwaitingEvidence(_) => PhaseName::AwaitingEvidence,
            Self::AwaitingConfirmation { .. } => PhaseName::AwaitingConfirmation,
            Self::AwaitingFinalize { .. } => PhaseName::AwaitingFinalize,
            Self::Finalized { .. } => PhaseName::Finalized,
            Self::Disputed { .. } => PhaseName::Disputed,
        }
    }

    fn pre_roll(&self) -> Option<&PreRoll> {
        match self {
            Self::AwaitingCommitment(p) => Some(p),
            _ => self.committed().map(|c| &c.pre_roll),
        }
    }

    fn committed(&self) -> Option<&Committed> {
        match self {
            Self::AwaitingReveal(c) => Some(c),
            _ => self.revealed().map(|r| &r.committed),
        }
    }

    fn revealed(&self) -> Option<&Revealed> {
        match self {
            Self::AwaitingDeclaration(r) => Some(r),
            _ => self.declared().map(|d| &d.revealed),
        }
    }

    fn declared(&self) -> Option<&Declared> {
        match self {
            Self::AwaitingEvidence(d)
            | Self::AwaitingConfirmation { declared: d, .. }
            | Self::AwaitingFinalize { declared: d }
            | Self::Finalized { declared: d, .. } => Some(d),
            _ => None,
        }
    }
}

/// One turn of one player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRecord {
    /// Turn number (1-based).
    pub turn_number: u32,
    /// Acting player.
    pub player_id: PlayerId,
    /// Current phase.
    pub phase: TurnPhase,
    /// Rerolls used.
    pub reroll_count: u32,
    /// Verdict on the latest evidence.
    pub evidence_result: Option<EvidenceResult>,
    /// Latest evidence was flagged; reroll is available.
    pub flagged: bool,
    /// When the turn began.
    pub started_at: TimestampMs,
}

impl TurnRecord {
    /// Fresh turn awaiting the pre-roll frame.
    pub fn new(turn_number: u32, player_id: PlayerId, started_at: TimestampMs) -> Self {
        Self {
            turn_number,
            player_id,
            phase: TurnPhase::AwaitingPreRollFrame,
            reroll_count: 0,
            evidence_result: None,
            flagged: false,
            started_at,
        }
    }

    /// Baseline frame, once published.
    pub fn pre_roll_frame_hash(&self) -> Option<HexDigest> {
        self.phase.pre_roll().map(|p| p.pre_roll_frame_hash)
    }

    /// Commitment, once published.
    pub fn commitment_hash(&self) -> Option<HexDigest> {
        self.phase.committed().map(|c| c.commitment_hash)
    }

    /// Commitment time, once published.
    pub fn commit_timestamp(&self) -> Option<TimestampMs> {
        self.phase.committed().map(|c| c.commit_timestamp)
    }

    /// Salt, once revealed.
    pub fn revealed_salt(&self) -> Option<&str> {
        self.phase.revealed().map(|r| r.revealed_salt.as_str())
    }

    /// Reveal time, once revealed.
    pub fn reveal_timestamp(&self) -> Option<TimestampMs> {
        self.phase.revealed().map(|r| r.reveal_timestamp)
    }

    /// Declared value, once declared.
    pub fn declared_value(&self) -> Option<u8> {
        self.phase.declared().map(|d| d.declared_value)
    }

    /// Post-roll frame, once declared.
    pub fn post_roll_frame_hash(&self) -> Option<HexDigest> {
        self.phase.declared().map(|d| d.post_roll_frame_hash)
    }

    /// Declaration time, once declared.
    pub fn declare_timestamp(&self) -> Option<TimestampMs> {
        self.phase.declared().map(|d| d.declare_timestamp)
    }

    /// Final value, once finalized.
    pub fn final_value(&self) -> Option<u8> {
        match &self.phase {
            TurnPhase::Finalized { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// Authoritative room state. This is also the persisted layout.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Identifier.
    pub id: RoomId,
    /// Lifecycle.
    pub status: RoomStatus,
    /// Seated players in join order (at most two).
    pub players: Vec<Player>,
    /// Index into `players` of the acting player.
    pub turn_index: usize,
    /// Current turn (0 until the game starts).
    pub turn_number: u32,
    /// Turn records by number.
    pub turns: BTreeMap<u32, TurnRecord>,
    /// Latest evidence package by turn.
    pub evidence: BTreeMap<u32, EvidencePackage>,
    /// Event log.
    pub hash_chain: HashChain,
    /// Room-wide outcome distribution.
    pub fairness: FairnessMonitor,
    /// Every frame referenced by submitted evidence.
    #[serde(default)]
    pub seen_frames: BTreeSet<HexDigest>,
    /// Finalized turns so far.
    #[serde(default)]
    pub finalized_turns: u32,
    /// Unix ms of creation.
    pub created_at: TimestampMs,
}

impl Room {
    /// Empty pending room.
    pub fn new(id: RoomId, created_at: TimestampMs) -> Self {
        Self {
            id,
            status: RoomStatus::Pending,
            players: Vec::with_capacity(ROOM_CAPACITY),
            turn_index: 0,
            turn_number: 0,
            turns: BTreeMap::new(),
            evidence: BTreeMap::new(),
            hash_chain: HashChain::new(),
            fairness: FairnessMonitor::new(),
            seen_frames: BTreeSet::new(),
            finalized_turns: 0,
            created_at,
        }
    }

    /// Look up a seated player.
    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    /// Look up a seated player mutably.
    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == id)
    }

    /// Player whose turn it is.
    pub fn acting_player(&self) -> Option<&Player> {
        self.players.get(self.turn_index)
    }

    /// Record of the current turn.
    pub fn current_turn(&self) -> Option<&TurnRecord> {
        self.turns.get(&self.turn_number)
    }

    /// Phase of the current turn as observers see it: the stored phase,
    /// or AwaitingChecklist while the acting player's checklist is open.
    pub fn current_phase(&self) -> Option<PhaseName> {
        let turn = self.current_turn()?;
        let gated = matches!(turn.phase, TurnPhase::AwaitingPreRollFrame)
            && self.acting_player().map(|p| !p.checklist_complete).unwrap_or(false);
        if gated {
            Some(PhaseName::AwaitingChecklist)
        } else {
            Some(turn.phase.name())
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
