//! Public Room Snapshot
//!
//! What `getState` returns. Derived on demand from the authoritative
//! `Room`; tiers and fairness status are computed here, never stored.

use serde::{Deserialize, Serialize};

use crate::core::clock::TimestampMs;
use crate::core::hash::HexDigest;
use crate::game::config::ProtocolConfig;
use crate::game::state::{PhaseName, Player, PlayerId, Room, RoomId, RoomStatus, TurnRecord};
use crate::proof::chain::ChainEvent;
use crate::proof::evidence::EvidenceResult;
use crate::trust::fairness::FairnessSnapshot;
use crate::trust::reputation::ReputationTier;

/// Public view of a seated player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// Identifier.
    pub id: PlayerId,
    /// Finalized rolls.
    pub roll_count: u32,
    /// Recorded violations.
    pub violation_count: u32,
    /// Derived tier.
    pub tier: ReputationTier,
    /// Whether the tier allows acting.
    pub can_play: bool,
    /// Setup checklist passed.
    pub checklist_complete: bool,
    /// Display metadata.
    pub perspective: Option<String>,
    /// This player's own outcome distribution.
    pub fairness: FairnessSnapshot,
}

impl PlayerView {
    fn of(player: &Player, config: &ProtocolConfig) -> Self {
        let tier = player.tier(&config.reputation_rules());
        Self {
            id: player.id.clone(),
            roll_count: player.roll_count,
            violation_count: player.violation_count,
            tier,
            can_play: tier.can_play(),
            checklist_complete: player.checklist_complete,
            perspective: player.perspective.clone(),
            fairness: player.fairness.snapshot(&config.fairness_rules()),
        }
    }
}

/// Public view of the current turn. The revealed salt is included only
/// once it has been revealed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnView {
    /// Turn number.
    pub turn_number: u32,
    /// Acting player.
    pub player_id: PlayerId,
    /// Phase as observers see it.
    pub phase: PhaseName,
    /// Rerolls used.
    pub reroll_count: u32,
    /// Baseline frame.
    pub pre_roll_frame_hash: Option<HexDigest>,
    /// Commitment.
    pub commitment_hash: Option<HexDigest>,
    /// Revealed salt.
    pub revealed_salt: Option<String>,
    /// Declared face.
    pub declared_value: Option<u8>,
    /// Post-roll frame.
    pub post_roll_frame_hash: Option<HexDigest>,
    /// Latest evidence verdict.
    pub evidence_result: Option<EvidenceResult>,
    /// Final face.
    pub final_value: Option<u8>,
}

impl TurnView {
    fn of(turn: &TurnRecord, phase: PhaseName) -> Self {
        Self {
            turn_number: turn.turn_number,
            player_id: turn.player_id.clone(),
            phase,
            reroll_count: turn.reroll_count,
            pre_roll_frame_hash: turn.pre_roll_frame_hash(),
            commitment_hash: turn.commitment_hash(),
            revealed_salt: turn.revealed_salt().map(str::to_string),
            declared_value: turn.declared_value(),
            post_roll_frame_hash: turn.post_roll_frame_hash(),
            evidence_result: turn.evidence_result.clone(),
            final_value: turn.final_value(),
        }
    }
}

/// Full public room snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    /// Identifier.
    pub id: RoomId,
    /// Lifecycle.
    pub status: RoomStatus,
    /// Seated players with derived tiers.
    pub players: Vec<PlayerView>,
    /// Index of the acting player.
    pub turn_index: usize,
    /// Current turn number.
    pub turn_number: u32,
    /// Current turn, once the game started.
    pub current_turn: Option<TurnView>,
    /// Room-wide outcome distribution.
    pub fairness: FairnessSnapshot,
    /// Last N chain events.
    pub recent_events: Vec<ChainEvent>,
    /// Hash of the latest chain event.
    pub chain_tip: HexDigest,
    /// Number of chain events.
    pub chain_length: usize,
    /// Unix ms of creation.
    pub created_at: TimestampMs,
}

impl RoomView {
    /// Snapshot a room.
    pub fn of(room: &Room, config: &ProtocolConfig) -> Self {
        let current_turn = room
            .current_turn()
            .zip(room.current_phase())
            .map(|(turn, phase)| TurnView::of(turn, phase));

        Self {
            id: room.id.clone(),
            status: room.status,
            players: room.players.iter().map(|p| PlayerView::of(p, config)).collect(),
            turn_index: room.turn_index,
            turn_number: room.turn_number,
            current_turn,
            fairness: room.fairness.snapshot(&config.fairness_rules()),
            recent_events: room.hash_chain.recent(config.recent_events).to_vec(),
            chain_tip: room.hash_chain.tip(),
            chain_length: room.hash_chain.len(),
            created_at: room.created_at,
        }
    }
}

/// Reply to a mutating operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionAck {
    /// False when the operation was rejected or recorded a violation.
    pub success: bool,
    /// Chain tip after the operation.
    pub new_chain_tip: HexDigest,
    /// Rejection message or violation reasons.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}
