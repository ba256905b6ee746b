//! Push Events
//!
//! Live updates delivered to every session subscribed to a room. The
//! vocabulary mirrors the chain event types, plus two notifications that
//! never reach the chain: `player_joined` and `checklist_completed`.
//! Delivery is best-effort; observers reconcile by re-fetching state.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::proof::chain::{ChainEvent, ChainEventType};

/// Push event type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushEventKind {
    /// A player took a seat.
    PlayerJoined,
    /// A player passed the setup checklist.
    ChecklistCompleted,
    /// Mirrors a chain event.
    GameStarted,
    /// Mirrors a chain event.
    PreRollFrameSubmitted,
    /// Mirrors a chain event.
    CommitmentMade,
    /// Mirrors a chain event.
    CommitmentRevealed,
    /// Mirrors a chain event.
    RevealRejected,
    /// Mirrors a chain event.
    RollDeclared,
    /// Mirrors a chain event.
    EvidenceSubmitted,
    /// Mirrors a chain event.
    EvidenceFlagged,
    /// Mirrors a chain event.
    EvidenceConfirmed,
    /// Mirrors a chain event.
    EvidenceRejected,
    /// Mirrors a chain event.
    RerollRequested,
    /// Mirrors a chain event.
    RollFinalized,
    /// Mirrors a chain event.
    GameDisputed,
}

impl From<ChainEventType> for PushEventKind {
    fn from(event_type: ChainEventType) -> Self {
        match event_type {
            ChainEventType::GameStarted => Self::GameStarted,
            ChainEventType::PreRollFrameSubmitted => Self::PreRollFrameSubmitted,
            ChainEventType::CommitmentMade => Self::CommitmentMade,
            ChainEventType::CommitmentRevealed => Self::CommitmentRevealed,
            ChainEventType::RevealRejected => Self::RevealRejected,
            ChainEventType::RollDeclared => Self::RollDeclared,
            ChainEventType::EvidenceSubmitted => Self::EvidenceSubmitted,
            ChainEventType::EvidenceFlagged => Self::EvidenceFlagged,
            ChainEventType::EvidenceConfirmed => Self::EvidenceConfirmed,
            ChainEventType::EvidenceRejected => Self::EvidenceRejected,
            ChainEventType::RerollRequested => Self::RerollRequested,
            ChainEventType::RollFinalized => Self::RollFinalized,
            ChainEventType::GameDisputed => Self::GameDisputed,
        }
    }
}

/// A `{type, payload}` push message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub kind: PushEventKind,
    /// Event body.
    pub payload: Value,
}

impl PushEvent {
    /// Non-chain notification.
    pub fn new(kind: PushEventKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// Mirror of an appended chain event; the payload carries the event
    /// data plus its index and the new chain tip.
    pub fn from_chain(event: &ChainEvent) -> Self {
        Self {
            kind: event.event_type.into(),
            payload: json!({
                "index": event.index,
                "data": event.data,
                "timestamp": event.timestamp,
                "chainTip": event.hash,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::chain::HashChain;

    #[test]
    fn test_push_from_chain_event() {
        let mut chain = HashChain::new();
        let event = chain.append(ChainEventType::CommitmentMade, json!({"turnNumber": 1}), 5);
        let push = PushEvent::from_chain(&event);

        assert_eq!(push.kind, PushEventKind::CommitmentMade);
        assert_eq!(push.payload["chainTip"], json!(chain.tip().to_hex()));
        assert_eq!(push.payload["data"]["turnNumber"], 1);

        let wire = serde_json::to_value(&push).unwrap();
        assert_eq!(wire["type"], "commitment_made");
    }

    #[test]
    fn test_kind_names_match_chain_names() {
        let wire = serde_json::to_value(PushEventKind::from(ChainEventType::RollFinalized)).unwrap();
        assert_eq!(wire, ChainEventType::RollFinalized.as_str());
    }
}
