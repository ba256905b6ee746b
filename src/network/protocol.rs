//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. Every
//! message is a JSON object tagged by `"type"`.
//!
//! A connection authenticates (when the server requires tokens), joins one
//! room, and from then on sends room operations. Each operation is answered
//! by an `ack`; room changes arrive as `event` messages on the same socket.

use serde::{Deserialize, Serialize};

use crate::core::clock::TimestampMs;
use crate::game::state::Checklist;
use crate::game::turn::{Exhaustion, TurnAction, TurnError};
use crate::game::view::{ActionAck, RoomView};
use crate::game::events::PushEvent;
use crate::proof::chain::{ChainSnapshot, ChainVerification};
use crate::proof::evidence::EvidencePackage;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with the server.
    Auth(AuthRequest),

    /// Join a room (or create one when no id is given).
    Join(JoinRequest),

    /// Pass the setup checklist.
    SubmitChecklist {
        /// The four items.
        checklist: Checklist,
    },

    /// Publish the baseline frame hash.
    SubmitPreRollFrame {
        /// Hex digest.
        frame_hash: String,
    },

    /// Publish a commitment.
    Commit {
        /// Hex digest.
        commitment_hash: String,
    },

    /// Reveal the committed salt.
    Reveal {
        /// Hex salt.
        salt: String,
    },

    /// Declare the rolled face.
    DeclareRoll {
        /// Face 1-6.
        value: i64,
        /// Hex digest of the settled die.
        post_roll_frame_hash: String,
    },

    /// Submit detector evidence.
    SubmitEvidence {
        /// The package.
        evidence: EvidencePackage,
    },

    /// Accept or reject uncertain evidence (opponent only).
    ConfirmEvidence {
        /// Whether the declaration is accepted.
        agree: bool,
    },

    /// Roll again.
    RequestReroll,

    /// Halt the game for arbitration.
    Dispute {
        /// Free text.
        reason: String,
    },

    /// Close the current turn.
    FinalizeTurn,

    /// Request the full room snapshot.
    GetState,

    /// Re-verify the room's hash chain.
    VerifyChain,

    /// Download the full hash chain for audit.
    ExportChain,

    /// Ping for latency measurement.
    Ping {
        /// Client clock, echoed back.
        timestamp: i64,
    },

    /// Leave the room (the seat is kept for reconnects).
    Leave,
}

/// Authentication request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// JWT issued by the identity provider.
    pub token: String,
    /// Client version for compatibility check.
    pub client_version: String,
}

/// Join request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Room to join; a new room is created when absent.
    #[serde(default)]
    pub room_id: Option<String>,
    /// Claimed player id. Ignored when the connection authenticated.
    #[serde(default)]
    pub player_id: Option<String>,
    /// Display metadata.
    #[serde(default)]
    pub perspective: Option<String>,
}

impl ClientMessage {
    /// The room operation this message carries, if it is one. `join` is
    /// excluded: the server resolves the room and identity first.
    pub fn into_action(self) -> Option<TurnAction> {
        let action = match self {
            Self::SubmitChecklist { checklist } => TurnAction::SubmitChecklist { checklist },
            Self::SubmitPreRollFrame { frame_hash } => TurnAction::SubmitPreRollFrame { frame_hash },
            Self::Commit { commitment_hash } => TurnAction::Commit { commitment_hash },
            Self::Reveal { salt } => TurnAction::Reveal { salt },
            Self::DeclareRoll { value, post_roll_frame_hash } => {
                TurnAction::DeclareRoll { value, post_roll_frame_hash }
            }
            Self::SubmitEvidence { evidence } => TurnAction::SubmitEvidence { evidence },
            Self::ConfirmEvidence { agree } => TurnAction::ConfirmEvidence { agree },
            Self::RequestReroll => TurnAction::RequestReroll,
            Self::Dispute { reason } => TurnAction::Dispute { reason },
            Self::FinalizeTurn => TurnAction::FinalizeTurn,
            Self::Auth(_)
            | Self::Join(_)
            | Self::GetState
            | Self::VerifyChain
            | Self::ExportChain
            | Self::Ping { .. }
            | Self::Leave => return None,
        };
        Some(action)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Seated in a room.
    Joined(JoinedInfo),

    /// Reply to a room operation.
    Ack(AckMessage),

    /// Full room snapshot.
    State(RoomView),

    /// Live room event. Wrapped because the event carries its own `type`.
    Event {
        /// Room the event belongs to.
        room_id: String,
        /// The `{type, payload}` event.
        event: PushEvent,
    },

    /// Chain verification result.
    ChainVerified(ChainVerification),

    /// Full chain export.
    Chain(ChainSnapshot),

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: i64,
        /// Server clock (Unix ms).
        server_time: TimestampMs,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Player id derived from the token subject.
    pub player_id: Option<String>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Seat confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedInfo {
    /// Room joined.
    pub room_id: String,
    /// Identity used in this room.
    pub player_id: String,
    /// Join acknowledgement.
    pub ack: ActionAck,
}

/// Reply to a room operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckMessage {
    /// Operation name (`commit`, `reveal`, ...).
    pub action: String,
    /// `{success, newChainTip, errors?}`.
    #[serde(flatten)]
    pub ack: ActionAck,
    /// Error class when the operation was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

/// Server error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Message could not be parsed.
    InvalidInput,
    /// Malformed operation input.
    Validation,
    /// Wrong phase or wrong player.
    Conflict,
    /// The turn used every reroll.
    MaxRerollsReached,
    /// Player is suspended.
    Suspended,
    /// No room joined yet.
    NotInRoom,
    /// Connection already joined a room.
    AlreadyInRoom,
    /// Room could not be loaded, persisted or reached.
    RoomUnavailable,
    /// Rate limited.
    RateLimited,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<&TurnError> for ErrorCode {
    fn from(err: &TurnError) -> Self {
        match err {
            TurnError::Validation(_) => Self::Validation,
            TurnError::Conflict(_) => Self::Conflict,
            TurnError::Exhaustion(Exhaustion::MaxRerollsReached { .. }) => Self::MaxRerollsReached,
            TurnError::Exhaustion(Exhaustion::Suspended { .. }) => Self::Suspended,
            TurnError::Internal(_) => Self::InternalError,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
